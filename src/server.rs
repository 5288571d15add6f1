//! The key server: turns create-ckc operations into results.

use std::sync::Arc;

use rayon::prelude::*;

use crate::asset::AssetInfo;
use crate::constants::{
    OFFLINE_CONTENT_ID_LENGTH, SPC_VERSION_1, SPC_VERSION_2, SYNC_FLAG_TITLE_ID_VALID,
};
use crate::credentials::Credentials;
use crate::error::{Result, Status};
use crate::operation::{CheckIn, Operation, OperationResult};
use crate::payload::{KeyPayloadProvider, KeyPayloadRequest};
use crate::rules::{DefaultPolicy, Policy};
use crate::session::Session;
use crate::spc::SpcContainer;
use crate::utils::{read_bytes, read_u32};

/// FairPlay Streaming key server.
///
/// Cloning is cheap; credentials, provider and policy are shared.
#[derive(Clone)]
pub struct KeyServer {
    credentials: Arc<Credentials>,
    provider: Arc<dyn KeyPayloadProvider>,
    policy: Arc<dyn Policy>,
}

impl std::fmt::Debug for KeyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyServer")
            .field("credentials", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl KeyServer {
    /// Create a server using the stock policy.
    pub fn new(credentials: Credentials, provider: impl KeyPayloadProvider + 'static) -> Self {
        Self {
            credentials: Arc::new(credentials),
            provider: Arc::new(provider),
            policy: Arc::new(DefaultPolicy),
        }
    }

    /// Replace the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl Policy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Credentials used to decrypt SPCs.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Active policy.
    #[must_use]
    pub fn policy(&self) -> &dyn Policy {
        self.policy.as_ref()
    }

    /// Process one operation, turning any failure into a result status.
    #[must_use]
    pub fn process_operation(&self, operation: &Operation) -> OperationResult {
        match self.create_ckc(operation) {
            Ok(result) => result,
            Err(e) => {
                debug!("Operation {} failed: {}", operation.id, e);
                OperationResult::from_error(operation.id, &e)
            }
        }
    }

    /// Process a batch. Results keep the order of `operations`.
    ///
    /// Operations are independent and run on the global rayon pool.
    #[must_use]
    pub fn process_operations(&self, operations: &[Operation]) -> Vec<OperationResult> {
        operations
            .par_iter()
            .map(|op| self.process_operation(op))
            .collect()
    }

    /// Run the full pipeline for one operation.
    pub fn create_ckc(&self, operation: &Operation) -> Result<OperationResult> {
        let policy = self.policy.as_ref();
        let mut result = OperationResult::new(operation.id);

        let version = read_u32(&operation.spc, 0)?;
        if version != SPC_VERSION_1 && version != SPC_VERSION_2 {
            fps_bail!(Status::SpcVersionErr, "unsupported SPC version {}", version);
        }

        let spc = SpcContainer::parse(&operation.spc, &self.credentials, policy)?;

        let mut asset_info = operation.asset_info.clone();
        policy.query_database(&mut asset_info, &spc.data)?;
        let required_level =
            policy.check_business_rules(&asset_info, operation.is_check_in, &spc.data)?;

        let mut session = Session::new(spc, &asset_info);
        session.required_security_level = required_level;

        self.populate_results(&mut session, operation, &asset_info, &mut result)?;

        let data = &session.spc.data;
        let request = KeyPayloadRequest {
            content_key: &asset_info.content_key,
            content_iv: &asset_info.content_iv,
            content_type: policy.payload_content_type(&asset_info),
            sk_r1: &data.sk_r1,
            r2: &data.r2,
            sk_r1_integrity: &data.sk_r1_integrity,
            supported_key_formats: &data.supported_key_formats,
            crypto_version_used: data.version_used,
            provisioning_data: self.credentials.provisioning_data(),
            certificate_hash: &session.spc.certificate_hash,
        };
        let payload = self.provider.create_key_payload(&request)?;
        result.hu = payload.hu.clone();
        session.ckc.set_key_payload(payload)?;

        session.generate_ckc(policy)?;
        if session.ckc.return_ckc {
            result.ckc = session.ckc.ckc.clone();
        }

        policy.finalize_results(&session, &mut result)?;

        info!(
            "Created CKC for operation {} (asset {})",
            operation.id,
            hex::encode(&session.spc.data.asset_id)
        );
        Ok(result)
    }

    fn populate_results(
        &self,
        session: &mut Session,
        operation: &Operation,
        asset_info: &AssetInfo,
        result: &mut OperationResult,
    ) -> Result<()> {
        let data = &session.spc.data;
        result.session_id = data.playback.map(|p| p.playback_id).unwrap_or(0);
        result.device_identity = data.device_identity.clone();
        result.vm_device_info = data.vm_device_info;

        self.policy.populate_results(session, asset_info, result)?;

        if operation.is_check_in {
            session.apply_check_in_title();
            let sync = &session.spc.data.sync;
            let ids_len = sync
                .records_deleted
                .checked_mul(OFFLINE_CONTENT_ID_LENGTH)
                .unwrap_or(usize::MAX);
            let deleted_content_ids = read_bytes(&sync.deleted_content_ids, 0, ids_len)?
                .chunks_exact(OFFLINE_CONTENT_ID_LENGTH)
                .map(|chunk| {
                    let mut id = [0u8; OFFLINE_CONTENT_ID_LENGTH];
                    id.copy_from_slice(chunk);
                    id
                })
                .collect();

            result.check_in = Some(CheckIn {
                server_challenge: sync.server_challenge,
                flags: sync.flags,
                title_id: session
                    .title_id
                    .clone()
                    .filter(|_| sync.flags & SYNC_FLAG_TITLE_ID_VALID != 0),
                duration_to_expiry: sync.duration_to_expiry,
                deleted_content_ids,
            });
        }

        Ok(())
    }
}
