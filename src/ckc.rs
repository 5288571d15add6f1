//! Content Key Context (CKC) construction.
//!
//! The CKC body is a stream of TLLVs encrypted with AES-128-CBC under the
//! anti-replay key, framed as:
//!
//! ```text
//! version: u32 | reserved: u32 | iv: 16 | length: u32 | encrypted body
//! ```

use crate::asset::AssetInfo;
use crate::constants::{
    server_info, tag, HdcpRequirement, KeyDurationType, SecurityLevel, AES128_IV_SZ,
    AES128_KEY_SZ, ANTI_REPLAY_SZ, CKC_VERSION, KEY_DURATION_RESERVED_FIELD_VALUE,
    MAX_STREAM_ID_LENGTH, MAX_TITLE_ID_LENGTH, OFFLINE_CONTENT_ID_LENGTH,
    OFFLINE_KEY_TLLV_VERSION, OFFLINE_KEY_TLLV_VERSION_2, SECURITY_LEVEL_TLLV_VERSION,
};
use crate::crypto::{aes_cbc_encrypt, aes_ecb_encrypt_block, sha1_truncated};
use crate::error::{Result, Status};
use crate::payload::KeyPayload;
use crate::spc::SpcData;
use crate::tllv;
use crate::utils::{fill_random, put_u32, put_u64, zero_padded};

/// License expiry terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyDuration {
    pub lease_duration: u32,
    pub rental_duration: u32,
    pub playback_duration: u32,
    pub key_type: KeyDurationType,
}

impl KeyDuration {
    /// Resolve the expiry terms requested for an asset.
    ///
    /// A lease wins over offline HLS terms; offline HLS is a persistent key,
    /// with durations when either rental or playback duration is set.
    #[must_use]
    pub fn resolve(asset_info: &AssetInfo) -> Self {
        let mut duration = KeyDuration::default();

        if asset_info.is_offline_hls() {
            duration.rental_duration = asset_info.rental_duration;
            duration.playback_duration = asset_info.playback_duration;
            duration.key_type =
                if asset_info.rental_duration != 0 || asset_info.playback_duration != 0 {
                    KeyDurationType::PersistenceAndDuration
                } else {
                    KeyDurationType::Persistence
                };
        }

        if asset_info.is_lease_requested() {
            duration.lease_duration = asset_info.lease_duration;
            duration.rental_duration = asset_info.rental_duration;
            duration.playback_duration = asset_info.playback_duration;
            duration.key_type = KeyDurationType::Lease;
        }

        duration
    }

    /// Whether the terms call for an offline key TLLV.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(
            self.key_type,
            KeyDurationType::Persistence | KeyDurationType::PersistenceAndDuration
        )
    }

    /// Key duration TLLV value.
    #[must_use]
    pub fn to_tllv_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(16);
        put_u32(&mut value, self.lease_duration);
        put_u32(&mut value, self.rental_duration);
        put_u32(&mut value, self.key_type.value());
        put_u32(&mut value, KEY_DURATION_RESERVED_FIELD_VALUE);
        value
    }
}

/// Identifiers placed in an offline key TLLV.
#[derive(Debug, Clone, Copy)]
pub struct OfflineKeyIds<'a> {
    pub stream_id: Option<&'a [u8]>,
    pub title_id: Option<&'a [u8]>,
    /// Content id used when no stream id is available.
    pub default_content_id: [u8; OFFLINE_CONTENT_ID_LENGTH],
}

impl OfflineKeyIds<'_> {
    /// Offline key TLLV value.
    ///
    /// Version 2 (with title id) is used as soon as a stream or title id is
    /// known, and requires the client to support it.
    pub fn to_tllv_value(&self, duration: &KeyDuration, supports_v2: bool) -> Result<Vec<u8>> {
        let is_v2 = self.stream_id.is_some() || self.title_id.is_some();
        fps_ensure!(
            !is_v2 || supports_v2,
            Status::ParamErr,
            "stream or title id requires offline key TLLV v2, which the client does not support"
        );

        let mut value = Vec::with_capacity(48);
        put_u32(
            &mut value,
            if is_v2 {
                OFFLINE_KEY_TLLV_VERSION_2
            } else {
                OFFLINE_KEY_TLLV_VERSION
            },
        );
        put_u32(&mut value, 0);
        match self.stream_id {
            Some(stream_id) => value.extend(zero_padded(stream_id, MAX_STREAM_ID_LENGTH)),
            None => value.extend_from_slice(&self.default_content_id),
        }
        put_u32(&mut value, duration.rental_duration);
        put_u32(&mut value, duration.playback_duration);
        if is_v2 {
            let title_id = self.title_id.unwrap_or_default();
            value.extend(zero_padded(title_id, MAX_TITLE_ID_LENGTH));
        }
        Ok(value)
    }
}

/// Data that goes into the CKC body.
#[derive(Debug, Clone, Default)]
pub struct CkcData {
    pub content_key: [u8; AES128_KEY_SZ],
    pub content_iv: [u8; AES128_IV_SZ],
    pub r1: Vec<u8>,
    pub key_duration: KeyDuration,
    pub hdcp_requirement: HdcpRequirement,
    pub content_key_tag: u64,
    pub content_key_payload: Vec<u8>,
}

/// CKC under construction.
#[derive(Debug, Clone)]
pub struct CkcContainer {
    /// When false the CKC is not returned to the caller.
    pub return_ckc: bool,
    pub version: u32,
    pub iv: [u8; AES128_IV_SZ],
    /// Plaintext TLLV body.
    pub body: Vec<u8>,
    /// Framed CKC.
    pub ckc: Vec<u8>,
    pub data: CkcData,
}

impl Default for CkcContainer {
    fn default() -> Self {
        Self {
            return_ckc: true,
            version: CKC_VERSION,
            iv: [0; AES128_IV_SZ],
            body: Vec::new(),
            ckc: Vec::new(),
            data: CkcData::default(),
        }
    }
}

impl CkcContainer {
    /// Start a CKC for an asset.
    #[must_use]
    pub fn new(asset_info: &AssetInfo) -> Self {
        let mut container = Self::default();
        container.data.content_key = asset_info.content_key;
        container.data.content_iv = asset_info.content_iv;
        container.data.key_duration = KeyDuration::resolve(asset_info);
        container.data.hdcp_requirement = asset_info.hdcp_requirement;
        container
    }

    /// Take the output of the content key payload primitive.
    pub fn set_key_payload(&mut self, payload: KeyPayload) -> Result<()> {
        payload.validate()?;
        self.data.content_key_tag = payload.content_key_tag;
        self.data.content_key_payload = payload.content_key_payload;
        self.data.r1 = payload.r1;
        Ok(())
    }

    /// Serialize the CKC body TLLVs.
    pub fn serialize_body(
        &mut self,
        spc: &SpcData,
        required_level: SecurityLevel,
        offline_ids: &OfflineKeyIds<'_>,
    ) -> Result<()> {
        let mut body = Vec::new();

        tllv::encode(self.data.content_key_tag, &self.data.content_key_payload, &mut body);
        tllv::encode(tag::R1, &self.data.r1, &mut body);
        for returned in &spc.return_tllvs {
            returned.write_to(&mut body);
        }

        let mut hdcp = Vec::with_capacity(16);
        put_u64(&mut hdcp, self.data.hdcp_requirement.value());
        let mut reserved = [0u8; 8];
        fill_random(&mut reserved);
        hdcp.extend_from_slice(&reserved);
        tllv::encode(tag::HDCP_INFORMATION, &hdcp, &mut body);

        let mut level = Vec::with_capacity(16);
        put_u32(&mut level, SECURITY_LEVEL_TLLV_VERSION);
        put_u32(&mut level, 0);
        put_u64(&mut level, required_level.value());
        tllv::encode(tag::SECURITY_LEVEL, &level, &mut body);

        let duration = self.data.key_duration;
        if spc.has_tag(tag::MEDIA_PLAYBACK_STATE) && duration.key_type != KeyDurationType::None {
            if duration.is_persistent() && spc.client_features.supports_offline_key {
                let value = offline_ids
                    .to_tllv_value(&duration, spc.client_features.supports_offline_key_v2)?;
                tllv::encode(tag::OFFLINE_KEY, &value, &mut body);
            } else {
                tllv::encode(tag::KEY_DURATION, &duration.to_tllv_value(), &mut body);
            }
        }

        self.body = body;
        Ok(())
    }

    /// Encrypt the body under the anti-replay key and frame the CKC.
    pub fn encrypt(&mut self, anti_replay_seed: &[u8]) -> Result<()> {
        fps_ensure!(
            anti_replay_seed.len() == ANTI_REPLAY_SZ,
            Status::ParamErr,
            "anti-replay seed is {} bytes",
            anti_replay_seed.len()
        );
        let mut seed = [0u8; ANTI_REPLAY_SZ];
        seed.copy_from_slice(anti_replay_seed);

        let key = derive_anti_replay_key(&self.data.r1, &seed);
        fill_random(&mut self.iv);
        let encrypted = aes_cbc_encrypt(&key, &self.iv, &self.body)?;

        let mut ckc = Vec::with_capacity(28 + encrypted.len());
        put_u32(&mut ckc, self.version);
        put_u32(&mut ckc, server_info_bits());
        ckc.extend_from_slice(&self.iv);
        put_u32(&mut ckc, encrypted.len() as u32);
        ckc.extend_from_slice(&encrypted);

        debug!("Generated CKC of {} bytes", ckc.len());
        self.ckc = ckc;
        Ok(())
    }
}

/// Anti-replay key: AES-128-ECB of the SPC anti-replay seed under the first
/// 16 bytes of SHA-1(R1).
#[must_use]
pub fn derive_anti_replay_key(r1: &[u8], seed: &[u8; ANTI_REPLAY_SZ]) -> [u8; AES128_KEY_SZ] {
    let key = sha1_truncated(r1);
    aes_ecb_encrypt_block(&key, seed)
}

/// Server build information carried in the CKC reserved field.
///
/// Bits 9..16 major version, 5..9 minor version, 3..5 language, 0..3 platform.
#[must_use]
pub fn server_info_bits() -> u32 {
    let major = env!("CARGO_PKG_VERSION_MAJOR").parse::<u32>().unwrap_or(0);
    let minor = env!("CARGO_PKG_VERSION_MINOR").parse::<u32>().unwrap_or(0);
    let platform = if cfg!(target_arch = "x86_64") {
        server_info::PLATFORM_X86_64
    } else if cfg!(target_arch = "aarch64") {
        server_info::PLATFORM_AARCH64
    } else {
        0
    };

    ((major & 0x7f) << 9)
        | ((minor & 0xf) << 5)
        | ((server_info::LANGUAGE_RUST & 0x3) << 3)
        | (platform & 0x7)
}
