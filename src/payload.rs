//! Content key payload creation.
//!
//! The content key TLLV, R1 and the client HU are produced by a vendor
//! library that holds the FairPlay secrets. The server talks to it through
//! [`KeyPayloadProvider`].

use crate::constants::{PayloadContentType, AES128_BLOCK_SIZE, AES128_IV_SZ, AES128_KEY_SZ};
use crate::error::{Error, Result, Status};

/// Inputs to the content key payload primitive.
#[derive(Debug, Clone, Copy)]
pub struct KeyPayloadRequest<'a> {
    pub content_key: &'a [u8; AES128_KEY_SZ],
    pub content_iv: &'a [u8; AES128_IV_SZ],
    pub content_type: PayloadContentType,
    /// Value of the SK..R1 TLLV.
    pub sk_r1: &'a [u8],
    /// Value of the R2 TLLV.
    pub r2: &'a [u8],
    /// Value of the SK..R1 integrity TLLV.
    pub sk_r1_integrity: &'a [u8],
    /// Key formats the client supports.
    pub supported_key_formats: &'a [u64],
    /// Protocol version the client used.
    pub crypto_version_used: u32,
    /// Server provisioning data.
    pub provisioning_data: &'a [u8],
    /// Server certificate hash from the SPC header.
    pub certificate_hash: &'a [u8],
}

/// Outputs of the content key payload primitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPayload {
    /// Client HU.
    pub hu: Vec<u8>,
    /// Tag of the content key TLLV.
    pub content_key_tag: u64,
    /// Value of the content key TLLV.
    pub content_key_payload: Vec<u8>,
    /// R1, which seeds the anti-replay key.
    pub r1: Vec<u8>,
}

impl KeyPayload {
    /// Reject payloads too short to hold an encrypted content key.
    pub fn validate(&self) -> Result<()> {
        fps_ensure!(
            self.content_key_payload.len() > AES128_BLOCK_SIZE,
            Status::InternalErr,
            "content key payload is only {} bytes",
            self.content_key_payload.len()
        );
        Ok(())
    }
}

/// Source of content key payloads.
pub trait KeyPayloadProvider: Send + Sync {
    /// Build the content key payload for one request.
    fn create_key_payload(&self, request: &KeyPayloadRequest<'_>) -> Result<KeyPayload>;
}

/// Provider used when no vendor library is linked.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableKeyPayloadProvider;

impl KeyPayloadProvider for UnavailableKeyPayloadProvider {
    fn create_key_payload(&self, _request: &KeyPayloadRequest<'_>) -> Result<KeyPayload> {
        Err(Error::fps(
            Status::NotImplementedErr,
            "no content key payload library is available; build with the `ksm` feature",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyPayload, KeyPayloadProvider, KeyPayloadRequest, UnavailableKeyPayloadProvider};
    use crate::constants::PayloadContentType;
    use crate::error::Status;

    #[test]
    fn short_payload_is_internal_err() {
        let payload = KeyPayload {
            content_key_payload: vec![0u8; 16],
            ..KeyPayload::default()
        };
        assert_eq!(payload.validate().expect_err("short").status(), Status::InternalErr);

        let payload = KeyPayload {
            content_key_payload: vec![0u8; 17],
            ..KeyPayload::default()
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn unavailable_provider() {
        let request = KeyPayloadRequest {
            content_key: &[0; 16],
            content_iv: &[0; 16],
            content_type: PayloadContentType::Video,
            sk_r1: &[],
            r2: &[],
            sk_r1_integrity: &[],
            supported_key_formats: &[],
            crypto_version_used: 1,
            provisioning_data: &[],
            certificate_hash: &[],
        };
        let err = UnavailableKeyPayloadProvider
            .create_key_payload(&request)
            .expect_err("unavailable");
        assert_eq!(err.status(), Status::NotImplementedErr);
    }
}
