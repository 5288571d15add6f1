//! Binding to the vendor `KSMCreateKeyPayload` library.
//!
//! Linked by `build.rs` from `FPS_KSM_LIB_DIR` when the `ksm` feature is on.

use std::ptr;

use crate::constants::{
    HU_SZ, KEY_FORMAT_BUF_16_BYTE, KEY_PAYLOAD_STRUCT_VERSION, MAX_KEY_FORMATS, R1_SZ,
};
use crate::error::{Result, Status};
use crate::payload::{KeyPayload, KeyPayloadProvider, KeyPayloadRequest};

/// Size of the buffer handed to the library for the content key TLLV payload.
const CONTENT_KEY_PAYLOAD_BUFFER_SZ: usize = 1024;

/// `KSMKeyPayload` as laid out by the vendor library. Every member is 64 bits.
#[repr(C)]
struct RawKeyPayload {
    version: u64,
    content_key: *const u8,
    content_key_length: u64,
    content_iv: *const u8,
    content_iv_length: u64,
    content_type: u64,
    sk_r1: *const u8,
    sk_r1_length: u64,
    r2: *const u8,
    r2_length: u64,
    r1_integrity: *const u8,
    r1_integrity_length: u64,
    supported_key_formats: *const u64,
    number_of_supported_key_formats: u64,
    crypto_version_used: u64,
    provisioning_data: *const u8,
    provisioning_data_length: u64,
    cert_hash: *const u8,
    cert_hash_length: u64,
    client_hu: *mut u8,
    client_hu_length: u64,
    content_key_tllv_tag: u64,
    content_key_tllv_payload: *mut u8,
    content_key_tllv_payload_length: u64,
    r1: *mut u8,
    r1_length: u64,
}

extern "C" {
    fn KSMCreateKeyPayload(payload: *mut RawKeyPayload) -> i32;
}

/// Key payload provider backed by the vendor library.
#[derive(Debug, Clone, Copy, Default)]
pub struct KsmKeyPayloadProvider;

impl KeyPayloadProvider for KsmKeyPayloadProvider {
    fn create_key_payload(&self, request: &KeyPayloadRequest<'_>) -> Result<KeyPayload> {
        // Older clients do not send supported key formats.
        let default_formats = [KEY_FORMAT_BUF_16_BYTE];
        let formats = if request.supported_key_formats.is_empty() {
            &default_formats[..]
        } else {
            request.supported_key_formats
        };
        fps_ensure!(
            formats.len() <= MAX_KEY_FORMATS,
            Status::ParamErr,
            "too many key formats ({})",
            formats.len()
        );

        let mut hu = vec![0u8; HU_SZ];
        let mut content_key_payload = vec![0u8; CONTENT_KEY_PAYLOAD_BUFFER_SZ];
        let mut r1 = vec![0u8; R1_SZ];

        let mut raw = RawKeyPayload {
            version: KEY_PAYLOAD_STRUCT_VERSION,
            content_key: request.content_key.as_ptr(),
            content_key_length: request.content_key.len() as u64,
            content_iv: request.content_iv.as_ptr(),
            content_iv_length: request.content_iv.len() as u64,
            content_type: request.content_type as u64,
            sk_r1: request.sk_r1.as_ptr(),
            sk_r1_length: request.sk_r1.len() as u64,
            r2: request.r2.as_ptr(),
            r2_length: request.r2.len() as u64,
            r1_integrity: request.sk_r1_integrity.as_ptr(),
            r1_integrity_length: request.sk_r1_integrity.len() as u64,
            supported_key_formats: formats.as_ptr(),
            number_of_supported_key_formats: formats.len() as u64,
            crypto_version_used: u64::from(request.crypto_version_used),
            provisioning_data: if request.provisioning_data.is_empty() {
                ptr::null()
            } else {
                request.provisioning_data.as_ptr()
            },
            provisioning_data_length: request.provisioning_data.len() as u64,
            cert_hash: request.certificate_hash.as_ptr(),
            cert_hash_length: request.certificate_hash.len() as u64,
            client_hu: hu.as_mut_ptr(),
            client_hu_length: hu.len() as u64,
            content_key_tllv_tag: 0,
            content_key_tllv_payload: content_key_payload.as_mut_ptr(),
            content_key_tllv_payload_length: content_key_payload.len() as u64,
            r1: r1.as_mut_ptr(),
            r1_length: r1.len() as u64,
        };

        // SAFETY: every input pointer borrows from `request` or a local that
        // outlives the call, and every output buffer length matches its
        // allocation. The library writes at most the advertised lengths.
        let status = unsafe { KSMCreateKeyPayload(&mut raw) };
        if status != 0 {
            fps_bail!(
                Status::from_code(status),
                "KSMCreateKeyPayload failed with {}",
                status
            );
        }

        let hu_len = raw.client_hu_length as usize;
        let payload_len = raw.content_key_tllv_payload_length as usize;
        let r1_len = raw.r1_length as usize;
        fps_ensure!(
            hu_len <= hu.len() && payload_len <= content_key_payload.len() && r1_len <= r1.len(),
            Status::InternalErr,
            "KSMCreateKeyPayload reported lengths past its buffers"
        );
        hu.truncate(hu_len);
        content_key_payload.truncate(payload_len);
        r1.truncate(r1_len);

        Ok(KeyPayload {
            hu,
            content_key_tag: raw.content_key_tllv_tag,
            content_key_payload,
            r1,
        })
    }
}
