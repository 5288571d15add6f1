//! Server Playback Context (SPC) parsing.
//!
//! An SPC is a small container holding an RSA wrapped AES key and an AES-CBC
//! encrypted stream of TLLVs:
//!
//! ```text
//! version: u32 | reserved: u32 | iv: 16 | wrapped key: 128 (v1) or 256 (v2)
//! | certificate hash: 20 | payload size: u32 | payload
//! ```
//!
//! [`SpcContainer::parse`] runs the whole pipeline: header, decryption,
//! TLLV dispatch and validation.

use std::collections::HashSet;

use byteorder::{BigEndian, ByteOrder};

use crate::constants::{
    tag, PlaybackState, AES128_IV_SZ, AES128_KEY_SZ, ANTI_REPLAY_SZ, ASSET_ID_MAX_SZ,
    ASSET_ID_MIN_SZ, CAPABILITIES_FLAGS_LENGTH, CAPABILITY_CHECK_IN_SUPPORTED,
    CAPABILITY_HDCP_TYPE1_ENFORCEMENT_SUPPORTED, CAPABILITY_OFFLINE_KEY_SUPPORTED,
    CAPABILITY_OFFLINE_KEY_V2_SUPPORTED, CAPABILITY_SECURITY_LEVEL_BASELINE_SUPPORTED,
    CAPABILITY_SECURITY_LEVEL_MAIN_SUPPORTED, CERT_HASH_SZ, ENCRYPTED_SECURITY_LEVEL_REPORT_SZ,
    MAX_KEY_FORMATS, MAX_NUM_CRYPTO_VERSIONS, MAX_TITLE_ID_LENGTH, OFFLINE_CONTENT_ID_LENGTH,
    R2_SZ, SKR1_INTEGRITY_SZ, SKR1_SZ, SPC_TLLV_VERSION, SPC_VERSION_1, SPC_VERSION_2,
    V1_WRAPPED_KEY_SZ, V2_WRAPPED_KEY_SZ,
};
use crate::credentials::Credentials;
use crate::crypto::aes_cbc_decrypt;
use crate::device::{DeviceIdentity, DeviceInfo, VmDeviceInfo};
use crate::error::{Result, Status};
use crate::rules::Policy;
use crate::tllv::{self, Tllv};
use crate::utils::{read_bytes, read_u32, read_u64};

/// Media playback state reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaPlaybackState {
    /// SPC creation date (seconds since the epoch).
    pub date: u32,
    pub state: PlaybackState,
    /// Playback session id.
    pub playback_id: u64,
}

/// Offline sync (check-in) data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncData {
    pub version: u32,
    /// Content id of a version 1 sync TLLV.
    pub content_id: Option<[u8; OFFLINE_CONTENT_ID_LENGTH]>,
    pub server_challenge: u64,
    pub flags: u64,
    pub title_id: [u8; MAX_TITLE_ID_LENGTH],
    pub duration_to_expiry: u32,
    pub records_deleted: usize,
    /// Concatenated 16 byte content ids of deleted keys.
    pub deleted_content_ids: Vec<u8>,
}

/// Features the client advertises in its capabilities TLLV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientFeatures {
    pub supports_hdcp_type1: bool,
    pub supports_dual_expiry: bool,
    pub supports_offline_key: bool,
    pub supports_offline_key_v2: bool,
    pub supports_check_in: bool,
    pub supports_security_level_baseline: bool,
    pub supports_security_level_main: bool,
}

impl ClientFeatures {
    /// Decode the capability flags (a 16 byte value, flags in bytes 8..16).
    pub fn from_capabilities(capabilities: &[u8]) -> Result<Self> {
        let flags = read_u64(capabilities, 8)?;
        let offline_key_v2 = flags & CAPABILITY_OFFLINE_KEY_V2_SUPPORTED != 0;
        let dual_expiry = flags & CAPABILITY_OFFLINE_KEY_SUPPORTED != 0;

        Ok(Self {
            supports_hdcp_type1: flags & CAPABILITY_HDCP_TYPE1_ENFORCEMENT_SUPPORTED != 0,
            supports_dual_expiry: dual_expiry,
            // Only the V2 bit advertises the offline key TLLV; it implies V1.
            supports_offline_key: offline_key_v2,
            supports_offline_key_v2: offline_key_v2,
            supports_check_in: flags & CAPABILITY_CHECK_IN_SUPPORTED != 0,
            supports_security_level_baseline: flags & CAPABILITY_SECURITY_LEVEL_BASELINE_SUPPORTED
                != 0,
            supports_security_level_main: flags & CAPABILITY_SECURITY_LEVEL_MAIN_SUPPORTED != 0,
        })
    }
}

/// Everything parsed out of the decrypted SPC payload.
#[derive(Debug, Clone, Default)]
pub struct SpcData {
    pub anti_replay: Vec<u8>,
    pub sk_r1: Vec<u8>,
    pub sk_r1_integrity: Vec<u8>,
    pub r2: Vec<u8>,
    pub asset_id: Vec<u8>,
    pub transaction_id: u64,
    pub version_used: u32,
    pub versions_supported: Vec<u32>,
    /// Tags the client asked to have echoed in the CKC.
    pub return_request: Vec<u64>,
    /// TLLVs echoed verbatim in the CKC, in request order.
    pub return_tllvs: Vec<Tllv>,
    pub capabilities: Vec<u8>,
    pub client_features: ClientFeatures,
    pub device_identity: Option<DeviceIdentity>,
    pub device_info: Option<DeviceInfo>,
    pub vm_device_info: Option<VmDeviceInfo>,
    pub playback: Option<MediaPlaybackState>,
    pub streaming_indicator: Option<u64>,
    /// Raw security level from a plaintext security level report.
    pub security_level: Option<u64>,
    /// Kext deny list version, 0 when not reported.
    pub kdl_version: u32,
    pub supported_key_formats: Vec<u64>,
    pub sync: SyncData,
    /// Every TLLV in payload order.
    pub tllvs: Vec<Tllv>,
    seen_tags: HashSet<u64>,
}

impl SpcData {
    /// Scan and validate a decrypted payload.
    pub fn parse(payload: &[u8], policy: &dyn Policy) -> Result<Self> {
        let mut data = SpcData::default();

        let mut offset = 0;
        while offset < payload.len() {
            let (tllv, next) = tllv::decode(payload, offset)?;
            data.parse_tllv(&tllv, policy)?;
            data.tllvs.push(tllv);
            offset = next;
        }

        data.collect_return_tllvs()?;
        data.check_required_tags()?;
        data.client_features = ClientFeatures::from_capabilities(&data.capabilities)?;

        debug!(
            "Parsed SPC with {} TLLVs, asset id {}",
            data.tllvs.len(),
            hex::encode(&data.asset_id)
        );
        Ok(data)
    }

    /// Whether a TLLV with `tag` was present.
    #[must_use]
    pub fn has_tag(&self, tag: u64) -> bool {
        self.seen_tags.contains(&tag)
    }

    /// Dispatch one TLLV by tag.
    pub fn parse_tllv(&mut self, tllv: &Tllv, policy: &dyn Policy) -> Result<()> {
        fps_ensure!(
            self.seen_tags.insert(tllv.tag),
            Status::DupTagErr,
            "duplicate TLLV {} (0x{:016x})",
            tag::name(tllv.tag),
            tllv.tag
        );

        let value = tllv.value.as_slice();
        match tllv.tag {
            tag::SESSION_KEY_R1 => {
                self.sk_r1 = exact(value, SKR1_SZ, tllv.tag, Status::ParserErr)?;
            }
            tag::SESSION_KEY_R1_INTEGRITY => {
                self.sk_r1_integrity = exact(value, SKR1_INTEGRITY_SZ, tllv.tag, Status::ParserErr)?;
            }
            tag::ANTI_REPLAY => {
                self.anti_replay = exact(value, ANTI_REPLAY_SZ, tllv.tag, Status::ParserErr)?;
            }
            tag::R2 => {
                self.r2 = exact(value, R2_SZ, tllv.tag, Status::ParserErr)?;
            }
            tag::RETURN_REQUEST => {
                fps_ensure!(
                    value.len() % 8 == 0,
                    Status::ParserErr,
                    "return request length {} is not a multiple of 8",
                    value.len()
                );
                self.return_request = value
                    .chunks_exact(8)
                    .map(BigEndian::read_u64)
                    .collect();
            }
            tag::ASSET_ID => {
                fps_ensure!(
                    (ASSET_ID_MIN_SZ..=ASSET_ID_MAX_SZ).contains(&value.len()),
                    Status::ParserErr,
                    "asset id length {} out of range",
                    value.len()
                );
                self.asset_id = value.to_vec();
            }
            tag::TRANSACTION_ID => {
                exact(value, 8, tllv.tag, Status::ParserErr)?;
                self.transaction_id = read_u64(value, 0)?;
            }
            tag::PROTOCOL_VERSIONS_SUPPORTED => {
                fps_ensure!(
                    value.len() % 4 == 0,
                    Status::ParserErr,
                    "supported versions length {} is not a multiple of 4",
                    value.len()
                );
                fps_ensure!(
                    value.len() / 4 < MAX_NUM_CRYPTO_VERSIONS,
                    Status::ParamErr,
                    "too many supported versions ({})",
                    value.len() / 4
                );
                self.versions_supported = value
                    .chunks_exact(4)
                    .map(BigEndian::read_u32)
                    .collect();
            }
            tag::PROTOCOL_VERSION_USED => {
                exact(value, 4, tllv.tag, Status::ParserErr)?;
                self.version_used = read_u32(value, 0)?;
            }
            tag::STREAMING_INDICATOR => {
                exact(value, 8, tllv.tag, Status::ParserErr)?;
                self.streaming_indicator = Some(read_u64(value, 0)?);
            }
            tag::MEDIA_PLAYBACK_STATE => {
                exact(value, 16, tllv.tag, Status::ParamErr)?;
                self.playback = Some(MediaPlaybackState {
                    date: read_u32(value, 0)?,
                    state: PlaybackState::from_value(read_u32(value, 4)?),
                    playback_id: read_u64(value, 8)?,
                });
            }
            tag::CAPABILITIES => {
                self.capabilities =
                    exact(value, CAPABILITIES_FLAGS_LENGTH, tllv.tag, Status::ParamErr)?;
                debug!("Client capabilities: 0x{}", hex::encode(&self.capabilities));
            }
            tag::DEVICE_INFO => {
                self.device_info = Some(DeviceInfo::parse(value)?);
            }
            tag::DEVICE_IDENTITY => {
                self.device_identity = Some(DeviceIdentity::parse(value)?);
            }
            tag::OFFLINE_SYNC => self.parse_offline_sync(value)?,
            tag::SUPPORTED_KEY_FORMAT => self.parse_supported_key_formats(value)?,
            tag::SECURITY_LEVEL_REPORT => self.parse_security_level_report(value)?,
            tag::KDL_VERSION_REPORT => {
                exact(value, 4, tllv.tag, Status::ParserErr)?;
                self.kdl_version = read_u32(value, 0)?;
            }
            tag::VM_DEVICE_INFO => {
                self.vm_device_info = VmDeviceInfo::parse(value)?;
            }
            _ => policy.parse_custom_tag(tllv, self)?,
        }

        Ok(())
    }

    fn parse_offline_sync(&mut self, value: &[u8]) -> Result<()> {
        let version = read_u32(value, 0)?;
        // 4B reserved
        self.sync.version = version;

        match version {
            1 => {
                let mut content_id = [0u8; OFFLINE_CONTENT_ID_LENGTH];
                content_id.copy_from_slice(read_bytes(value, 8, OFFLINE_CONTENT_ID_LENGTH)?);
                self.sync.content_id = Some(content_id);
                self.sync.duration_to_expiry = read_u32(value, 24)?;
            }
            2 => {
                self.sync.server_challenge = read_u64(value, 8)?;
                self.sync.flags = read_u64(value, 16)?;
                self.sync
                    .title_id
                    .copy_from_slice(read_bytes(value, 24, MAX_TITLE_ID_LENGTH)?);
                self.sync.duration_to_expiry = read_u32(value, 40)?;
                let records = read_u32(value, 44)? as usize;
                let len = match records.checked_mul(OFFLINE_CONTENT_ID_LENGTH) {
                    Some(len) => len,
                    None => fps_bail!(Status::ParamErr, "deleted record count {} overflows", records),
                };
                self.sync.records_deleted = records;
                self.sync.deleted_content_ids = read_bytes(value, 48, len)?.to_vec();
            }
            other => {
                debug!("Ignoring offline sync version {}", other);
            }
        }

        Ok(())
    }

    fn parse_supported_key_formats(&mut self, value: &[u8]) -> Result<()> {
        let version = read_u32(value, 0)?;
        if version != SPC_TLLV_VERSION {
            debug!("Ignoring supported key format version {}", version);
            return Ok(());
        }

        let count = read_u32(value, 8)? as usize;
        fps_ensure!(
            count <= MAX_KEY_FORMATS,
            Status::ParamErr,
            "too many supported key formats ({})",
            count
        );
        self.supported_key_formats = (0..count)
            .map(|i| read_u64(value, 12 + i * 8))
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    fn parse_security_level_report(&mut self, value: &[u8]) -> Result<()> {
        if value.len() == ENCRYPTED_SECURITY_LEVEL_REPORT_SZ {
            // Encrypted form, only meaningful to the client.
            return Ok(());
        }

        let version = read_u32(value, 0)?;
        if version != SPC_TLLV_VERSION {
            debug!("Ignoring security level report version {}", version);
            return Ok(());
        }

        let reserved = read_u32(value, 4)?;
        fps_ensure!(
            reserved == 0,
            Status::ParamErr,
            "security level report reserved field is 0x{:x}",
            reserved
        );

        self.security_level = Some(read_u64(value, 8)?);
        let kdl_version = read_u32(value, 16)?;
        if self.kdl_version == 0 {
            self.kdl_version = kdl_version;
        }
        Ok(())
    }

    /// Copy every TLLV named in the return request into `return_tllvs`.
    fn collect_return_tllvs(&mut self) -> Result<()> {
        fps_ensure!(!self.tllvs.is_empty(), Status::ParserErr, "SPC carries no TLLVs");

        for requested in &self.return_request {
            let found = self.tllvs.iter().find(|t| t.tag == *requested);
            match found {
                Some(tllv) => {
                    if !self.return_tllvs.iter().any(|t| t.tag == *requested) {
                        self.return_tllvs.push(tllv.clone());
                    }
                }
                None => fps_bail!(
                    Status::MissingRequiredTagErr,
                    "return request names absent TLLV 0x{:016x}",
                    requested
                ),
            }
        }
        Ok(())
    }

    fn check_required_tags(&self) -> Result<()> {
        for required in tag::REQUIRED {
            fps_ensure!(
                self.has_tag(required),
                Status::MissingRequiredTagErr,
                "required TLLV {} (0x{:016x}) is missing",
                tag::name(required),
                required
            );
        }
        Ok(())
    }
}

/// Parsed SPC container.
#[derive(Debug, Clone)]
pub struct SpcContainer {
    pub version: u32,
    pub reserved: u32,
    pub iv: [u8; AES128_IV_SZ],
    pub wrapped_key: Vec<u8>,
    pub certificate_hash: [u8; CERT_HASH_SZ],
    pub payload_offset: usize,
    pub payload_size: usize,
    pub decrypted_payload: Vec<u8>,
    pub data: SpcData,
}

impl SpcContainer {
    /// Parse, decrypt and validate an SPC.
    pub fn parse(spc: &[u8], credentials: &Credentials, policy: &dyn Policy) -> Result<Self> {
        let mut container = Self::parse_header(spc)?;
        container.decrypt(spc, credentials)?;
        container.data = SpcData::parse(&container.decrypted_payload, policy)?;
        Ok(container)
    }

    /// Parse the unencrypted container header.
    pub fn parse_header(spc: &[u8]) -> Result<Self> {
        let version = read_u32(spc, 0)?;
        let wrapped_key_size = match version {
            SPC_VERSION_1 => V1_WRAPPED_KEY_SZ,
            SPC_VERSION_2 => V2_WRAPPED_KEY_SZ,
            other => fps_bail!(Status::SpcVersionErr, "unsupported SPC version {}", other),
        };

        let mut offset = 4;
        let reserved = read_u32(spc, offset)?;
        offset += 4;

        let mut iv = [0u8; AES128_IV_SZ];
        iv.copy_from_slice(read_bytes(spc, offset, AES128_IV_SZ)?);
        offset += AES128_IV_SZ;

        let wrapped_key = read_bytes(spc, offset, wrapped_key_size)?.to_vec();
        offset += wrapped_key_size;

        let mut certificate_hash = [0u8; CERT_HASH_SZ];
        certificate_hash.copy_from_slice(read_bytes(spc, offset, CERT_HASH_SZ)?);
        offset += CERT_HASH_SZ;

        let payload_size = read_u32(spc, offset)? as usize;
        offset += 4;

        fps_ensure!(
            offset
                .checked_add(payload_size)
                .is_some_and(|end| end <= spc.len()),
            Status::ParamErr,
            "SPC payload of {} bytes at offset {} exceeds SPC of {} bytes",
            payload_size,
            offset,
            spc.len()
        );

        debug!(
            "SPC version {} payload size {} certificate hash {}",
            version,
            payload_size,
            hex::encode(certificate_hash)
        );

        Ok(Self {
            version,
            reserved,
            iv,
            wrapped_key,
            certificate_hash,
            payload_offset: offset,
            payload_size,
            decrypted_payload: Vec::new(),
            data: SpcData::default(),
        })
    }

    /// Unwrap the AES key and decrypt the payload.
    pub fn decrypt(&mut self, spc: &[u8], credentials: &Credentials) -> Result<()> {
        let payload = read_bytes(spc, self.payload_offset, self.payload_size)?;
        fps_ensure!(
            !payload.is_empty() && payload.len() % 16 == 0,
            Status::ParamErr,
            "SPC payload size {} is not a non-zero multiple of 16",
            payload.len()
        );

        let key: [u8; AES128_KEY_SZ] = credentials.unwrap_key(self.version, &self.wrapped_key)?;
        self.decrypted_payload = aes_cbc_decrypt(&key, &self.iv, payload)?;
        Ok(())
    }
}

/// Require `value` to be exactly `len` bytes and copy it.
fn exact(value: &[u8], len: usize, tag: u64, status: Status) -> Result<Vec<u8>> {
    fps_ensure!(
        value.len() == len,
        status,
        "TLLV {} length {} != {}",
        tag::name(tag),
        value.len(),
        len
    );
    Ok(value.to_vec())
}
