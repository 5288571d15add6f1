//! FairPlay Streaming protocol constants: TLLV tags, field sizes and enumerated values.

/// TLLV tag values used in SPC and CKC payloads.
pub mod tag {
    /// R2 session key material (SPC).
    pub const R2: u64 = 0x71b5595ac1521133;
    /// Anti-replay seed (SPC).
    pub const ANTI_REPLAY: u64 = 0x89c90f12204106b2;
    /// Encrypted session key SK..R1 (SPC).
    pub const SESSION_KEY_R1: u64 = 0x3d1a10b8bffac2ec;
    /// Integrity tag of SK..R1 (SPC).
    pub const SESSION_KEY_R1_INTEGRITY: u64 = 0xb349d4809e910687;
    /// Asset identifier (SPC).
    pub const ASSET_ID: u64 = 0x1bf7f53f5d5d5a1f;
    /// Transaction identifier (SPC).
    pub const TRANSACTION_ID: u64 = 0x47aa7ad3440577de;
    /// Protocol version used by the client (SPC).
    pub const PROTOCOL_VERSION_USED: u64 = 0x5d81bcbcc7f61703;
    /// Protocol versions supported by the client (SPC).
    pub const PROTOCOL_VERSIONS_SUPPORTED: u64 = 0x67b8fb79ecce1a13;
    /// List of tags the server must echo back (SPC).
    pub const RETURN_REQUEST: u64 = 0x19f9d4e5ab7609cb;
    /// R1 (CKC).
    pub const R1: u64 = 0xea74c4645d5efee9;
    /// Streaming indicator (SPC).
    pub const STREAMING_INDICATOR: u64 = 0xabb0256a31843974;
    /// Media playback state (SPC).
    pub const MEDIA_PLAYBACK_STATE: u64 = 0xeb8efdf2b25ab3a0;
    /// Offline sync / check-in data (SPC).
    pub const OFFLINE_SYNC: u64 = 0x77966de1dc1083ad;
    /// Client capability flags (SPC).
    pub const CAPABILITIES: u64 = 0x9c02af3253c07fb2;
    /// Key duration (CKC).
    pub const KEY_DURATION: u64 = 0x47acf6a418cd091a;
    /// Offline key (CKC).
    pub const OFFLINE_KEY: u64 = 0x6375d9727060218c;
    /// HDCP information (CKC).
    pub const HDCP_INFORMATION: u64 = 0x2e52f1530d8ddb4a;
    /// Required security level (CKC).
    pub const SECURITY_LEVEL: u64 = 0x644cb1dac0313250;
    /// Supported key formats (SPC).
    pub const SUPPORTED_KEY_FORMAT: u64 = 0x8d8e84fa6cc35eb7;
    /// Security level report (SPC).
    pub const SECURITY_LEVEL_REPORT: u64 = 0xb18ee16ea50f6c02;
    /// Device info (SPC).
    pub const DEVICE_INFO: u64 = 0xd43fc6abc596aae7;
    /// Device identity (SPC).
    pub const DEVICE_IDENTITY: u64 = 0x94c17cd676c69b59;
    /// Kext deny list version report (SPC).
    pub const KDL_VERSION_REPORT: u64 = 0x70eca6573388e329;
    /// Virtual machine device info (SPC).
    pub const VM_DEVICE_INFO: u64 = 0x756440e240499f70;

    /// Tags every SPC must carry.
    pub const REQUIRED: [u64; 9] = [
        SESSION_KEY_R1,
        ANTI_REPLAY,
        R2,
        ASSET_ID,
        TRANSACTION_ID,
        PROTOCOL_VERSION_USED,
        PROTOCOL_VERSIONS_SUPPORTED,
        RETURN_REQUEST,
        SESSION_KEY_R1_INTEGRITY,
    ];

    /// Human readable tag name for logs and inspection output.
    #[must_use]
    pub fn name(tag: u64) -> &'static str {
        match tag {
            R2 => "r2",
            ANTI_REPLAY => "antiReplay",
            SESSION_KEY_R1 => "sessionKeyR1",
            SESSION_KEY_R1_INTEGRITY => "sessionKeyR1Integrity",
            ASSET_ID => "assetID",
            TRANSACTION_ID => "transactionID",
            PROTOCOL_VERSION_USED => "protocolVersionUsed",
            PROTOCOL_VERSIONS_SUPPORTED => "protocolVersionsSupported",
            RETURN_REQUEST => "returnRequest",
            R1 => "r1",
            STREAMING_INDICATOR => "streamingIndicator",
            MEDIA_PLAYBACK_STATE => "mediaPlaybackState",
            OFFLINE_SYNC => "offlineSync",
            CAPABILITIES => "capabilities",
            KEY_DURATION => "keyDuration",
            OFFLINE_KEY => "offlineKey",
            HDCP_INFORMATION => "hdcpInformation",
            SECURITY_LEVEL => "securityLevel",
            SUPPORTED_KEY_FORMAT => "supportedKeyFormat",
            SECURITY_LEVEL_REPORT => "securityLevelReport",
            DEVICE_INFO => "deviceInfo",
            DEVICE_IDENTITY => "deviceIdentity",
            KDL_VERSION_REPORT => "kdlVersionReport",
            VM_DEVICE_INFO => "vmDeviceInfo",
            _ => "unknown",
        }
    }
}

/// AES-128 key size.
pub const AES128_KEY_SZ: usize = 16;
/// AES-128 IV size.
pub const AES128_IV_SZ: usize = 16;
/// AES block size.
pub const AES128_BLOCK_SIZE: usize = 16;

/// Minimum asset id length.
pub const ASSET_ID_MIN_SZ: usize = 2;
/// Maximum asset id length.
pub const ASSET_ID_MAX_SZ: usize = 200;
/// SK..R1 integrity tag size.
pub const SKR1_INTEGRITY_SZ: usize = 16;
/// Certificate hash size in the SPC header.
pub const CERT_HASH_SZ: usize = 20;
/// R2 size.
pub const R2_SZ: usize = 21;
/// R1 size.
pub const R1_SZ: usize = 44;
/// Client HU size.
pub const HU_SZ: usize = 20;
/// SK..R1 size.
pub const SKR1_SZ: usize = 112;
/// Anti-replay seed size.
pub const ANTI_REPLAY_SZ: usize = 16;
/// Wrapped AES key size in a version 1 SPC (RSA 1024).
pub const V1_WRAPPED_KEY_SZ: usize = 128;
/// Wrapped AES key size in a version 2 SPC (RSA 2048).
pub const V2_WRAPPED_KEY_SZ: usize = 256;
/// Size of an encrypted security level report, which the server ignores.
pub const ENCRYPTED_SECURITY_LEVEL_REPORT_SZ: usize = 32;

/// Lease duration value meaning "no lease requested".
pub const NO_LEASE_DURATION: u32 = 0xFFFF_FFFF;
/// Maximum stream id length.
pub const MAX_STREAM_ID_LENGTH: usize = 16;
/// Maximum title id length.
pub const MAX_TITLE_ID_LENGTH: usize = 16;
/// Upper bound on supported protocol versions in one SPC.
pub const MAX_NUM_CRYPTO_VERSIONS: usize = 100;
/// Vendor hash length in the device identity TLLV.
pub const VENDOR_HASH_LENGTH: usize = 8;
/// Product hash length in the device identity TLLV.
pub const PRODUCT_HASH_LENGTH: usize = 8;
/// Capability flags length.
pub const CAPABILITIES_FLAGS_LENGTH: usize = 16;
/// Length of one offline content id.
pub const OFFLINE_CONTENT_ID_LENGTH: usize = 16;
/// TLLV header size (tag + total length + value length).
pub const TLLV_HEADER_SZ: usize = 16;
/// Maximum number of supported key formats.
pub const MAX_KEY_FORMATS: usize = 64;
/// Version of the key payload structure passed to the vendor library.
pub const KEY_PAYLOAD_STRUCT_VERSION: u64 = 1;
/// Security level TLLV version.
pub const SECURITY_LEVEL_TLLV_VERSION: u32 = 1;
/// Versioned SPC TLLVs are only interpreted at this version.
pub const SPC_TLLV_VERSION: u32 = 1;
/// Offline key TLLV version 1.
pub const OFFLINE_KEY_TLLV_VERSION: u32 = 1;
/// Offline key TLLV version 2 (adds the title id).
pub const OFFLINE_KEY_TLLV_VERSION_2: u32 = 2;
/// Sync flag: the sync title id field is valid.
pub const SYNC_FLAG_TITLE_ID_VALID: u64 = 1 << 3;
/// Reserved field value of the key duration TLLV.
pub const KEY_DURATION_RESERVED_FIELD_VALUE: u32 = 0x86d3_4a3a;
/// Minimum accepted Kext deny list version.
pub const MIN_KDL_VERSION: u32 = 31;
/// CKC container version.
pub const CKC_VERSION: u32 = 1;

/// Capability bit: HDCP type 1 enforcement.
pub const CAPABILITY_HDCP_TYPE1_ENFORCEMENT_SUPPORTED: u64 = 1;
/// Capability bit: offline key (dual expiry).
pub const CAPABILITY_OFFLINE_KEY_SUPPORTED: u64 = 1 << 1;
/// Capability bit: check-in.
pub const CAPABILITY_CHECK_IN_SUPPORTED: u64 = 1 << 2;
/// Capability bit: offline key TLLV version 2.
pub const CAPABILITY_OFFLINE_KEY_V2_SUPPORTED: u64 = 1 << 3;
/// Capability bit: security level baseline.
pub const CAPABILITY_SECURITY_LEVEL_BASELINE_SUPPORTED: u64 = 1 << 4;
/// Capability bit: security level main.
pub const CAPABILITY_SECURITY_LEVEL_MAIN_SUPPORTED: u64 = 1 << 5;

/// Key format tag for a plain 16 byte content key buffer.
pub const KEY_FORMAT_BUF_16_BYTE: u64 = 0x58b3_8165_af0e_3d5a;

/// Key duration type carried in the key duration TLLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum KeyDurationType {
    /// No expiry terms.
    #[default]
    None = 0,
    /// Lease.
    Lease = 0x1a4b_de7e,
    /// Rental.
    Rental = 0x3dfe_45a0,
    /// Lease and rental.
    LeaseAndRental = 0x27b5_9bde,
    /// Persistent offline key.
    Persistence = 0x3df2_d9fb,
    /// Persistent offline key with rental/playback durations.
    PersistenceAndDuration = 0x18f0_6048,
}

impl KeyDurationType {
    /// Wire value.
    #[must_use]
    pub fn value(self) -> u32 {
        self as u32
    }
}

/// HDCP requirement sent in the HDCP information TLLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u64)]
pub enum HdcpRequirement {
    /// No HDCP required.
    NotRequired = 0xef72_894c_a789_5b78,
    /// HDCP type 0.
    #[default]
    Type0 = 0x4079_1ac7_8bd5_c571,
    /// HDCP type 1.
    Type1 = 0x285a_0863_bba8_e1d3,
}

impl HdcpRequirement {
    /// Wire value.
    #[must_use]
    pub fn value(self) -> u64 {
        self as u64
    }

    /// Parse the `hdcp-type` request value (-1, 0 or 1).
    #[must_use]
    pub fn from_request(hdcp_type: i64) -> Option<Self> {
        match hdcp_type {
            -1 => Some(HdcpRequirement::NotRequired),
            0 => Some(HdcpRequirement::Type0),
            1 => Some(HdcpRequirement::Type1),
            _ => None,
        }
    }
}

/// Security level, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u64)]
pub enum SecurityLevel {
    /// Audio only.
    Audio = 0x17d9_9d57_4eed_567d,
    /// Baseline.
    Baseline = 0x32f0_0049_66a5_c4f8,
    /// Main.
    #[default]
    Main = 0x4e7f_d924_21d5_88b4,
}

impl SecurityLevel {
    /// Wire value.
    #[must_use]
    pub fn value(self) -> u64 {
        self as u64
    }

    /// Map a reported value to a known level.
    #[must_use]
    pub fn from_value(value: u64) -> Option<Self> {
        match value {
            v if v == SecurityLevel::Audio as u64 => Some(SecurityLevel::Audio),
            v if v == SecurityLevel::Baseline as u64 => Some(SecurityLevel::Baseline),
            v if v == SecurityLevel::Main as u64 => Some(SecurityLevel::Main),
            _ => None,
        }
    }
}

/// Content type passed to the vendor key payload library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u64)]
pub enum PayloadContentType {
    /// Unknown content.
    #[default]
    Unknown = 0,
    /// Video content.
    Video = 1,
    /// Audio content.
    Audio = 3,
}

/// Device class reported in device identity and VM info TLLVs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Unknown.
    Unknown,
    /// Apple TV.
    AppleLivingRoom,
    /// iPhone / iPad.
    AppleMobile,
    /// Mac.
    AppleDesktop,
    /// Vision.
    AppleSpacial,
    /// Watch.
    AppleWearable,
    /// Unknown Apple device.
    AppleUnknown,
    /// Partner living room device.
    PartnerLivingRoom,
    /// Unknown partner device.
    PartnerUnknown,
    /// Any other reported value.
    Other(u32),
}

impl DeviceClass {
    /// Map a wire value.
    #[must_use]
    pub fn from_value(value: u32) -> Self {
        match value {
            0 => DeviceClass::Unknown,
            1 => DeviceClass::AppleLivingRoom,
            2 => DeviceClass::AppleMobile,
            3 => DeviceClass::AppleDesktop,
            4 => DeviceClass::AppleSpacial,
            5 => DeviceClass::AppleWearable,
            127 => DeviceClass::AppleUnknown,
            128 => DeviceClass::PartnerLivingRoom,
            255 => DeviceClass::PartnerUnknown,
            other => DeviceClass::Other(other),
        }
    }

    /// Wire value.
    #[must_use]
    pub fn value(self) -> u32 {
        match self {
            DeviceClass::Unknown => 0,
            DeviceClass::AppleLivingRoom => 1,
            DeviceClass::AppleMobile => 2,
            DeviceClass::AppleDesktop => 3,
            DeviceClass::AppleSpacial => 4,
            DeviceClass::AppleWearable => 5,
            DeviceClass::AppleUnknown => 127,
            DeviceClass::PartnerLivingRoom => 128,
            DeviceClass::PartnerUnknown => 255,
            DeviceClass::Other(value) => value,
        }
    }

    /// Name reported for virtual machine hosts and guests.
    ///
    /// Partner classes should never appear for virtual machines and are
    /// reported as unknown.
    #[must_use]
    pub fn vm_name(self) -> &'static str {
        match self {
            DeviceClass::AppleDesktop => "appleDesktop",
            DeviceClass::AppleMobile => "appleMobile",
            DeviceClass::AppleWearable => "appleWearable",
            DeviceClass::AppleLivingRoom => "appleLivingRoom",
            DeviceClass::AppleSpacial => "appleSpacial",
            _ => "Unknown",
        }
    }
}

/// Apple device type reported in the device info TLLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppleDeviceType {
    /// Mac.
    Mac,
    /// Apple TV.
    Tv,
    /// iPhone / iPad.
    Ios,
    /// Watch.
    Watch,
    /// Anything else.
    Other(u64),
}

impl AppleDeviceType {
    /// Map a wire value.
    #[must_use]
    pub fn from_value(value: u64) -> Self {
        match value {
            0x358c_41b1_ec78_f599 => AppleDeviceType::Mac,
            0xc150_0767_c86c_1fae => AppleDeviceType::Tv,
            0x8551_fd5e_31f4_79b3 => AppleDeviceType::Ios,
            0x5da8_6ac0_c571_55dc => AppleDeviceType::Watch,
            other => AppleDeviceType::Other(other),
        }
    }
}

/// Media playback state reported in the playback state TLLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Ready to start playing; a content key is required.
    FirstPlaybackCkRequired,
    /// Playing; a content key is required for the next segment.
    CurrentlyPlayingCkRequired,
    /// Playing or paused; no content key is required.
    CurrentlyPlayingCkNotRequired,
    /// Anything else.
    Other(u32),
}

impl PlaybackState {
    /// Map a wire value.
    #[must_use]
    pub fn from_value(value: u32) -> Self {
        match value {
            0xf4de_e5a2 => PlaybackState::FirstPlaybackCkRequired,
            0x4f83_4330 => PlaybackState::CurrentlyPlayingCkRequired,
            0xa5d6_739e => PlaybackState::CurrentlyPlayingCkNotRequired,
            other => PlaybackState::Other(other),
        }
    }
}

/// SPC container versions.
pub const SPC_VERSION_1: u32 = 1;
/// SPC container version 2 (RSA 2048 / OAEP-SHA256).
pub const SPC_VERSION_2: u32 = 2;

/// Server information packed into the CKC reserved field.
pub mod server_info {
    /// Implementation language code for Rust.
    pub const LANGUAGE_RUST: u32 = 2;
    /// Platform code for x86_64.
    pub const PLATFORM_X86_64: u32 = 1;
    /// Platform code for aarch64.
    pub const PLATFORM_AARCH64: u32 = 2;
}

#[cfg(test)]
mod tests {
    use super::{tag, DeviceClass, HdcpRequirement, SecurityLevel};

    #[test]
    fn security_levels_are_ordered() {
        assert!(SecurityLevel::Audio < SecurityLevel::Baseline);
        assert!(SecurityLevel::Baseline < SecurityLevel::Main);
        assert_eq!(
            SecurityLevel::from_value(0x4e7fd92421d588b4),
            Some(SecurityLevel::Main)
        );
        assert_eq!(SecurityLevel::from_value(7), None);
    }

    #[test]
    fn hdcp_request_values() {
        assert_eq!(HdcpRequirement::from_request(-1), Some(HdcpRequirement::NotRequired));
        assert_eq!(HdcpRequirement::from_request(1), Some(HdcpRequirement::Type1));
        assert_eq!(HdcpRequirement::from_request(2), None);
    }

    #[test]
    fn device_class_vm_names() {
        assert_eq!(DeviceClass::from_value(3).vm_name(), "appleDesktop");
        assert_eq!(DeviceClass::from_value(128).vm_name(), "Unknown");
        assert_eq!(DeviceClass::from_value(42).value(), 42);
    }

    #[test]
    fn required_tags_have_names() {
        for required in tag::REQUIRED {
            assert_ne!(tag::name(required), "unknown");
        }
    }
}
