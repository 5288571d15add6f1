//! Asset protection requirements supplied with each create-ckc operation.

use std::fmt;

use crate::constants::{HdcpRequirement, PayloadContentType, AES128_IV_SZ, AES128_KEY_SZ, NO_LEASE_DURATION};

/// License type requested for the asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LicenseType {
    /// Streaming license.
    #[default]
    None,
    /// Persistable license for offline HLS playback.
    OfflineHls,
}

/// Deployment classification of the content.
///
/// Drives the security level and HDCP checks of the default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Unknown,
    Audio,
    Sd,
    Hd,
    Uhd,
}

impl ContentType {
    /// Map a `content-type` request value. Anything unrecognised is `Unknown`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "uhd" => ContentType::Uhd,
            "hd" => ContentType::Hd,
            "sd" => ContentType::Sd,
            "audio" => ContentType::Audio,
            _ => ContentType::Unknown,
        }
    }

    /// Request value of this content type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Uhd => "uhd",
            ContentType::Hd => "hd",
            ContentType::Sd => "sd",
            ContentType::Audio => "audio",
            ContentType::Unknown => "unknown",
        }
    }

    /// Content type handed to the content key payload library.
    #[must_use]
    pub fn payload_content_type(self) -> PayloadContentType {
        match self {
            ContentType::Uhd | ContentType::Hd | ContentType::Sd => PayloadContentType::Video,
            ContentType::Audio => PayloadContentType::Audio,
            ContentType::Unknown => PayloadContentType::Unknown,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protection requirements of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    /// Content key. All zero when not provided (lease renewal).
    pub content_key: [u8; AES128_KEY_SZ],
    /// Content IV. All zero when not provided.
    pub content_iv: [u8; AES128_IV_SZ],
    /// Whether the request carried a content key and IV.
    pub is_content_key_provided: bool,
    pub hdcp_requirement: HdcpRequirement,
    /// Lease duration in seconds, starting at SPC creation.
    pub lease_duration: u32,
    /// Rental duration in seconds, starting at asset download.
    pub rental_duration: u32,
    /// Playback duration in seconds, starting at first playback.
    pub playback_duration: u32,
    pub license_type: LicenseType,
    /// Id of one HLS sub-stream (offline HLS only).
    pub stream_id: Option<Vec<u8>>,
    /// Id of the title shared by all its sub-streams (offline HLS only).
    pub title_id: Option<Vec<u8>>,
    pub content_type: ContentType,
}

impl Default for AssetInfo {
    fn default() -> Self {
        Self {
            content_key: [0; AES128_KEY_SZ],
            content_iv: [0; AES128_IV_SZ],
            is_content_key_provided: false,
            hdcp_requirement: HdcpRequirement::default(),
            lease_duration: NO_LEASE_DURATION,
            rental_duration: 0,
            playback_duration: 0,
            license_type: LicenseType::None,
            stream_id: None,
            title_id: None,
            content_type: ContentType::Unknown,
        }
    }
}

impl AssetInfo {
    /// True when a lease duration was requested.
    #[must_use]
    pub fn is_lease_requested(&self) -> bool {
        self.lease_duration != NO_LEASE_DURATION
    }

    /// True for offline HLS licenses.
    #[must_use]
    pub fn is_offline_hls(&self) -> bool {
        self.license_type == LicenseType::OfflineHls
    }
}

#[cfg(test)]
mod tests {
    use super::{AssetInfo, ContentType};
    use crate::constants::{HdcpRequirement, PayloadContentType, NO_LEASE_DURATION};

    #[test]
    fn defaults() {
        let asset = AssetInfo::default();
        assert_eq!(asset.lease_duration, NO_LEASE_DURATION);
        assert!(!asset.is_lease_requested());
        assert_eq!(asset.hdcp_requirement, HdcpRequirement::Type0);
        assert_eq!(asset.content_key, [0u8; 16]);
    }

    #[test]
    fn content_type_names() {
        assert_eq!(ContentType::from_name("uhd"), ContentType::Uhd);
        assert_eq!(ContentType::from_name("4k"), ContentType::Unknown);
        assert_eq!(ContentType::Sd.payload_content_type(), PayloadContentType::Video);
        assert_eq!(ContentType::Audio.payload_content_type(), PayloadContentType::Audio);
        assert_eq!(ContentType::Hd.to_string(), "hd");
    }
}
