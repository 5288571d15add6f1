//! Business rules and deployment hooks.
//!
//! A [`Policy`] decides whether a license may be issued and lets a deployment
//! plug in its own TLLV handling, asset lookup and result post-processing.
//! [`DefaultPolicy`] applies the stock rules in [`check_business_rules`].

use crate::asset::{AssetInfo, ContentType};
use crate::constants::{
    HdcpRequirement, PayloadContentType, SecurityLevel, MIN_KDL_VERSION, NO_LEASE_DURATION,
    OFFLINE_CONTENT_ID_LENGTH,
};
use crate::error::{Result, Status};
use crate::operation::OperationResult;
use crate::session::Session;
use crate::spc::SpcData;
use crate::tllv::Tllv;

/// Deployment specific behaviour of the key server.
///
/// Every method has a default, so an implementation only overrides what it
/// needs.
pub trait Policy: Send + Sync {
    /// Handle a TLLV tag the server does not know about.
    fn parse_custom_tag(&self, tllv: &Tllv, _data: &mut SpcData) -> Result<()> {
        debug!("Ignoring unknown TLLV 0x{:016x}", tllv.tag);
        Ok(())
    }

    /// Fill in asset information not provided with the request, typically
    /// by looking up `spc.asset_id`.
    fn query_database(&self, _asset_info: &mut AssetInfo, _spc: &SpcData) -> Result<()> {
        Ok(())
    }

    /// Validate the request and return the security level the CKC requires.
    fn check_business_rules(
        &self,
        asset_info: &AssetInfo,
        is_check_in: bool,
        spc: &SpcData,
    ) -> Result<SecurityLevel> {
        check_business_rules(asset_info, is_check_in, spc)
    }

    /// Content type reported to the content key payload library.
    fn payload_content_type(&self, asset_info: &AssetInfo) -> PayloadContentType {
        asset_info.content_type.payload_content_type()
    }

    /// Add custom fields once the standard result fields are populated.
    fn populate_results(
        &self,
        _session: &mut Session,
        _asset_info: &AssetInfo,
        _result: &mut OperationResult,
    ) -> Result<()> {
        Ok(())
    }

    /// Adjust the result after the CKC has been generated.
    fn finalize_results(&self, _session: &Session, _result: &mut OperationResult) -> Result<()> {
        Ok(())
    }

    /// Content id placed in a version 1 offline key TLLV without a stream id.
    fn offline_content_id(&self, _session: &Session) -> [u8; OFFLINE_CONTENT_ID_LENGTH] {
        [0; OFFLINE_CONTENT_ID_LENGTH]
    }
}

/// Stock policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl Policy for DefaultPolicy {}

/// Stock business rules. The first failing check wins.
///
/// 1. A reported Kext deny list version must be at least `MIN_KDL_VERSION`.
/// 2. A lease cannot be combined with offline HLS.
/// 3. A check-in needs sync data in the SPC.
/// 4. The content type sets the required security level and HDCP type.
/// 5. HDCP type 1 needs client support.
pub fn check_business_rules(
    asset_info: &AssetInfo,
    is_check_in: bool,
    spc: &SpcData,
) -> Result<SecurityLevel> {
    if spc.kdl_version > 0 && spc.kdl_version < MIN_KDL_VERSION {
        fps_bail!(
            Status::ClientSecurityLevelErr,
            "client KDL version {} is below the minimum {}",
            spc.kdl_version,
            MIN_KDL_VERSION
        );
    }

    if asset_info.lease_duration != NO_LEASE_DURATION
        && asset_info.lease_duration != 0
        && asset_info.is_offline_hls()
    {
        fps_bail!(Status::ParamErr, "lease is not supported for offline HLS");
    }

    fps_ensure!(
        !is_check_in || spc.sync.flags != 0,
        Status::ParamErr,
        "check-in requested but the SPC has no sync flags"
    );

    let features = &spc.client_features;
    let required = match asset_info.content_type {
        ContentType::Uhd => {
            match spc.security_level {
                Some(level) if level < SecurityLevel::Main.value() => fps_bail!(
                    Status::ClientSecurityLevelErr,
                    "UHD content requires security level Main, client supports 0x{:X}",
                    level
                ),
                Some(_) => {}
                // Older clients report nothing; only reject explicit Baseline-only support.
                None => fps_ensure!(
                    !(features.supports_security_level_baseline
                        && !features.supports_security_level_main),
                    Status::ClientSecurityLevelErr,
                    "UHD content requires security level Main, client supports Baseline"
                ),
            }
            fps_ensure!(
                asset_info.hdcp_requirement == HdcpRequirement::Type1,
                Status::ParamErr,
                "UHD content requires HDCP type 1"
            );
            SecurityLevel::Main
        }
        ContentType::Hd | ContentType::Sd => {
            if let Some(level) = spc.security_level {
                fps_ensure!(
                    level >= SecurityLevel::Baseline.value(),
                    Status::ClientSecurityLevelErr,
                    "{} content requires security level Baseline, client supports 0x{:X}",
                    asset_info.content_type,
                    level
                );
            }
            if asset_info.content_type == ContentType::Hd {
                fps_ensure!(
                    asset_info.hdcp_requirement != HdcpRequirement::NotRequired,
                    Status::ParamErr,
                    "HD content requires HDCP"
                );
            }
            SecurityLevel::Baseline
        }
        ContentType::Audio => SecurityLevel::Audio,
        ContentType::Unknown => {
            warn!("Unknown content type, requiring security level Main");
            SecurityLevel::Main
        }
    };

    if asset_info.hdcp_requirement == HdcpRequirement::Type1 && !features.supports_hdcp_type1 {
        fps_bail!(
            Status::ClientSecurityLevelErr,
            "HDCP type 1 enforcement requested but not supported by the client"
        );
    }

    Ok(required)
}

#[cfg(test)]
mod tests {
    use super::check_business_rules;
    use crate::asset::{AssetInfo, ContentType, LicenseType};
    use crate::constants::{HdcpRequirement, SecurityLevel};
    use crate::error::Status;
    use crate::spc::SpcData;

    fn asset(content_type: ContentType, hdcp: HdcpRequirement) -> AssetInfo {
        AssetInfo {
            content_type,
            hdcp_requirement: hdcp,
            ..AssetInfo::default()
        }
    }

    fn status(asset: &AssetInfo, check_in: bool, spc: &SpcData) -> Status {
        check_business_rules(asset, check_in, spc)
            .expect_err("rule violation")
            .status()
    }

    #[test]
    fn uhd_type1_without_capability() {
        let spc = SpcData::default();
        let asset = asset(ContentType::Uhd, HdcpRequirement::Type1);
        assert_eq!(status(&asset, false, &spc), Status::ClientSecurityLevelErr);

        let mut spc = SpcData::default();
        spc.client_features.supports_hdcp_type1 = true;
        assert_eq!(
            check_business_rules(&asset, false, &spc).expect("allowed"),
            SecurityLevel::Main
        );
    }

    #[test]
    fn uhd_requires_main_and_type1() {
        let mut spc = SpcData::default();
        spc.client_features.supports_hdcp_type1 = true;
        spc.security_level = Some(SecurityLevel::Baseline.value());
        let uhd = asset(ContentType::Uhd, HdcpRequirement::Type1);
        assert_eq!(status(&uhd, false, &spc), Status::ClientSecurityLevelErr);

        spc.security_level = None;
        spc.client_features.supports_security_level_baseline = true;
        assert_eq!(status(&uhd, false, &spc), Status::ClientSecurityLevelErr);

        spc.client_features.supports_security_level_main = true;
        assert!(check_business_rules(&uhd, false, &spc).is_ok());

        let type0 = asset(ContentType::Uhd, HdcpRequirement::Type0);
        assert_eq!(status(&type0, false, &spc), Status::ParamErr);
    }

    #[test]
    fn lease_with_offline_hls() {
        let asset = AssetInfo {
            lease_duration: 3600,
            license_type: LicenseType::OfflineHls,
            content_type: ContentType::Audio,
            ..AssetInfo::default()
        };
        assert_eq!(status(&asset, false, &SpcData::default()), Status::ParamErr);

        let no_lease = AssetInfo {
            lease_duration: 0,
            ..asset
        };
        assert!(check_business_rules(&no_lease, false, &SpcData::default()).is_ok());
    }

    #[test]
    fn kdl_version_too_old() {
        let mut spc = SpcData::default();
        spc.kdl_version = 30;
        let audio = asset(ContentType::Audio, HdcpRequirement::Type0);
        assert_eq!(status(&audio, false, &spc), Status::ClientSecurityLevelErr);
        spc.kdl_version = 31;
        assert_eq!(
            check_business_rules(&audio, false, &spc).expect("allowed"),
            SecurityLevel::Audio
        );
    }

    #[test]
    fn check_in_needs_sync_flags() {
        let mut spc = SpcData::default();
        let audio = asset(ContentType::Audio, HdcpRequirement::Type0);
        assert_eq!(status(&audio, true, &spc), Status::ParamErr);
        spc.sync.flags = 1;
        assert!(check_business_rules(&audio, true, &spc).is_ok());
    }

    #[test]
    fn hd_and_sd_levels() {
        let mut spc = SpcData::default();
        spc.security_level = Some(SecurityLevel::Audio.value());
        let hd = asset(ContentType::Hd, HdcpRequirement::Type0);
        assert_eq!(status(&hd, false, &spc), Status::ClientSecurityLevelErr);

        spc.security_level = Some(SecurityLevel::Baseline.value());
        assert_eq!(
            check_business_rules(&hd, false, &spc).expect("hd"),
            SecurityLevel::Baseline
        );

        let hd_no_hdcp = asset(ContentType::Hd, HdcpRequirement::NotRequired);
        assert_eq!(status(&hd_no_hdcp, false, &spc), Status::ParamErr);

        let sd_no_hdcp = asset(ContentType::Sd, HdcpRequirement::NotRequired);
        assert!(check_business_rules(&sd_no_hdcp, false, &spc).is_ok());
    }

    #[test]
    fn unknown_content_requires_main() {
        let unknown = asset(ContentType::Unknown, HdcpRequirement::Type0);
        assert_eq!(
            check_business_rules(&unknown, false, &SpcData::default()).expect("allowed"),
            SecurityLevel::Main
        );
    }
}
