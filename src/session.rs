//! Per-operation server context.

use crate::asset::AssetInfo;
use crate::ckc::{CkcContainer, OfflineKeyIds};
use crate::constants::{SecurityLevel, MAX_TITLE_ID_LENGTH, SYNC_FLAG_TITLE_ID_VALID};
use crate::error::Result;
use crate::rules::Policy;
use crate::spc::SpcContainer;
use crate::utils::zero_padded;

/// State of one create-ckc operation: the parsed SPC, the CKC being built,
/// and the offline HLS identifiers derived from the request.
#[derive(Debug, Clone)]
pub struct Session {
    pub spc: SpcContainer,
    pub ckc: CkcContainer,
    pub stream_id: Option<Vec<u8>>,
    pub title_id: Option<Vec<u8>>,
    /// Level chosen by the business rules.
    pub required_security_level: SecurityLevel,
}

impl Session {
    /// Open a session for a parsed SPC and its asset.
    #[must_use]
    pub fn new(spc: SpcContainer, asset_info: &AssetInfo) -> Self {
        let (stream_id, title_id) = if asset_info.is_offline_hls() {
            (
                asset_info.stream_id.clone(),
                asset_info
                    .title_id
                    .as_deref()
                    .map(|id| zero_padded(id, MAX_TITLE_ID_LENGTH)),
            )
        } else {
            (None, None)
        };

        Self {
            spc,
            ckc: CkcContainer::new(asset_info),
            stream_id,
            title_id,
            required_security_level: SecurityLevel::default(),
        }
    }

    /// Use the title id reported in a check-in, when flagged valid.
    pub fn apply_check_in_title(&mut self) {
        let sync = &self.spc.data.sync;
        if sync.flags & SYNC_FLAG_TITLE_ID_VALID != 0 {
            self.title_id = Some(sync.title_id.to_vec());
        }
    }

    /// Serialize, encrypt and frame the CKC.
    pub fn generate_ckc(&mut self, policy: &dyn Policy) -> Result<()> {
        let ids = OfflineKeyIds {
            stream_id: self.stream_id.as_deref(),
            title_id: self.title_id.as_deref(),
            default_content_id: policy.offline_content_id(self),
        };
        self.ckc
            .serialize_body(&self.spc.data, self.required_security_level, &ids)?;
        self.ckc.encrypt(&self.spc.data.anti_replay)
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use crate::asset::{AssetInfo, LicenseType};
    use crate::rules::DefaultPolicy;
    use crate::spc::SpcContainer;
    use crate::test_support::{credentials, SpcBuilder};

    fn spc(builder: SpcBuilder) -> SpcContainer {
        SpcContainer::parse(&builder.build(), &credentials(), &DefaultPolicy).expect("parse")
    }

    #[test]
    fn offline_ids_only_for_offline_hls() {
        let streaming = AssetInfo {
            stream_id: Some(b"s1".to_vec()),
            title_id: Some(b"t1".to_vec()),
            ..AssetInfo::default()
        };
        let session = Session::new(spc(SpcBuilder::new()), &streaming);
        assert!(session.stream_id.is_none());
        assert!(session.title_id.is_none());

        let offline = AssetInfo {
            license_type: LicenseType::OfflineHls,
            ..streaming
        };
        let session = Session::new(spc(SpcBuilder::new()), &offline);
        assert_eq!(session.stream_id.as_deref(), Some(&b"s1"[..]));
        let title = session.title_id.expect("title");
        assert_eq!(title.len(), 16);
        assert_eq!(&title[..2], b"t1");
    }

    #[test]
    fn check_in_title_requires_flag() {
        let mut session = Session::new(
            spc(SpcBuilder::new().sync_v2(1, 0, &[])),
            &AssetInfo::default(),
        );
        session.apply_check_in_title();
        assert!(session.title_id.is_none());

        let mut session = Session::new(
            spc(SpcBuilder::new().sync_v2(1, 1 << 3, &[])),
            &AssetInfo::default(),
        );
        session.apply_check_in_title();
        assert_eq!(session.title_id, Some(vec![0x77; 16]));
    }
}
