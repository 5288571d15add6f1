//! Create-ckc operations and their results.

use crate::asset::AssetInfo;
use crate::constants::{HU_SZ, OFFLINE_CONTENT_ID_LENGTH};
use crate::device::{DeviceIdentity, VmDeviceInfo};
use crate::error::{Error, Status};

/// A single create-ckc request.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    /// Caller chosen id, echoed in the result.
    pub id: u64,
    /// Raw SPC bytes.
    pub spc: Vec<u8>,
    /// True when the SPC is a sync SPC carrying a check-in.
    pub is_check_in: bool,
    pub asset_info: AssetInfo,
}

impl Operation {
    /// Create an operation.
    pub fn new(id: u64, spc: impl Into<Vec<u8>>, asset_info: AssetInfo) -> Self {
        Self {
            id,
            spc: spc.into(),
            is_check_in: false,
            asset_info,
        }
    }

    /// Mark the operation as a check-in.
    #[must_use]
    pub fn with_check_in(mut self, is_check_in: bool) -> Self {
        self.is_check_in = is_check_in;
        self
    }
}

/// Check-in data reported by a sync SPC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckIn {
    pub server_challenge: u64,
    pub flags: u64,
    /// Present when the title id valid flag is set.
    pub title_id: Option<Vec<u8>>,
    /// Seconds left before the rental expires.
    pub duration_to_expiry: u32,
    /// Ids of the offline keys the client deleted.
    pub deleted_content_ids: Vec<[u8; OFFLINE_CONTENT_ID_LENGTH]>,
}

/// Outcome of one operation.
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub id: u64,
    pub status: Status,
    /// Client HU.
    pub hu: Vec<u8>,
    /// Framed CKC.
    pub ckc: Vec<u8>,
    /// Playback id from the media playback state.
    pub session_id: u64,
    pub check_in: Option<CheckIn>,
    pub device_identity: Option<DeviceIdentity>,
    pub vm_device_info: Option<VmDeviceInfo>,
}

impl OperationResult {
    /// A successful result with no output yet.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            status: Status::NoErr,
            hu: vec![0; HU_SZ],
            ckc: Vec::new(),
            session_id: 0,
            check_in: None,
            device_identity: None,
            vm_device_info: None,
        }
    }

    /// A failed result carrying only the id and status.
    #[must_use]
    pub fn failed(id: u64, status: Status) -> Self {
        Self {
            status,
            ..Self::new(id)
        }
    }

    /// A failed result for `error`.
    #[must_use]
    pub fn from_error(id: u64, error: &Error) -> Self {
        Self::failed(id, error.status())
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::NoErr
    }
}
