//! Client device descriptors carried in the SPC.
//!
//! Newer clients send a device identity TLLV; older ones only send the
//! legacy device info TLLV. Clients running inside a virtual machine also
//! describe the host and guest with a VM device info TLLV.

use crate::constants::{
    AppleDeviceType, DeviceClass, PRODUCT_HASH_LENGTH, SPC_TLLV_VERSION, VENDOR_HASH_LENGTH,
};
use crate::error::{Result, Status};
use crate::utils::{read_bytes, read_u32, read_u64};

/// Device identity TLLV size.
pub const DEVICE_IDENTITY_SZ: usize = 36;

/// Device info TLLV size.
pub const DEVICE_INFO_SZ: usize = 16;

/// Identity of the client device (FPDI).
///
/// REE and TEE versions are only meaningful for partner devices, the OS
/// version only for Apple devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// FPDI structure version.
    pub fpdi_version: u32,
    /// Device class.
    pub device_class: DeviceClass,
    /// Vendor hash.
    pub vendor_hash: [u8; VENDOR_HASH_LENGTH],
    /// Product hash.
    pub product_hash: [u8; PRODUCT_HASH_LENGTH],
    /// FairPlay REE (userland) version.
    pub ree_version: u32,
    /// FairPlay TEE (kernel) version.
    pub tee_version: u32,
    /// OS version.
    pub os_version: u32,
}

impl DeviceIdentity {
    /// Parse a device identity TLLV value.
    pub fn parse(value: &[u8]) -> Result<Self> {
        fps_ensure!(
            value.len() == DEVICE_IDENTITY_SZ,
            Status::ParamErr,
            "device identity length {} != {}",
            value.len(),
            DEVICE_IDENTITY_SZ
        );

        let mut vendor_hash = [0u8; VENDOR_HASH_LENGTH];
        vendor_hash.copy_from_slice(read_bytes(value, 8, VENDOR_HASH_LENGTH)?);
        let mut product_hash = [0u8; PRODUCT_HASH_LENGTH];
        product_hash.copy_from_slice(read_bytes(value, 16, PRODUCT_HASH_LENGTH)?);

        Ok(Self {
            fpdi_version: read_u32(value, 0)?,
            device_class: DeviceClass::from_value(read_u32(value, 4)?),
            vendor_hash,
            product_hash,
            ree_version: read_u32(value, 24)?,
            tee_version: read_u32(value, 28)?,
            os_version: read_u32(value, 32)?,
        })
    }
}

/// Legacy device information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Apple device type.
    pub device_type: AppleDeviceType,
    /// OS version.
    pub os_version: u32,
}

impl DeviceInfo {
    /// Parse a device info TLLV value.
    pub fn parse(value: &[u8]) -> Result<Self> {
        fps_ensure!(
            value.len() == DEVICE_INFO_SZ,
            Status::ParamErr,
            "device info length {} != {}",
            value.len(),
            DEVICE_INFO_SZ
        );

        Ok(Self {
            device_type: AppleDeviceType::from_value(read_u64(value, 0)?),
            os_version: read_u32(value, 8)?,
        })
    }
}

/// Host and guest description of a client running in a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmDeviceInfo {
    pub host_device_class: DeviceClass,
    pub host_os_version: u32,
    pub host_vm_protocol_version: u32,
    pub guest_device_class: DeviceClass,
    pub guest_os_version: u32,
    pub guest_vm_protocol_version: u32,
}

impl VmDeviceInfo {
    /// Parse a VM device info TLLV value.
    ///
    /// Returns `None` for TLLV versions this server does not understand.
    pub fn parse(value: &[u8]) -> Result<Option<Self>> {
        let version = read_u32(value, 0)?;
        if version != SPC_TLLV_VERSION {
            debug!("Ignoring VM device info version {}", version);
            return Ok(None);
        }

        // version | reserved | six u32 fields
        Ok(Some(Self {
            host_device_class: DeviceClass::from_value(read_u32(value, 8)?),
            host_os_version: read_u32(value, 12)?,
            host_vm_protocol_version: read_u32(value, 16)?,
            guest_device_class: DeviceClass::from_value(read_u32(value, 20)?),
            guest_os_version: read_u32(value, 24)?,
            guest_vm_protocol_version: read_u32(value, 28)?,
        }))
    }
}
