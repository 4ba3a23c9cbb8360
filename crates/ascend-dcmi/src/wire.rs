//! DCMI/DSMI wire structs and command codes.
//!
//! Every struct here mirrors `dcmi_interface_api.h` / `dsmi_common_interface.h`
//! field for field, including the reserved padding bytes the vendor keeps for
//! forward compatibility. The driver fills these buffers directly, so field
//! order, sizes and alignment must match the C layout bit for bit — the
//! `const` size assertions at the bottom of this module pin them.
//!
//! Numeric command and status codes are a stable contract with the closed
//! driver and are never renumbered.

// Struct fields mirror the C header names; they carry no prose of their own.
#![allow(missing_docs)]

/// Length of a vdev resource template name (`DCMI_VDEV_RES_NAME_LEN`).
pub const VDEV_RES_NAME_LEN: usize = 16;

/// Reserved trailing bytes in resource structs (`DCMI_VDEV_FOR_RESERVE`).
pub const VDEV_RESERVE_LEN: usize = 32;

/// Maximum vdev slots in the total-resource table (`DCMI_SOC_SPLIT_MAX`).
///
/// A device can carry at most 16 active vdevs; the table reserves 32 slots.
pub const SOC_SPLIT_MAX: usize = 32;

/// Maximum active vdevs per physical device (`DSMI_MAX_VDEV_NUM`).
pub const MAX_VDEV_NUM: usize = 16;

/// Reserved bytes in a vdev spec record (`DSMI_MAX_SPEC_RESERVE`).
pub const SPEC_RESERVE_LEN: usize = 8;

/// Maximum chip identification string length (`MAX_CHIP_NAME`).
pub const MAX_CHIP_NAME: usize = 32;

/// Maximum card slots a host reports.
pub const MAX_CARD_NUM: usize = 16;

/// Largest valid logical device ID; the driver assigns logical IDs within
/// `int8` range.
pub const MAX_LOGICAL_ID: u32 = 127;

/// VNIC network port (`DSMI_VNIC_PORT`).
pub const VNIC_PORT: i32 = 0;

/// RoCE network port (`DSMI_ROCE_PORT`).
pub const ROCE_PORT: i32 = 1;

/// Main command selector for `dcmi_get_device_info` (`enum dcmi_main_cmd`).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MainCmd {
    /// DVPP media subsystem.
    Dvpp = 0,
    /// Image signal processor.
    Isp = 1,
    /// Task-scheduler group count.
    TsGroupNum = 2,
    /// CAN bus.
    Can = 3,
    /// UART.
    Uart = 4,
    /// Firmware upgrade.
    Upgrade = 5,
    /// Temperature query.
    Temp = 50,
    /// Shared virtual memory.
    Svm = 51,
    /// Virtual device management (`DCMI_MAIN_CMD_VDEV_MNG`).
    VdevMng = 52,
    /// Device sharing.
    DeviceShare = 0x8001,
    /// External certificate management.
    ExCert = 0x8003,
}

/// Sub-command under [`MainCmd::VdevMng`] (`DCMI_VDEV_MNG_SUB_CMD`).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VdevMngSubCmd {
    /// Query one vdev's resource grant.
    GetVdevResource = 0,
    /// Query the device's total resource.
    GetTotalResource = 1,
    /// Query the device's free (unallocated) resource.
    GetFreeResource = 2,
}

/// IP address family discriminant (`enum ip_addr_type`).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpAddrType {
    /// IPv4: only the first 4 payload bytes are meaningful.
    V4 = 0,
    /// IPv6: all 16 payload bytes are meaningful.
    V6 = 1,
    /// Either family.
    Any = 2,
}

/// RoCE network health codes (`DSMI_NET_HEALTH_STATUS`).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetHealthStatus {
    /// Network reachable.
    DetectOk = 0,
    /// Socket setup failed.
    SockFail = 1,
    /// Receive timed out.
    RecvTimeout = 2,
    /// Destination unreachable.
    Unreach = 3,
    /// TTL exceeded.
    TimeExceeded = 4,
    /// Detection fault.
    Fault = 5,
    /// Detection not yet run.
    Init = 6,
}

impl NetHealthStatus {
    /// Decode a raw status word; unknown values map to [`Self::Fault`].
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::DetectOk,
            1 => Self::SockFail,
            2 => Self::RecvTimeout,
            3 => Self::Unreach,
            4 => Self::TimeExceeded,
            6 => Self::Init,
            _ => Self::Fault,
        }
    }
}

/// `struct dcmi_create_vdev_out` — handle returned by `dcmi_create_vdevice`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DcmiCreateVdevOut {
    pub vdev_id: u32,
    pub pcie_bus: u32,
    pub pcie_device: u32,
    pub pcie_func: u32,
    pub vfg_id: u32,
    pub reserved: [u8; VDEV_RESERVE_LEN],
}

/// `struct dcmi_base_resource` — scheduling token quota.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DcmiBaseResource {
    pub token: u64,
    pub token_max: u64,
    pub task_timeout: u64,
    pub vfg_id: u32,
    pub vip_mode: u8,
    /// One byte shorter than the usual reserve: `vip_mode` takes the first.
    pub reserved: [u8; VDEV_RESERVE_LEN - 1],
}

/// `struct dcmi_computing_resource` — compute/memory/ID/CPU quota.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DcmiComputingResource {
    // accelerator resource
    pub aic: f32,
    pub aiv: f32,
    pub dsa: u16,
    pub rtsq: u16,
    pub acsq: u16,
    pub cdqm: u16,
    pub c_core: u16,
    pub ffts: u16,
    pub sdma: u16,
    pub pcie_dma: u16,

    /// Memory grant in MB.
    pub memory_size: u64,

    // id resource
    pub event_id: u32,
    pub notify_id: u32,
    pub stream_id: u32,
    pub model_id: u32,

    // cpu resource
    pub topic_schedule_aicpu: u16,
    pub host_ctrl_cpu: u16,
    pub host_aicpu: u16,
    pub device_aicpu: u16,
    pub topic_ctrl_cpu_slot: u16,

    pub reserved: [u8; VDEV_RESERVE_LEN],
}

/// `struct dcmi_media_resource` — DVPP codec unit quota.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DcmiMediaResource {
    pub jpegd: f32,
    pub jpege: f32,
    pub vpc: f32,
    pub vdec: f32,
    pub pngd: f32,
    pub venc: f32,
    pub reserved: [u8; VDEV_RESERVE_LEN],
}

/// `struct dcmi_vdev_query_info` — one vdev's full resource grant.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DcmiVdevQueryInfo {
    pub name: [u8; VDEV_RES_NAME_LEN],
    pub status: u32,
    pub is_container_used: u32,
    pub vfid: u32,
    pub vfg_id: u32,
    pub container_id: u64,
    pub base: DcmiBaseResource,
    pub computing: DcmiComputingResource,
    pub media: DcmiMediaResource,
}

/// `struct dcmi_vdev_query_stru` — single-vdev query in/out buffer.
///
/// The caller sets `vdev_id` before the `dcmi_get_device_info` call; the
/// driver fills `query_info`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DcmiVdevQueryStru {
    pub vdev_id: u32,
    pub query_info: DcmiVdevQueryInfo,
}

/// `struct dcmi_soc_free_resource` — unallocated resource on a device.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DcmiSocFreeResource {
    pub vfg_num: u32,
    pub vfg_bitmap: u32,
    pub base: DcmiBaseResource,
    pub computing: DcmiComputingResource,
    pub media: DcmiMediaResource,
}

/// `struct dcmi_soc_total_resource` — whole-device resource plus the table
/// of currently allocated vdev IDs.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DcmiSocTotalResource {
    /// Number of valid entries in `vdev_id`. Anything above
    /// [`SOC_SPLIT_MAX`] is a driver/client version mismatch.
    pub vdev_num: u32,
    pub vdev_id: [u32; SOC_SPLIT_MAX],
    pub vfg_num: u32,
    pub vfg_bitmap: u32,
    pub base: DcmiBaseResource,
    pub computing: DcmiComputingResource,
    pub media: DcmiMediaResource,
}

/// `struct dsmi_chip_info_stru` — chip identification strings.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DsmiChipInfo {
    pub chip_type: [u8; MAX_CHIP_NAME],
    pub chip_name: [u8; MAX_CHIP_NAME],
    pub chip_ver: [u8; MAX_CHIP_NAME],
}

/// `ip_addr_t` — tagged IPv4/IPv6 address.
///
/// The C struct holds a union of 4 and 16 bytes; the 16-byte payload covers
/// both members exactly. Check `ip_type` before interpreting `addr`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DsmiIpAddr {
    /// IPv4 uses `addr[..4]`; IPv6 uses all 16 bytes.
    pub addr: [u8; 16],
    /// Raw [`IpAddrType`] discriminant.
    pub ip_type: u32,
}

/// `struct dsmi_vdev_spec_info` — aicore grant of one vdev slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DsmiVdevSpecInfo {
    pub core_num: u8,
    pub reserved: [u8; SPEC_RESERVE_LEN],
}

/// `struct dsmi_sub_vdev_info` — one slot of the device split table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DsmiSubVdevInfo {
    pub status: u32,
    pub vdevid: u32,
    pub vfid: u32,
    /// Container ID (`unsigned long int` in the header; 64-bit on LP64).
    pub cid: u64,
    pub spec: DsmiVdevSpecInfo,
}

/// `struct dsmi_vdev_info` — physical device split table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DsmiVdevInfo {
    /// Valid entries in `vdev`. Anything above [`MAX_VDEV_NUM`] is a
    /// driver/client version mismatch.
    pub vdev_num: u32,
    pub spec_unused: DsmiVdevSpecInfo,
    pub vdev: [DsmiSubVdevInfo; MAX_VDEV_NUM],
}

/// Trim a fixed C string buffer at its first NUL.
#[must_use]
pub fn c_str_field(buf: &[u8]) -> &str {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).unwrap_or("")
}

// Layout pins. The driver writes these buffers byte for byte; a size drift
// here corrupts every query.
const _: () = {
    use std::mem::size_of;
    assert!(size_of::<DcmiCreateVdevOut>() == 52);
    assert!(size_of::<DcmiBaseResource>() == 64);
    assert!(size_of::<DcmiComputingResource>() == 96);
    assert!(size_of::<DcmiMediaResource>() == 56);
    assert!(size_of::<DcmiVdevQueryInfo>() == 256);
    assert!(size_of::<DcmiVdevQueryStru>() == 264);
    assert!(size_of::<DcmiSocFreeResource>() == 224);
    assert!(size_of::<DcmiSocTotalResource>() == 360);
    assert!(size_of::<DsmiChipInfo>() == 96);
    assert!(size_of::<DsmiIpAddr>() == 20);
    assert!(size_of::<DsmiVdevSpecInfo>() == 9);
    assert!(size_of::<DsmiSubVdevInfo>() == 40);
    assert!(size_of::<DsmiVdevInfo>() == 656);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vdev_mng_wire_codes_are_pinned() {
        assert_eq!(MainCmd::VdevMng as u32, 52);
        assert_eq!(MainCmd::DeviceShare as u32, 0x8001);
        assert_eq!(MainCmd::ExCert as u32, 0x8003);
        assert_eq!(VdevMngSubCmd::GetVdevResource as u32, 0);
        assert_eq!(VdevMngSubCmd::GetTotalResource as u32, 1);
        assert_eq!(VdevMngSubCmd::GetFreeResource as u32, 2);
    }

    #[test]
    fn net_health_codes_are_pinned() {
        assert_eq!(NetHealthStatus::DetectOk as u32, 0);
        assert_eq!(NetHealthStatus::Init as u32, 6);
        assert_eq!(NetHealthStatus::from_raw(3), NetHealthStatus::Unreach);
        // unknown codes collapse to Fault rather than panicking
        assert_eq!(NetHealthStatus::from_raw(99), NetHealthStatus::Fault);
    }

    #[test]
    fn ip_addr_type_codes_are_pinned() {
        assert_eq!(IpAddrType::V4 as u32, 0);
        assert_eq!(IpAddrType::V6 as u32, 1);
        assert_eq!(IpAddrType::Any as u32, 2);
    }

    #[test]
    fn c_str_field_trims_at_nul() {
        let mut name = [0u8; VDEV_RES_NAME_LEN];
        name[..4].copy_from_slice(b"vir4");
        assert_eq!(c_str_field(&name), "vir4");
        assert_eq!(c_str_field(&[0u8; 4]), "");
    }
}
