//! Domain resource model.
//!
//! Pure data transformation from the `#[repr(C)]` wire structs into owned
//! records: reserved padding is dropped, C-string names are trimmed at the
//! first NUL, and every declared count is checked against its fixed array
//! capacity before any element is read. A count that does not fit is a
//! driver/client version mismatch and converts to
//! [`MalformedResponse`](crate::AscendError::MalformedResponse).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ascend_dcmi::wire::{
    c_str_field, DcmiBaseResource, DcmiComputingResource, DcmiCreateVdevOut, DcmiMediaResource,
    DcmiSocFreeResource, DcmiSocTotalResource, DcmiVdevQueryStru, DsmiChipInfo, DsmiIpAddr,
    DsmiVdevInfo, IpAddrType, NetHealthStatus, MAX_VDEV_NUM, SOC_SPLIT_MAX,
};

use crate::error::{AscendError, Result};

/// Overall device health from `dsmi_get_device_health`.
///
/// The headers only document 0 as healthy; any other value is carried raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceHealth {
    /// Device reports no fault.
    Healthy,
    /// Nonzero health word, meaning vendor-defined.
    Fault(u32),
}

impl DeviceHealth {
    /// Decode the raw health word.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Healthy,
            code => Self::Fault(code),
        }
    }

    /// True when the device reports no fault.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Chip identification from `dsmi_get_chip_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    /// Chip type, e.g. `Ascend`.
    pub chip_type: String,
    /// Chip name, e.g. `910A`.
    pub chip_name: String,
    /// Chip version string.
    pub chip_ver: String,
}

impl From<&DsmiChipInfo> for ChipInfo {
    fn from(raw: &DsmiChipInfo) -> Self {
        Self {
            chip_type: c_str_field(&raw.chip_type).to_owned(),
            chip_name: c_str_field(&raw.chip_name).to_owned(),
            chip_ver: c_str_field(&raw.chip_ver).to_owned(),
        }
    }
}

/// Network port addressed by `dsmi_get_device_ip_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPort {
    /// Virtual NIC port.
    Vnic,
    /// RoCE port.
    Roce,
}

impl NetworkPort {
    /// Wire value of the port type.
    #[must_use]
    pub const fn port_type(self) -> i32 {
        match self {
            Self::Vnic => ascend_dcmi::wire::VNIC_PORT,
            Self::Roce => ascend_dcmi::wire::ROCE_PORT,
        }
    }
}

/// Decoded IP plus mask for one device port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInterface {
    /// Port address.
    pub address: IpAddr,
    /// Netmask, same family as `address`.
    pub mask: IpAddr,
}

/// Decode a tagged `ip_addr_t`, checking the discriminant before touching
/// the payload bytes.
///
/// # Errors
///
/// `MalformedResponse` when the discriminant is not IPv4 or IPv6.
pub fn decode_ip(raw: &DsmiIpAddr) -> Result<IpAddr> {
    match raw.ip_type {
        t if t == IpAddrType::V4 as u32 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&raw.addr[..4]);
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        t if t == IpAddrType::V6 as u32 => Ok(IpAddr::V6(Ipv6Addr::from(raw.addr))),
        other => Err(AscendError::malformed(format!(
            "ip_addr_t with undecodable type {other}"
        ))),
    }
}

/// Decode the `(ip, mask)` pair returned by the driver.
///
/// # Errors
///
/// `MalformedResponse` when either discriminant is invalid or the
/// families disagree.
pub fn decode_ip_interface(ip: &DsmiIpAddr, mask: &DsmiIpAddr) -> Result<IpInterface> {
    let address = decode_ip(ip)?;
    let mask = decode_ip(mask)?;
    if address.is_ipv4() != mask.is_ipv4() {
        return Err(AscendError::malformed(
            "ip and mask address families disagree",
        ));
    }
    Ok(IpInterface { address, mask })
}

/// PCIe bus/device/function assigned to a created vdev.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcieBdf {
    /// PCIe bus number.
    pub bus: u32,
    /// PCIe device number.
    pub device: u32,
    /// PCIe function number.
    pub function: u32,
}

impl std::fmt::Display for PcieBdf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Handle returned by vdev creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VdevHandle {
    /// Vdev ID assigned by the driver.
    pub vdev_id: u32,
    /// Virtual function group the vdev landed in.
    pub vfg_id: u32,
    /// PCIe presentation of the vdev.
    pub bdf: PcieBdf,
}

impl From<&DcmiCreateVdevOut> for VdevHandle {
    fn from(raw: &DcmiCreateVdevOut) -> Self {
        Self {
            vdev_id: raw.vdev_id,
            vfg_id: raw.vfg_id,
            bdf: PcieBdf {
                bus: raw.pcie_bus,
                device: raw.pcie_device,
                function: raw.pcie_func,
            },
        }
    }
}

/// Scheduling token quota (`dcmi_base_resource` minus padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BaseQuota {
    /// Current token grant.
    pub token: u64,
    /// Token ceiling.
    pub token_max: u64,
    /// Task timeout, driver units.
    pub task_timeout: u64,
    /// Virtual function group.
    pub vfg_id: u32,
    /// VIP scheduling mode flag.
    pub vip_mode: u8,
}

impl From<&DcmiBaseResource> for BaseQuota {
    fn from(raw: &DcmiBaseResource) -> Self {
        Self {
            token: raw.token,
            token_max: raw.token_max,
            task_timeout: raw.task_timeout,
            vfg_id: raw.vfg_id,
            vip_mode: raw.vip_mode,
        }
    }
}

/// Compute/memory/ID/CPU quota (`dcmi_computing_resource` minus padding).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComputingQuota {
    /// AI-core count (fractional for split cores).
    pub aic: f32,
    /// AI-vector count.
    pub aiv: f32,
    /// DSA queue count.
    pub dsa: u16,
    /// RTS queue count.
    pub rtsq: u16,
    /// ACSQ count.
    pub acsq: u16,
    /// CDQM count.
    pub cdqm: u16,
    /// Control-core count.
    pub c_core: u16,
    /// FFTS units.
    pub ffts: u16,
    /// SDMA channels.
    pub sdma: u16,
    /// PCIe DMA channels.
    pub pcie_dma: u16,
    /// Memory grant in MB.
    pub memory_mb: u64,
    /// Event ID pool size.
    pub event_id: u32,
    /// Notify ID pool size.
    pub notify_id: u32,
    /// Stream ID pool size.
    pub stream_id: u32,
    /// Model ID pool size.
    pub model_id: u32,
    /// Topic-scheduling AI CPUs.
    pub topic_schedule_aicpu: u16,
    /// Host control CPUs.
    pub host_ctrl_cpu: u16,
    /// Host AI CPUs.
    pub host_aicpu: u16,
    /// Device AI CPUs.
    pub device_aicpu: u16,
    /// Topic control CPU slots.
    pub topic_ctrl_cpu_slot: u16,
}

impl From<&DcmiComputingResource> for ComputingQuota {
    fn from(raw: &DcmiComputingResource) -> Self {
        Self {
            aic: raw.aic,
            aiv: raw.aiv,
            dsa: raw.dsa,
            rtsq: raw.rtsq,
            acsq: raw.acsq,
            cdqm: raw.cdqm,
            c_core: raw.c_core,
            ffts: raw.ffts,
            sdma: raw.sdma,
            pcie_dma: raw.pcie_dma,
            memory_mb: raw.memory_size,
            event_id: raw.event_id,
            notify_id: raw.notify_id,
            stream_id: raw.stream_id,
            model_id: raw.model_id,
            topic_schedule_aicpu: raw.topic_schedule_aicpu,
            host_ctrl_cpu: raw.host_ctrl_cpu,
            host_aicpu: raw.host_aicpu,
            device_aicpu: raw.device_aicpu,
            topic_ctrl_cpu_slot: raw.topic_ctrl_cpu_slot,
        }
    }
}

/// DVPP codec unit quota (`dcmi_media_resource` minus padding).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MediaQuota {
    /// JPEG decode units.
    pub jpegd: f32,
    /// JPEG encode units.
    pub jpege: f32,
    /// Vision pre-processing cores.
    pub vpc: f32,
    /// Video decode units.
    pub vdec: f32,
    /// PNG decode units.
    pub pngd: f32,
    /// Video encode units.
    pub venc: f32,
}

impl From<&DcmiMediaResource> for MediaQuota {
    fn from(raw: &DcmiMediaResource) -> Self {
        Self {
            jpegd: raw.jpegd,
            jpege: raw.jpege,
            vpc: raw.vpc,
            vdec: raw.vdec,
            pngd: raw.pngd,
            venc: raw.venc,
        }
    }
}

/// One vdev's full resource grant (`dcmi_vdev_query_stru`).
#[derive(Debug, Clone, PartialEq)]
pub struct VdevDescriptor {
    /// Vdev ID the query addressed.
    pub vdev_id: u32,
    /// Template name the vdev was created from.
    pub name: String,
    /// Raw vdev status word.
    pub status: u32,
    /// Whether a container currently uses the vdev.
    pub in_container: bool,
    /// Virtual function ID.
    pub vfid: u32,
    /// Virtual function group.
    pub vfg_id: u32,
    /// Owning container ID, if any.
    pub container_id: u64,
    /// Token quota.
    pub base: BaseQuota,
    /// Compute quota.
    pub computing: ComputingQuota,
    /// Media quota.
    pub media: MediaQuota,
}

impl From<&DcmiVdevQueryStru> for VdevDescriptor {
    fn from(raw: &DcmiVdevQueryStru) -> Self {
        let info = &raw.query_info;
        Self {
            vdev_id: raw.vdev_id,
            name: c_str_field(&info.name).to_owned(),
            status: info.status,
            in_container: info.is_container_used != 0,
            vfid: info.vfid,
            vfg_id: info.vfg_id,
            container_id: info.container_id,
            base: BaseQuota::from(&info.base),
            computing: ComputingQuota::from(&info.computing),
            media: MediaQuota::from(&info.media),
        }
    }
}

/// Whole-device resource total plus allocated vdev IDs
/// (`dcmi_soc_total_resource`).
#[derive(Debug, Clone, PartialEq)]
pub struct TotalResource {
    /// IDs of currently allocated vdevs.
    pub vdev_ids: Vec<u32>,
    /// Number of virtual function groups.
    pub vfg_num: u32,
    /// Bitmap of occupied vfgs.
    pub vfg_bitmap: u32,
    /// Token quota.
    pub base: BaseQuota,
    /// Compute quota.
    pub computing: ComputingQuota,
    /// Media quota.
    pub media: MediaQuota,
}

impl TryFrom<&DcmiSocTotalResource> for TotalResource {
    type Error = AscendError;

    fn try_from(raw: &DcmiSocTotalResource) -> Result<Self> {
        let declared = raw.vdev_num as usize;
        if declared > SOC_SPLIT_MAX {
            return Err(AscendError::malformed(format!(
                "total resource declares {declared} vdevs, table capacity is {SOC_SPLIT_MAX}"
            )));
        }
        Ok(Self {
            vdev_ids: raw.vdev_id[..declared].to_vec(),
            vfg_num: raw.vfg_num,
            vfg_bitmap: raw.vfg_bitmap,
            base: BaseQuota::from(&raw.base),
            computing: ComputingQuota::from(&raw.computing),
            media: MediaQuota::from(&raw.media),
        })
    }
}

/// Unallocated device resource (`dcmi_soc_free_resource`).
#[derive(Debug, Clone, PartialEq)]
pub struct FreeResource {
    /// Free virtual function groups.
    pub vfg_num: u32,
    /// Bitmap of free vfgs.
    pub vfg_bitmap: u32,
    /// Token quota.
    pub base: BaseQuota,
    /// Compute quota.
    pub computing: ComputingQuota,
    /// Media quota.
    pub media: MediaQuota,
}

impl From<&DcmiSocFreeResource> for FreeResource {
    fn from(raw: &DcmiSocFreeResource) -> Self {
        Self {
            vfg_num: raw.vfg_num,
            vfg_bitmap: raw.vfg_bitmap,
            base: BaseQuota::from(&raw.base),
            computing: ComputingQuota::from(&raw.computing),
            media: MediaQuota::from(&raw.media),
        }
    }
}

/// Point-in-time total/free report for one device.
///
/// Never cached as truth: the driver is the single source, and this
/// snapshot may be stale the instant it is read.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    /// Whole-device totals plus allocated vdev IDs.
    pub total: TotalResource,
    /// What remains unallocated.
    pub free: FreeResource,
}

/// One slot of the DSMI split table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VdevSlot {
    /// Raw status word.
    pub status: u32,
    /// Vdev ID.
    pub vdev_id: u32,
    /// Virtual function ID.
    pub vfid: u32,
    /// Owning container ID.
    pub container_id: u64,
    /// Aicore grant of this slot.
    pub aicore: u8,
}

/// Physical device split table (`dsmi_vdev_info`).
#[derive(Debug, Clone, PartialEq)]
pub struct VdevTable {
    /// Aicores not allocated to any vdev.
    pub unused_aicore: u8,
    /// Allocated slots, `vdev_num` entries.
    pub slots: Vec<VdevSlot>,
}

impl TryFrom<&DsmiVdevInfo> for VdevTable {
    type Error = AscendError;

    fn try_from(raw: &DsmiVdevInfo) -> Result<Self> {
        let declared = raw.vdev_num as usize;
        if declared > MAX_VDEV_NUM {
            return Err(AscendError::malformed(format!(
                "split table declares {declared} vdevs, capacity is {MAX_VDEV_NUM}"
            )));
        }
        let slots = raw.vdev[..declared]
            .iter()
            .map(|sub| VdevSlot {
                status: sub.status,
                vdev_id: sub.vdevid,
                vfid: sub.vfid,
                container_id: sub.cid,
                aicore: sub.spec.core_num,
            })
            .collect();
        Ok(Self {
            unused_aicore: raw.spec_unused.core_num,
            slots,
        })
    }
}

/// RoCE network health decoded for callers.
pub type NetworkHealth = NetHealthStatus;

/// Parse the aicore count from a `vir<N>` creation template.
///
/// Ascend virtualization templates follow `vir0` + aicore count (`vir04`,
/// `vir08`, ...). Returns `None` for template names that do not follow the
/// convention; the driver still enforces quota for those.
#[must_use]
pub fn template_aicore(template: &str) -> Option<f32> {
    let digits = template.strip_prefix("vir")?;
    let n: u32 = digits.parse().ok()?;
    // "vir04" parses as 4 aicores; leading zero is part of the convention
    #[allow(clippy::cast_precision_loss)]
    Some(n as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascend_dcmi::wire::DsmiSubVdevInfo;

    #[test]
    fn total_resource_rejects_oversized_vdev_count() {
        let raw = DcmiSocTotalResource {
            vdev_num: SOC_SPLIT_MAX as u32 + 1,
            ..Default::default()
        };
        let err = TotalResource::try_from(&raw).unwrap_err();
        assert!(matches!(err, AscendError::MalformedResponse { .. }));
    }

    #[test]
    fn split_table_rejects_count_above_capacity() {
        // 20 declared against a 16-slot table
        let raw = DsmiVdevInfo {
            vdev_num: 20,
            ..Default::default()
        };
        let err = VdevTable::try_from(&raw).unwrap_err();
        assert!(matches!(err, AscendError::MalformedResponse { .. }));
    }

    #[test]
    fn split_table_keeps_declared_slots_only() {
        let mut raw = DsmiVdevInfo {
            vdev_num: 2,
            ..Default::default()
        };
        raw.spec_unused.core_num = 24;
        raw.vdev[0] = DsmiSubVdevInfo {
            status: 1,
            vdevid: 3,
            vfid: 7,
            cid: 42,
            spec: ascend_dcmi::wire::DsmiVdevSpecInfo {
                core_num: 4,
                reserved: [0; 8],
            },
        };
        raw.vdev[1].vdevid = 5;

        let table = VdevTable::try_from(&raw).unwrap();
        assert_eq!(table.unused_aicore, 24);
        assert_eq!(table.slots.len(), 2);
        assert_eq!(table.slots[0].vdev_id, 3);
        assert_eq!(table.slots[0].aicore, 4);
        assert_eq!(table.slots[1].vdev_id, 5);
    }

    #[test]
    fn ip_decoding_honors_discriminant() {
        let mut raw = DsmiIpAddr::default();
        raw.addr[..4].copy_from_slice(&[192, 168, 1, 10]);
        raw.ip_type = IpAddrType::V4 as u32;
        assert_eq!(decode_ip(&raw).unwrap(), "192.168.1.10".parse::<IpAddr>().unwrap());

        raw.ip_type = IpAddrType::V6 as u32;
        // same bytes, different family: the discriminant decides
        assert!(decode_ip(&raw).unwrap().is_ipv6());

        raw.ip_type = 9;
        assert!(matches!(
            decode_ip(&raw),
            Err(AscendError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn ip_interface_rejects_mixed_families() {
        let mut ip = DsmiIpAddr::default();
        ip.ip_type = IpAddrType::V4 as u32;
        let mut mask = DsmiIpAddr::default();
        mask.ip_type = IpAddrType::V6 as u32;
        assert!(matches!(
            decode_ip_interface(&ip, &mask),
            Err(AscendError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn vdev_descriptor_trims_template_name() {
        let mut raw = DcmiVdevQueryStru {
            vdev_id: 2,
            ..Default::default()
        };
        raw.query_info.name[..5].copy_from_slice(b"vir04");
        raw.query_info.is_container_used = 1;
        raw.query_info.computing.aic = 4.0;

        let desc = VdevDescriptor::from(&raw);
        assert_eq!(desc.vdev_id, 2);
        assert_eq!(desc.name, "vir04");
        assert!(desc.in_container);
        assert!((desc.computing.aic - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn template_aicore_parses_plugin_convention() {
        assert_eq!(template_aicore("vir04"), Some(4.0));
        assert_eq!(template_aicore("vir08"), Some(8.0));
        assert_eq!(template_aicore("vir16"), Some(16.0));
        assert_eq!(template_aicore("custom"), None);
        assert_eq!(template_aicore("vir"), None);
    }

    #[test]
    fn device_health_zero_is_healthy() {
        assert!(DeviceHealth::from_raw(0).is_healthy());
        assert_eq!(DeviceHealth::from_raw(3), DeviceHealth::Fault(3));
    }
}
