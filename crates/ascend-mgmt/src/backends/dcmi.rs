//! Binding to the vendor `libdcmi.so`.
//!
//! Pure pass-through: each method issues exactly one vendor call, translates
//! the raw buffer into a domain record, and surfaces any nonzero code
//! verbatim as [`AscendError::Call`]. No retries here — that policy belongs
//! to the lifecycle manager.

// IDs cross between the vendor's i32 surface and the validated u32 domain;
// every cast sits behind a range check.
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use std::ffi::CString;
use std::mem::size_of;

use tracing::debug;

use ascend_dcmi::wire::{
    DcmiSocFreeResource, DcmiSocTotalResource, DcmiVdevQueryStru, MainCmd, NetHealthStatus,
    VdevMngSubCmd, MAX_CARD_NUM, MAX_LOGICAL_ID,
};
use ascend_dcmi::DcmiLibrary;

use crate::driver::VendorDriver;
use crate::error::{AscendError, Result};
use crate::resource::{
    decode_ip_interface, ChipInfo, DeviceHealth, FreeResource, IpInterface, NetworkHealth,
    NetworkPort, TotalResource, VdevDescriptor, VdevHandle, VdevTable,
};

/// [`VendorDriver`] over the dynamically loaded DCMI/DSMI entry points.
#[derive(Debug)]
pub struct DcmiBackend {
    lib: DcmiLibrary,
}

impl DcmiBackend {
    /// Wrap a loaded driver library.
    #[must_use]
    pub const fn new(lib: DcmiLibrary) -> Self {
        Self { lib }
    }

    /// `dcmi_get_device_info` with size negotiation: the driver is handed
    /// the buffer capacity and must report back exactly that many bytes
    /// written, otherwise the struct layouts disagree between client and
    /// driver and the payload cannot be trusted.
    fn device_info<T: Copy + Default>(
        &self,
        card_id: i32,
        device_id: i32,
        sub_cmd: VdevMngSubCmd,
        buf: &mut T,
    ) -> Result<()> {
        let written = self
            .lib
            .device_info_buf(card_id, device_id, MainCmd::VdevMng, sub_cmd as u32, buf)
            .map_err(|code| AscendError::call("dcmi_get_device_info", code))?;

        let expected = size_of::<T>() as u32;
        if written != expected {
            return Err(AscendError::malformed(format!(
                "dcmi_get_device_info sub cmd {} returned {written} bytes, expected {expected}",
                sub_cmd as u32
            )));
        }
        Ok(())
    }
}

impl VendorDriver for DcmiBackend {
    fn probe(&self) -> Result<()> {
        self.lib.init().map_err(|code| {
            AscendError::driver_unavailable(format!("dcmi_init failed with driver code {code}"))
        })
    }

    fn card_list(&self) -> Result<Vec<i32>> {
        let (count, ids) = self
            .lib
            .card_num_list()
            .map_err(|code| AscendError::call("dcmi_get_card_num_list", code))?;

        if count <= 0 || count as usize > MAX_CARD_NUM {
            return Err(AscendError::malformed(format!(
                "card count {count} outside 1..={MAX_CARD_NUM}"
            )));
        }

        let mut cards = Vec::with_capacity(count as usize);
        for &id in &ids[..count as usize] {
            if id < 0 {
                // a negative entry is driver garbage; skip it and keep going
                tracing::warn!(card_id = id, "driver reported invalid card ID, skipping");
                continue;
            }
            cards.push(id);
        }
        Ok(cards)
    }

    fn device_count(&self, card_id: i32) -> Result<i32> {
        let count = self
            .lib
            .device_num_in_card(card_id)
            .map_err(|code| AscendError::call("dcmi_get_device_num_in_card", code))?;
        if count <= 0 {
            return Err(AscendError::malformed(format!(
                "card {card_id} reports device count {count}"
            )));
        }
        Ok(count)
    }

    fn logical_id(&self, card_id: i32, device_id: i32) -> Result<u32> {
        let logical = self
            .lib
            .device_logic_id(card_id, device_id)
            .map_err(|code| AscendError::call("dcmi_get_device_logic_id", code))?;
        if logical < 0 || logical as u32 > MAX_LOGICAL_ID {
            return Err(AscendError::malformed(format!(
                "logical ID {logical} outside 0..={MAX_LOGICAL_ID}"
            )));
        }
        Ok(logical as u32)
    }

    fn physical_from_logical(&self, logical_id: u32) -> Result<u32> {
        self.lib
            .phyid_from_logicid(logical_id)
            .map_err(|code| AscendError::call("dsmi_get_phyid_from_logicid", code))
    }

    fn logical_from_physical(&self, physical_id: u32) -> Result<u32> {
        self.lib
            .logicid_from_phyid(physical_id)
            .map_err(|code| AscendError::call("dsmi_get_logicid_from_phyid", code))
    }

    fn device_health(&self, logical_id: u32) -> Result<DeviceHealth> {
        let raw = self
            .lib
            .device_health(logical_id as i32)
            .map_err(|code| AscendError::call("dsmi_get_device_health", code))?;
        Ok(DeviceHealth::from_raw(raw))
    }

    fn network_health(&self, logical_id: u32) -> Result<NetworkHealth> {
        let raw = self
            .lib
            .network_health(logical_id as i32)
            .map_err(|code| AscendError::call("dsmi_get_network_health", code))?;
        Ok(NetHealthStatus::from_raw(raw))
    }

    fn chip_info(&self, logical_id: u32) -> Result<ChipInfo> {
        let raw = self
            .lib
            .chip_info(logical_id as i32)
            .map_err(|code| AscendError::call("dsmi_get_chip_info", code))?;
        Ok(ChipInfo::from(&raw))
    }

    fn ip_address(&self, logical_id: u32, port: NetworkPort) -> Result<IpInterface> {
        let (ip, mask) = self
            .lib
            .device_ip_address(logical_id as i32, port.port_type(), 0)
            .map_err(|code| AscendError::call("dsmi_get_device_ip_address", code))?;
        decode_ip_interface(&ip, &mask)
    }

    fn vdev_table(&self, logical_id: u32) -> Result<VdevTable> {
        let raw = self
            .lib
            .vdevice_info(logical_id)
            .map_err(|code| AscendError::call("dsmi_get_vdevice_info", code))?;
        VdevTable::try_from(&raw)
    }

    fn create_vdev(
        &self,
        card_id: i32,
        device_id: i32,
        vdev_id: u32,
        template: &str,
    ) -> Result<VdevHandle> {
        let template_c = CString::new(template).map_err(|_| {
            AscendError::malformed(format!("template name {template:?} contains NUL"))
        })?;

        debug!(card_id, device_id, vdev_id, template, "creating vdev");
        let out = self
            .lib
            .create_vdevice(card_id, device_id, vdev_id as i32, &template_c)
            .map_err(|code| AscendError::call("dcmi_create_vdevice", code))?;
        Ok(VdevHandle::from(&out))
    }

    fn destroy_vdev(&self, card_id: i32, device_id: i32, vdev_id: u32) -> Result<()> {
        debug!(card_id, device_id, vdev_id, "destroying vdev");
        self.lib
            .destroy_vdevice(card_id, device_id, vdev_id)
            .map_err(|code| AscendError::call("dcmi_set_destroy_vdevice", code))
    }

    fn vdev_resource(
        &self,
        card_id: i32,
        device_id: i32,
        vdev_id: u32,
    ) -> Result<VdevDescriptor> {
        let mut buf = DcmiVdevQueryStru {
            vdev_id,
            ..Default::default()
        };
        self.device_info(card_id, device_id, VdevMngSubCmd::GetVdevResource, &mut buf)?;
        Ok(VdevDescriptor::from(&buf))
    }

    fn total_resource(&self, card_id: i32, device_id: i32) -> Result<TotalResource> {
        let mut buf = DcmiSocTotalResource::default();
        self.device_info(card_id, device_id, VdevMngSubCmd::GetTotalResource, &mut buf)?;
        TotalResource::try_from(&buf)
    }

    fn free_resource(&self, card_id: i32, device_id: i32) -> Result<FreeResource> {
        let mut buf = DcmiSocFreeResource::default();
        self.device_info(card_id, device_id, VdevMngSubCmd::GetFreeResource, &mut buf)?;
        Ok(FreeResource::from(&buf))
    }
}
