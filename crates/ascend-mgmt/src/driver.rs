//! Vendor driver abstraction.
//!
//! One trait method per vendor call, so the lifecycle and discovery layers
//! run unchanged against the real `libdcmi.so` binding or the in-memory
//! simulator. Implementations translate raw buffers into the domain model
//! and surface failures verbatim — retry policy belongs to the caller.

use std::fmt::Debug;

use crate::error::Result;
use crate::resource::{
    ChipInfo, DeviceHealth, FreeResource, IpInterface, NetworkHealth, NetworkPort, TotalResource,
    VdevDescriptor, VdevHandle, VdevTable,
};

/// Synchronous interface to the vendor driver.
///
/// Every method is a blocking call with driver/firmware-dependent latency:
/// microseconds for a status read, tens of milliseconds for vdev
/// creation/destruction. None can be cancelled once issued.
pub trait VendorDriver: Debug + Send + Sync {
    /// Initialize the driver session (`dcmi_init`). Must succeed before any
    /// other call; failure is fatal for the session.
    ///
    /// # Errors
    ///
    /// `DriverUnavailable` if the driver cannot be initialized.
    fn probe(&self) -> Result<()>;

    /// Enumerate card IDs (`dcmi_get_card_num_list`).
    ///
    /// # Errors
    ///
    /// `MalformedResponse` for a count outside the table capacity.
    fn card_list(&self) -> Result<Vec<i32>>;

    /// Number of devices on a card (`dcmi_get_device_num_in_card`).
    ///
    /// # Errors
    ///
    /// Raw driver failure, or `MalformedResponse` for a non-positive count.
    fn device_count(&self, card_id: i32) -> Result<i32>;

    /// Logical ID of `(card, device)` (`dcmi_get_device_logic_id`).
    ///
    /// # Errors
    ///
    /// Raw driver failure, or `MalformedResponse` for an out-of-range ID.
    fn logical_id(&self, card_id: i32, device_id: i32) -> Result<u32>;

    /// Logical → physical ID (`dsmi_get_phyid_from_logicid`).
    ///
    /// # Errors
    ///
    /// Raw driver failure.
    fn physical_from_logical(&self, logical_id: u32) -> Result<u32>;

    /// Physical → logical ID (`dsmi_get_logicid_from_phyid`).
    ///
    /// # Errors
    ///
    /// Raw driver failure.
    fn logical_from_physical(&self, physical_id: u32) -> Result<u32>;

    /// Device health word (`dsmi_get_device_health`).
    ///
    /// # Errors
    ///
    /// Raw driver failure.
    fn device_health(&self, logical_id: u32) -> Result<DeviceHealth>;

    /// RoCE network health (`dsmi_get_network_health`).
    ///
    /// # Errors
    ///
    /// Raw driver failure.
    fn network_health(&self, logical_id: u32) -> Result<NetworkHealth>;

    /// Chip identification (`dsmi_get_chip_info`).
    ///
    /// # Errors
    ///
    /// Raw driver failure.
    fn chip_info(&self, logical_id: u32) -> Result<ChipInfo>;

    /// IP and mask of a network port (`dsmi_get_device_ip_address`).
    ///
    /// # Errors
    ///
    /// Raw driver failure, or `MalformedResponse` for an undecodable
    /// address.
    fn ip_address(&self, logical_id: u32, port: NetworkPort) -> Result<IpInterface>;

    /// Physical device split table (`dsmi_get_vdevice_info`).
    ///
    /// # Errors
    ///
    /// Raw driver failure, or `MalformedResponse` when the declared count
    /// exceeds the 16-slot capacity.
    fn vdev_table(&self, logical_id: u32) -> Result<VdevTable>;

    /// Create a vdev from a template (`dcmi_create_vdevice`).
    ///
    /// # Errors
    ///
    /// Raw driver failure (including quota rejection by the driver).
    fn create_vdev(
        &self,
        card_id: i32,
        device_id: i32,
        vdev_id: u32,
        template: &str,
    ) -> Result<VdevHandle>;

    /// Destroy a vdev (`dcmi_set_destroy_vdevice`).
    ///
    /// The header does not document whether teardown is synchronous; treat
    /// a success as "initiated" and re-query before trusting state.
    ///
    /// # Errors
    ///
    /// Raw driver failure.
    fn destroy_vdev(&self, card_id: i32, device_id: i32, vdev_id: u32) -> Result<()>;

    /// One vdev's resource grant (`dcmi_get_device_info`, sub cmd 0).
    ///
    /// # Errors
    ///
    /// Raw driver failure or size-negotiation mismatch.
    fn vdev_resource(&self, card_id: i32, device_id: i32, vdev_id: u32)
        -> Result<VdevDescriptor>;

    /// Whole-device resource (`dcmi_get_device_info`, sub cmd 1).
    ///
    /// # Errors
    ///
    /// Raw driver failure, size-negotiation mismatch, or a vdev count
    /// above the 32-slot table.
    fn total_resource(&self, card_id: i32, device_id: i32) -> Result<TotalResource>;

    /// Free device resource (`dcmi_get_device_info`, sub cmd 2).
    ///
    /// # Errors
    ///
    /// Raw driver failure or size-negotiation mismatch.
    fn free_resource(&self, card_id: i32, device_id: i32) -> Result<FreeResource>;
}
