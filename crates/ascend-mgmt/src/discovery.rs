//! Card and device enumeration.
//!
//! Walks the driver's card list, expands each card into its devices, and
//! resolves the logical/physical ID pair for every device up front so later
//! calls can translate between the three addressing schemes without extra
//! driver round-trips.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::driver::VendorDriver;
use crate::error::Result;

/// One enumerated NPU device with all three of its addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEntry {
    /// Card the device sits on.
    pub card_id: i32,
    /// Device index within the card.
    pub device_id: i32,
    /// Driver-assigned logical ID, dense across the host.
    pub logical_id: u32,
    /// Stable physical ID of the silicon.
    pub physical_id: u32,
}

/// Snapshot of every device visible through the driver at enumeration
/// time. Hotplug is not tracked; re-enumerate to refresh.
#[derive(Debug, Clone, Default)]
pub struct CardInventory {
    devices: Vec<DeviceEntry>,
}

impl CardInventory {
    /// Enumerate all cards and devices.
    ///
    /// A card whose device walk fails is skipped with a warning rather
    /// than failing the whole inventory; a host with one sick card still
    /// exposes the rest.
    ///
    /// # Errors
    ///
    /// Fails only when the card list itself cannot be read.
    pub fn enumerate(driver: &Arc<dyn VendorDriver>) -> Result<Self> {
        let cards = driver.card_list()?;
        let mut devices = Vec::new();

        for card_id in cards {
            let count = match driver.device_count(card_id) {
                Ok(count) => count,
                Err(err) => {
                    warn!(card_id, %err, "skipping card, device count unreadable");
                    continue;
                }
            };
            for device_id in 0..count {
                match Self::resolve(driver, card_id, device_id) {
                    Ok(entry) => {
                        debug!(
                            card_id,
                            device_id,
                            logical_id = entry.logical_id,
                            physical_id = entry.physical_id,
                            "enumerated device"
                        );
                        devices.push(entry);
                    }
                    Err(err) => {
                        warn!(card_id, device_id, %err, "skipping device, IDs unresolvable");
                    }
                }
            }
        }

        Ok(Self { devices })
    }

    fn resolve(
        driver: &Arc<dyn VendorDriver>,
        card_id: i32,
        device_id: i32,
    ) -> Result<DeviceEntry> {
        let logical_id = driver.logical_id(card_id, device_id)?;
        let physical_id = driver.physical_from_logical(logical_id)?;
        Ok(DeviceEntry {
            card_id,
            device_id,
            logical_id,
            physical_id,
        })
    }

    /// All enumerated devices, in card/device order.
    #[must_use]
    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices
    }

    /// Number of enumerated devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when no device was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Look a device up by its logical ID.
    #[must_use]
    pub fn by_logical(&self, logical_id: u32) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.logical_id == logical_id)
    }

    /// Look a device up by its physical ID.
    #[must_use]
    pub fn by_physical(&self, physical_id: u32) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.physical_id == physical_id)
    }

    /// Look a device up by its card/device pair.
    #[must_use]
    pub fn by_position(&self, card_id: i32, device_id: i32) -> Option<&DeviceEntry> {
        self.devices
            .iter()
            .find(|d| d.card_id == card_id && d.device_id == device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sim::{SimBackend, SimConfig, SimDeviceConfig};

    fn two_card_driver() -> Arc<dyn VendorDriver> {
        let config = SimConfig {
            devices: vec![
                SimDeviceConfig::new(0, 0, 0, 1000),
                SimDeviceConfig::new(0, 1, 1, 1001),
                SimDeviceConfig::new(2, 0, 2, 2000),
            ],
            ..Default::default()
        };
        Arc::new(SimBackend::new(config))
    }

    #[test]
    fn enumerates_all_devices_across_cards() {
        let driver = two_card_driver();
        let inventory = CardInventory::enumerate(&driver).unwrap();
        assert_eq!(inventory.len(), 3);
        assert!(inventory.by_position(0, 1).is_some());
        assert!(inventory.by_position(2, 0).is_some());
        assert!(inventory.by_position(1, 0).is_none());
    }

    #[test]
    fn id_lookups_agree() {
        let driver = two_card_driver();
        let inventory = CardInventory::enumerate(&driver).unwrap();

        let entry = inventory.by_logical(2).unwrap();
        assert_eq!((entry.card_id, entry.device_id), (2, 0));
        assert_eq!(entry.physical_id, 2000);
        assert_eq!(
            inventory.by_physical(2000).unwrap().logical_id,
            entry.logical_id
        );
    }

    #[test]
    fn empty_inventory_is_empty() {
        let inventory = CardInventory::default();
        assert!(inventory.is_empty());
        assert_eq!(inventory.devices(), &[]);
    }
}
