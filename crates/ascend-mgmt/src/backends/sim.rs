//! Simulated driver backend.
//!
//! Mirrors the vendor driver's observable behavior in memory: quota
//! accounting, vdev registration, logical/physical ID mapping, health and
//! chip reports. Everything above the [`VendorDriver`] seam — discovery,
//! resource model, lifecycle manager, CLI — runs against it unchanged, so
//! the whole client is testable in CI without an Ascend card.
//!
//! Fault and latency injection knobs reproduce the awkward cases: slow
//! creates for deadline handling, failing calls for retry policy, and call
//! counters so tests can assert which operations never reached the driver.

// Simulated quotas move between f32 aicore counts and the u8/u64 wire
// fields; truncation is part of the modeled hardware.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use ascend_dcmi::wire::{NetHealthStatus, MAX_VDEV_NUM};

use crate::driver::VendorDriver;
use crate::error::{AscendError, Result};
use crate::resource::{
    BaseQuota, ChipInfo, ComputingQuota, DeviceHealth, FreeResource, IpInterface, MediaQuota,
    NetworkHealth, NetworkPort, PcieBdf, TotalResource, VdevDescriptor, VdevHandle, VdevSlot,
    VdevTable,
};

/// One simulated physical device.
#[derive(Debug, Clone)]
pub struct SimDeviceConfig {
    /// Card the device sits on.
    pub card_id: i32,
    /// Device index within the card.
    pub device_id: i32,
    /// Stable logical ID.
    pub logical_id: u32,
    /// Stable physical ID (distinct from logical to exercise the mapping).
    pub physical_id: u32,
    /// Total aicore count.
    pub total_aicore: f32,
    /// Chip name reported by chip-info queries.
    pub chip_name: String,
    /// Raw device health word (0 = healthy).
    pub health: u32,
    /// Raw network health code.
    pub net_health: u32,
}

impl SimDeviceConfig {
    /// A healthy 32-core device at `(card, device)` with a distinct
    /// physical ID.
    #[must_use]
    pub fn new(card_id: i32, device_id: i32, logical_id: u32, physical_id: u32) -> Self {
        Self {
            card_id,
            device_id,
            logical_id,
            physical_id,
            total_aicore: 32.0,
            chip_name: "910A".to_owned(),
            health: 0,
            net_health: 0,
        }
    }
}

/// Simulator behavior knobs.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Devices present at enumeration.
    pub devices: Vec<SimDeviceConfig>,
    /// Wall-clock latency of a create call (driver-side work keeps running
    /// even if the caller stops waiting).
    pub create_latency: Duration,
    /// Artificial latency added to resource queries; lets tests observe
    /// read overlap.
    pub query_hold: Duration,
    /// Raw code every create fails with, after its latency.
    pub fail_create: Option<i32>,
    /// Raw code every destroy fails with.
    pub fail_destroy: Option<i32>,
    /// Fail the next N resource queries with this raw code.
    pub fail_queries: Option<(u32, i32)>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            devices: vec![SimDeviceConfig::new(0, 0, 0, 1000)],
            create_latency: Duration::ZERO,
            query_hold: Duration::ZERO,
            fail_create: None,
            fail_destroy: None,
            fail_queries: None,
        }
    }
}

/// How many times each vendor entry point was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCallCounts {
    /// `dcmi_create_vdevice` calls.
    pub create: usize,
    /// `dcmi_set_destroy_vdevice` calls.
    pub destroy: usize,
    /// Single-vdev resource queries.
    pub vdev_resource: usize,
    /// Total-resource queries.
    pub total_resource: usize,
    /// Free-resource queries.
    pub free_resource: usize,
    /// Peak number of resource queries in flight at once.
    pub peak_concurrent_reads: usize,
}

#[derive(Debug)]
struct SimVdev {
    aicore: f32,
    vfg_id: u32,
    template: String,
}

#[derive(Debug)]
struct SimDevice {
    config: SimDeviceConfig,
    free_aicore: f32,
    vdevs: BTreeMap<u32, SimVdev>,
}

#[derive(Debug, Default)]
struct Counters {
    create: AtomicUsize,
    destroy: AtomicUsize,
    vdev_resource: AtomicUsize,
    total_resource: AtomicUsize,
    free_resource: AtomicUsize,
    reads_in_flight: AtomicUsize,
    peak_reads: AtomicUsize,
}

/// In-memory [`VendorDriver`].
#[derive(Debug)]
pub struct SimBackend {
    config: SimConfig,
    devices: Mutex<Vec<SimDevice>>,
    counters: Counters,
    query_failures_left: AtomicU32,
}

impl SimBackend {
    /// Build a simulator from explicit configuration.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let devices = config
            .devices
            .iter()
            .map(|cfg| SimDevice {
                free_aicore: cfg.total_aicore,
                config: cfg.clone(),
                vdevs: BTreeMap::new(),
            })
            .collect();
        let query_failures_left =
            AtomicU32::new(config.fail_queries.map_or(0, |(n, _)| n));
        Self {
            config,
            devices: Mutex::new(devices),
            counters: Counters::default(),
            query_failures_left,
        }
    }

    /// Single healthy device, no injected latency or faults.
    #[must_use]
    pub fn single_device() -> Self {
        Self::new(SimConfig::default())
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn counts(&self) -> SimCallCounts {
        SimCallCounts {
            create: self.counters.create.load(Ordering::SeqCst),
            destroy: self.counters.destroy.load(Ordering::SeqCst),
            vdev_resource: self.counters.vdev_resource.load(Ordering::SeqCst),
            total_resource: self.counters.total_resource.load(Ordering::SeqCst),
            free_resource: self.counters.free_resource.load(Ordering::SeqCst),
            peak_concurrent_reads: self.counters.peak_reads.load(Ordering::SeqCst),
        }
    }

    fn begin_read(&self) {
        let now = self.counters.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_reads.fetch_max(now, Ordering::SeqCst);
        if !self.config.query_hold.is_zero() {
            std::thread::sleep(self.config.query_hold);
        }
    }

    fn end_read(&self) {
        self.counters.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn query_fault(&self) -> Result<()> {
        if let Some((_, code)) = self.config.fail_queries {
            if self.query_failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
            {
                return Err(AscendError::call("dcmi_get_device_info", code));
            }
        }
        Ok(())
    }

    fn with_device<T>(
        &self,
        card_id: i32,
        device_id: i32,
        f: impl FnOnce(&mut SimDevice) -> Result<T>,
    ) -> Result<T> {
        let mut devices = self.devices.lock().expect("sim state poisoned");
        let device = devices
            .iter_mut()
            .find(|d| d.config.card_id == card_id && d.config.device_id == device_id)
            .ok_or_else(|| {
                AscendError::not_found(format!("card {card_id} device {device_id}"))
            })?;
        f(device)
    }

    fn with_logical<T>(
        &self,
        logical_id: u32,
        f: impl FnOnce(&SimDevice) -> Result<T>,
    ) -> Result<T> {
        let devices = self.devices.lock().expect("sim state poisoned");
        let device = devices
            .iter()
            .find(|d| d.config.logical_id == logical_id)
            .ok_or_else(|| AscendError::not_found(format!("logical device {logical_id}")))?;
        f(device)
    }

    fn computing(aic: f32) -> ComputingQuota {
        ComputingQuota {
            aic,
            aiv: aic,
            memory_mb: (aic * 1024.0) as u64,
            stream_id: 256,
            event_id: 512,
            notify_id: 512,
            model_id: 128,
            ..Default::default()
        }
    }
}

impl VendorDriver for SimBackend {
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn card_list(&self) -> Result<Vec<i32>> {
        let devices = self.devices.lock().expect("sim state poisoned");
        let mut cards: Vec<i32> = devices.iter().map(|d| d.config.card_id).collect();
        cards.sort_unstable();
        cards.dedup();
        Ok(cards)
    }

    fn device_count(&self, card_id: i32) -> Result<i32> {
        let devices = self.devices.lock().expect("sim state poisoned");
        let count = devices
            .iter()
            .filter(|d| d.config.card_id == card_id)
            .count();
        if count == 0 {
            return Err(AscendError::not_found(format!("card {card_id}")));
        }
        Ok(count as i32)
    }

    fn logical_id(&self, card_id: i32, device_id: i32) -> Result<u32> {
        self.with_device(card_id, device_id, |d| Ok(d.config.logical_id))
    }

    fn physical_from_logical(&self, logical_id: u32) -> Result<u32> {
        self.with_logical(logical_id, |d| Ok(d.config.physical_id))
    }

    fn logical_from_physical(&self, physical_id: u32) -> Result<u32> {
        let devices = self.devices.lock().expect("sim state poisoned");
        devices
            .iter()
            .find(|d| d.config.physical_id == physical_id)
            .map(|d| d.config.logical_id)
            .ok_or_else(|| AscendError::not_found(format!("physical device {physical_id}")))
    }

    fn device_health(&self, logical_id: u32) -> Result<DeviceHealth> {
        self.with_logical(logical_id, |d| Ok(DeviceHealth::from_raw(d.config.health)))
    }

    fn network_health(&self, logical_id: u32) -> Result<NetworkHealth> {
        self.with_logical(logical_id, |d| {
            Ok(NetHealthStatus::from_raw(d.config.net_health))
        })
    }

    fn chip_info(&self, logical_id: u32) -> Result<ChipInfo> {
        self.with_logical(logical_id, |d| {
            Ok(ChipInfo {
                chip_type: "Ascend".to_owned(),
                chip_name: d.config.chip_name.clone(),
                chip_ver: "V1".to_owned(),
            })
        })
    }

    fn ip_address(&self, logical_id: u32, _port: NetworkPort) -> Result<IpInterface> {
        self.with_logical(logical_id, |d| {
            Ok(IpInterface {
                address: IpAddr::V4(Ipv4Addr::new(192, 168, 100, d.config.logical_id as u8)),
                mask: IpAddr::V4(Ipv4Addr::new(255, 255, 255, 0)),
            })
        })
    }

    fn vdev_table(&self, logical_id: u32) -> Result<VdevTable> {
        self.with_logical(logical_id, |d| {
            Ok(VdevTable {
                unused_aicore: d.free_aicore as u8,
                slots: d
                    .vdevs
                    .iter()
                    .map(|(&vdev_id, v)| VdevSlot {
                        status: 0,
                        vdev_id,
                        vfid: v.vfg_id,
                        container_id: 0,
                        aicore: v.aicore as u8,
                    })
                    .collect(),
            })
        })
    }

    fn create_vdev(
        &self,
        card_id: i32,
        device_id: i32,
        vdev_id: u32,
        template: &str,
    ) -> Result<VdevHandle> {
        self.counters.create.fetch_add(1, Ordering::SeqCst);

        // The driver keeps working whether or not the caller waits.
        if !self.config.create_latency.is_zero() {
            std::thread::sleep(self.config.create_latency);
        }

        if let Some(code) = self.config.fail_create {
            return Err(AscendError::call("dcmi_create_vdevice", code));
        }

        let aicore = crate::resource::template_aicore(template).unwrap_or(1.0);
        self.with_device(card_id, device_id, |d| {
            if d.vdevs.contains_key(&vdev_id) || d.vdevs.len() >= MAX_VDEV_NUM {
                return Err(AscendError::call("dcmi_create_vdevice", -8010));
            }
            if d.free_aicore < aicore {
                return Err(AscendError::call("dcmi_create_vdevice", -8020));
            }
            d.free_aicore -= aicore;
            let vfg_id = vdev_id;
            d.vdevs.insert(
                vdev_id,
                SimVdev {
                    aicore,
                    vfg_id,
                    template: template.to_owned(),
                },
            );
            debug!(card_id, device_id, vdev_id, template, "sim vdev created");
            Ok(VdevHandle {
                vdev_id,
                vfg_id,
                bdf: PcieBdf {
                    bus: 0x80 + vdev_id,
                    device: 0,
                    function: vdev_id,
                },
            })
        })
    }

    fn destroy_vdev(&self, card_id: i32, device_id: i32, vdev_id: u32) -> Result<()> {
        self.counters.destroy.fetch_add(1, Ordering::SeqCst);

        if let Some(code) = self.config.fail_destroy {
            return Err(AscendError::call("dcmi_set_destroy_vdevice", code));
        }

        self.with_device(card_id, device_id, |d| {
            let vdev = d
                .vdevs
                .remove(&vdev_id)
                .ok_or_else(|| AscendError::call("dcmi_set_destroy_vdevice", -8030))?;
            d.free_aicore += vdev.aicore;
            debug!(card_id, device_id, vdev_id, "sim vdev destroyed");
            Ok(())
        })
    }

    fn vdev_resource(
        &self,
        card_id: i32,
        device_id: i32,
        vdev_id: u32,
    ) -> Result<VdevDescriptor> {
        self.counters.vdev_resource.fetch_add(1, Ordering::SeqCst);
        self.query_fault()?;
        self.begin_read();
        let result = self.with_device(card_id, device_id, |d| {
            let vdev = d
                .vdevs
                .get(&vdev_id)
                .ok_or_else(|| AscendError::call("dcmi_get_device_info", -8031))?;
            Ok(VdevDescriptor {
                vdev_id,
                name: vdev.template.clone(),
                status: 0,
                in_container: false,
                vfid: vdev.vfg_id,
                vfg_id: vdev.vfg_id,
                container_id: 0,
                base: BaseQuota {
                    vfg_id: vdev.vfg_id,
                    ..Default::default()
                },
                computing: Self::computing(vdev.aicore),
                media: MediaQuota::default(),
            })
        });
        self.end_read();
        result
    }

    fn total_resource(&self, card_id: i32, device_id: i32) -> Result<TotalResource> {
        self.counters.total_resource.fetch_add(1, Ordering::SeqCst);
        self.query_fault()?;
        self.begin_read();
        let result = self.with_device(card_id, device_id, |d| {
            Ok(TotalResource {
                vdev_ids: d.vdevs.keys().copied().collect(),
                vfg_num: d.vdevs.len() as u32,
                vfg_bitmap: d.vdevs.keys().fold(0, |acc, id| acc | (1 << (id % 32))),
                base: BaseQuota::default(),
                computing: Self::computing(d.config.total_aicore),
                media: MediaQuota::default(),
            })
        });
        self.end_read();
        result
    }

    fn free_resource(&self, card_id: i32, device_id: i32) -> Result<FreeResource> {
        self.counters.free_resource.fetch_add(1, Ordering::SeqCst);
        self.query_fault()?;
        self.begin_read();
        let result = self.with_device(card_id, device_id, |d| {
            Ok(FreeResource {
                vfg_num: (MAX_VDEV_NUM - d.vdevs.len()) as u32,
                vfg_bitmap: 0,
                base: BaseQuota::default(),
                computing: Self::computing(d.free_aicore),
                media: MediaQuota::default(),
            })
        });
        self.end_read();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_accounting_round_trips() {
        let sim = SimBackend::single_device();
        assert!((sim.free_resource(0, 0).unwrap().computing.aic - 32.0).abs() < f32::EPSILON);

        sim.create_vdev(0, 0, 1, "vir08").unwrap();
        assert!((sim.free_resource(0, 0).unwrap().computing.aic - 24.0).abs() < f32::EPSILON);

        sim.destroy_vdev(0, 0, 1).unwrap();
        assert!((sim.free_resource(0, 0).unwrap().computing.aic - 32.0).abs() < f32::EPSILON);
    }

    #[test]
    fn create_rejects_exhausted_quota() {
        let sim = SimBackend::single_device();
        sim.create_vdev(0, 0, 1, "vir30").unwrap();
        let err = sim.create_vdev(0, 0, 2, "vir08").unwrap_err();
        assert!(matches!(err, AscendError::Call { .. }));
    }

    #[test]
    fn total_resource_lists_allocated_ids() {
        let sim = SimBackend::single_device();
        sim.create_vdev(0, 0, 3, "vir04").unwrap();
        sim.create_vdev(0, 0, 7, "vir04").unwrap();
        let total = sim.total_resource(0, 0).unwrap();
        assert_eq!(total.vdev_ids, vec![3, 7]);
    }

    #[test]
    fn injected_query_failures_run_out() {
        let sim = SimBackend::new(SimConfig {
            fail_queries: Some((2, -7)),
            ..Default::default()
        });
        assert!(sim.free_resource(0, 0).is_err());
        assert!(sim.free_resource(0, 0).is_err());
        assert!(sim.free_resource(0, 0).is_ok());
    }

    #[test]
    fn id_mapping_is_bijective() {
        let sim = SimBackend::single_device();
        let logical = sim.logical_id(0, 0).unwrap();
        let physical = sim.physical_from_logical(logical).unwrap();
        assert_eq!(sim.logical_from_physical(physical).unwrap(), logical);
    }
}
