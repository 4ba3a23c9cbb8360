//! Lifecycle manager validation against the simulated driver.
//!
//! Exercises the awkward paths that only show up with latency and faults
//! injected: deadline overrun with a driver that finishes late, reconcile
//! resolution, and read concurrency.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ascend_mgmt::backends::sim::{SimBackend, SimConfig, SimDeviceConfig};
use ascend_mgmt::{AscendError, VdevManager, VdevState, VendorDriver};

#[test]
fn deadline_overrun_leaves_pending_then_reconcile_adopts() {
    let sim = Arc::new(SimBackend::new(SimConfig {
        create_latency: Duration::from_millis(200),
        ..Default::default()
    }));
    let mgr = VdevManager::new(sim.clone());

    let err = mgr
        .create_vdev(0, 0, 3, "vir04", Some(Duration::from_millis(20)))
        .unwrap_err();
    assert!(matches!(err, AscendError::Timeout { .. }));
    assert_eq!(mgr.tracked_state(0, 0, 3), Some(VdevState::Pending));

    // pending occupies the ID
    let err = mgr.create_vdev(0, 0, 3, "vir04", None).unwrap_err();
    assert!(matches!(err, AscendError::DuplicateId { vdev_id: 3, .. }));

    // let the driver-side create finish, then resolve
    thread::sleep(Duration::from_millis(400));
    mgr.reconcile(0, 0).unwrap();
    assert_eq!(mgr.tracked_state(0, 0, 3), Some(VdevState::Active(None)));

    // the adopted vdev is queryable and destroyable
    let desc = mgr.vdev(0, 0, 3).unwrap();
    assert_eq!(desc.name, "vir04");
    mgr.destroy_vdev(0, 0, 3).unwrap();
}

#[test]
fn reconcile_drops_pending_vdev_the_driver_failed() {
    let sim = Arc::new(SimBackend::new(SimConfig {
        create_latency: Duration::from_millis(100),
        fail_create: Some(-42),
        ..Default::default()
    }));
    let mgr = VdevManager::new(sim);

    let err = mgr
        .create_vdev(0, 0, 1, "vir04", Some(Duration::from_millis(10)))
        .unwrap_err();
    assert!(matches!(err, AscendError::Timeout { .. }));

    thread::sleep(Duration::from_millis(250));
    mgr.reconcile(0, 0).unwrap();

    // driver never registered the vdev, so the ID is free again
    assert_eq!(mgr.tracked_state(0, 0, 1), None);
}

#[test]
fn externally_created_vdev_is_queryable() {
    let sim = Arc::new(SimBackend::single_device());
    let mgr = VdevManager::new(sim.clone());

    // another process created vdev 6 behind the manager's back
    sim.create_vdev(0, 0, 6, "vir08").unwrap();

    let desc = mgr.vdev(0, 0, 6).unwrap();
    assert_eq!(desc.vdev_id, 6);
    assert_eq!(desc.name, "vir08");
    assert_eq!(mgr.tracked_state(0, 0, 6), None);
}

#[test]
fn reconcile_clears_destroyed_marker_when_id_reused_externally() {
    let sim = Arc::new(SimBackend::single_device());
    let mgr = VdevManager::new(sim.clone());

    mgr.create_vdev(0, 0, 2, "vir04", None).unwrap();
    mgr.destroy_vdev(0, 0, 2).unwrap();
    assert_eq!(mgr.tracked_state(0, 0, 2), Some(VdevState::Destroyed));

    // ID 2 comes back to life outside the manager
    sim.create_vdev(0, 0, 2, "vir04").unwrap();
    mgr.reconcile(0, 0).unwrap();

    // the stale-handle marker is gone; queries go to the driver again
    assert_eq!(mgr.tracked_state(0, 0, 2), None);
    assert!(mgr.vdev(0, 0, 2).is_ok());
}

#[test]
fn read_queries_overlap_on_one_device() {
    let sim = Arc::new(SimBackend::new(SimConfig {
        query_hold: Duration::from_millis(50),
        ..Default::default()
    }));
    let mgr = Arc::new(VdevManager::new(sim.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let mgr = Arc::clone(&mgr);
        handles.push(thread::spawn(move || mgr.snapshot(0, 0).unwrap()));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // reads share the device lock; with 50 ms of hold per query at least
    // two must have been in flight together
    assert!(sim.counts().peak_concurrent_reads >= 2);
}

#[test]
fn distinct_devices_do_not_contend() {
    let sim = Arc::new(SimBackend::new(SimConfig {
        devices: vec![
            SimDeviceConfig::new(0, 0, 0, 1000),
            SimDeviceConfig::new(0, 1, 1, 1001),
        ],
        ..Default::default()
    }));
    let mgr = VdevManager::new(sim);

    // same vdev ID on two devices is not a duplicate
    mgr.create_vdev(0, 0, 0, "vir04", None).unwrap();
    mgr.create_vdev(0, 1, 0, "vir04", None).unwrap();

    mgr.destroy_vdev(0, 0, 0).unwrap();
    // device 1's vdev is untouched
    assert!(matches!(
        mgr.tracked_state(0, 1, 0),
        Some(VdevState::Active(Some(_)))
    ));
}

#[test]
fn split_table_tracks_allocations() {
    let sim = Arc::new(SimBackend::single_device());
    let mgr = VdevManager::new(sim.clone());

    mgr.create_vdev(0, 0, 1, "vir08", None).unwrap();
    mgr.create_vdev(0, 0, 4, "vir04", None).unwrap();

    let table = sim.vdev_table(0).unwrap();
    assert_eq!(table.slots.len(), 2);
    assert_eq!(table.unused_aicore, 20);
    let ids: Vec<u32> = table.slots.iter().map(|s| s.vdev_id).collect();
    assert_eq!(ids, vec![1, 4]);
}

#[test]
fn health_and_chip_queries_pass_through() {
    let mut device = SimDeviceConfig::new(0, 0, 0, 1000);
    device.health = 0;
    device.chip_name = "910B".to_owned();
    let sim = Arc::new(SimBackend::new(SimConfig {
        devices: vec![device],
        ..Default::default()
    }));
    let mgr = VdevManager::new(sim);

    assert!(mgr.device_health(0, 0).unwrap().is_healthy());
    assert_eq!(mgr.chip_info(0, 0).unwrap().chip_name, "910B");
}
