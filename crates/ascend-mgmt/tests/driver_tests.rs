//! Smoke tests against a real Ascend driver installation.
//!
//! These need `libdcmi.so` and at least one NPU present, so they are
//! ignored by default: `cargo test -- --ignored` on a provisioned host.

use ascend_mgmt::{DcmiSession, NetworkPort};

#[test]
#[ignore] // Requires hardware
fn open_session_and_enumerate() {
    let session = DcmiSession::open().expect("driver session");
    let inventory = session.inventory();
    assert!(!inventory.is_empty(), "no NPU devices found");

    for dev in inventory.devices() {
        println!(
            "card {} device {} -> logical {} physical {}",
            dev.card_id, dev.device_id, dev.logical_id, dev.physical_id
        );
    }
}

#[test]
#[ignore] // Requires hardware
fn query_health_and_chip_info() {
    let session = DcmiSession::open().expect("driver session");
    let mgr = session.vdev_manager();

    for dev in session.inventory().devices() {
        let health = mgr.device_health(dev.card_id, dev.device_id).expect("health");
        let chip = mgr.chip_info(dev.card_id, dev.device_id).expect("chip info");
        println!(
            "card {} device {}: {:?}, {} {} {}",
            dev.card_id, dev.device_id, health, chip.chip_type, chip.chip_name, chip.chip_ver
        );
    }
}

#[test]
#[ignore] // Requires hardware
fn snapshot_reports_totals() {
    let session = DcmiSession::open().expect("driver session");
    let mgr = session.vdev_manager();
    let dev = session.inventory().devices()[0];

    let snapshot = mgr.snapshot(dev.card_id, dev.device_id).expect("snapshot");
    println!(
        "total aic {} free aic {} allocated vdevs {:?}",
        snapshot.total.computing.aic, snapshot.free.computing.aic, snapshot.total.vdev_ids
    );
    assert!(snapshot.free.computing.aic <= snapshot.total.computing.aic);
}

#[test]
#[ignore] // Requires hardware and a RoCE-capable card
fn roce_ip_is_readable() {
    let session = DcmiSession::open().expect("driver session");
    let dev = session.inventory().devices()[0];
    let ip = session
        .driver()
        .ip_address(dev.logical_id, NetworkPort::Roce)
        .expect("roce ip");
    println!("logical {}: {} mask {}", dev.logical_id, ip.address, ip.mask);
}
