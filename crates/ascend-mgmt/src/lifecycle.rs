//! Virtual-device lifecycle manager.
//!
//! Serializes vdev creation and destruction per physical device so the
//! client never races the driver's internal vfg allocator, and tracks which
//! vdev IDs are live to answer stale-handle queries locally.
//!
//! Locking discipline: one `RwLock` per `(card, device)`. Read-only queries
//! take it shared and run concurrently with each other; create/destroy take
//! it exclusive and queue. Distinct devices never contend.
//!
//! Tracked state is a hint, not truth — after a deadline overrun the
//! driver-side operation may still complete, so the affected slot is marked
//! pending and [`VdevManager::reconcile`] must re-verify against the driver
//! before the ID is trusted again.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::driver::VendorDriver;
use crate::error::{AscendError, Result};
use crate::resource::{
    template_aicore, ChipInfo, DeviceHealth, NetworkHealth, ResourceSnapshot, VdevDescriptor,
    VdevHandle,
};

/// Bounded retry count for idempotent read-only queries. The vendor
/// contract specifies no backoff.
const READ_RETRIES: u32 = 3;

/// Tracked client-side state of one vdev ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdevState {
    /// Confirmed live. The handle is absent for vdevs adopted via
    /// [`VdevManager::reconcile`] rather than created here.
    Active(Option<VdevHandle>),
    /// A create call timed out; driver-side outcome unknown until the next
    /// reconcile.
    Pending,
    /// Destroyed through this manager. Terminal: queries answer `NotFound`
    /// without a driver round-trip.
    Destroyed,
}

#[derive(Debug, Default)]
struct DeviceTracker {
    vdevs: HashMap<u32, VdevState>,
}

type DeviceKey = (i32, i32);

/// Per-device serialized vdev lifecycle over a [`VendorDriver`].
#[derive(Debug)]
pub struct VdevManager {
    driver: Arc<dyn VendorDriver>,
    devices: Mutex<HashMap<DeviceKey, Arc<RwLock<DeviceTracker>>>>,
}

impl VdevManager {
    /// Wrap a driver.
    #[must_use]
    pub fn new(driver: Arc<dyn VendorDriver>) -> Self {
        Self {
            driver,
            devices: Mutex::new(HashMap::new()),
        }
    }

    fn tracker(&self, card_id: i32, device_id: i32) -> Arc<RwLock<DeviceTracker>> {
        let mut devices = self.devices.lock().expect("device map poisoned");
        devices
            .entry((card_id, device_id))
            .or_default()
            .clone()
    }

    /// Run a read-only driver query with the bounded retry the vendor
    /// contract allows for idempotent reads.
    fn retry_read<T>(&self, mut query: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match query() {
                Err(err) if err.is_retryable_read() && attempt + 1 < READ_RETRIES => {
                    attempt += 1;
                    debug!(attempt, %err, "read query failed, retrying");
                }
                other => return other,
            }
        }
    }

    /// Create a vdev with `vdev_id` from `template` on `(card, device)`.
    ///
    /// Collisions with a live or unresolved ID are rejected client-side
    /// without a driver call. A free-quota precheck rejects templates the
    /// device cannot satisfy. With a `deadline`, the create runs on a
    /// worker thread; overrun returns [`AscendError::Timeout`] and leaves
    /// the slot pending — the driver-side create may still complete, and
    /// [`Self::reconcile`] resolves it.
    ///
    /// # Errors
    ///
    /// `DuplicateId`, `ResourceExhausted`, `Timeout`, or the driver's raw
    /// failure.
    pub fn create_vdev(
        &self,
        card_id: i32,
        device_id: i32,
        vdev_id: u32,
        template: &str,
        deadline: Option<Duration>,
    ) -> Result<VdevHandle> {
        let tracker = self.tracker(card_id, device_id);
        let mut state = tracker.write().expect("device tracker poisoned");

        match state.vdevs.get(&vdev_id) {
            Some(VdevState::Active(_) | VdevState::Pending) => {
                // Pending counts as occupied: the ID is not provably free
                // until a reconcile resolves it.
                return Err(AscendError::DuplicateId {
                    card_id,
                    device_id,
                    vdev_id,
                });
            }
            Some(VdevState::Destroyed) | None => {}
        }

        if let Some(requested) = template_aicore(template) {
            let free = self.retry_read(|| self.driver.free_resource(card_id, device_id))?;
            if free.computing.aic < requested {
                return Err(AscendError::ResourceExhausted {
                    requested,
                    available: free.computing.aic,
                });
            }
        }

        let outcome = match deadline {
            None => self.driver.create_vdev(card_id, device_id, vdev_id, template),
            Some(limit) => {
                let (tx, rx) = mpsc::channel();
                let driver = Arc::clone(&self.driver);
                let template = template.to_owned();
                thread::spawn(move || {
                    // The driver call cannot be cancelled; if the waiter is
                    // gone the send just fails and the result is dropped.
                    let result = driver.create_vdev(card_id, device_id, vdev_id, &template);
                    let _ = tx.send(result);
                });
                match rx.recv_timeout(limit) {
                    Ok(result) => result,
                    Err(_) => {
                        let duration_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                        warn!(
                            card_id,
                            device_id,
                            vdev_id,
                            deadline_ms = duration_ms,
                            "create exceeded deadline; outcome unknown until reconcile"
                        );
                        state.vdevs.insert(vdev_id, VdevState::Pending);
                        return Err(AscendError::Timeout { duration_ms });
                    }
                }
            }
        };

        let handle = outcome?;
        info!(
            card_id,
            device_id,
            vdev_id = handle.vdev_id,
            vfg_id = handle.vfg_id,
            bdf = %handle.bdf,
            "vdev created"
        );
        state
            .vdevs
            .insert(handle.vdev_id, VdevState::Active(Some(handle)));
        Ok(handle)
    }

    /// Destroy a tracked vdev.
    ///
    /// The tracked entry moves to `Destroyed` before the driver call and
    /// is never restored: once teardown is initiated the hardware may
    /// already be transitioning, so a vendor failure is logged and
    /// surfaced but the ID is not resurrected client-side.
    ///
    /// # Errors
    ///
    /// `NotFound` when the tracked set proves the vdev absent (no driver
    /// call made), or the driver's raw failure.
    pub fn destroy_vdev(&self, card_id: i32, device_id: i32, vdev_id: u32) -> Result<()> {
        let tracker = self.tracker(card_id, device_id);
        let mut state = tracker.write().expect("device tracker poisoned");

        match state.vdevs.get(&vdev_id) {
            None | Some(VdevState::Destroyed) => {
                return Err(AscendError::not_found(format!(
                    "vdev {vdev_id} on card {card_id} device {device_id}"
                )));
            }
            Some(VdevState::Active(_) | VdevState::Pending) => {}
        }

        state.vdevs.insert(vdev_id, VdevState::Destroyed);

        if let Err(err) = self.driver.destroy_vdev(card_id, device_id, vdev_id) {
            warn!(
                card_id,
                device_id,
                vdev_id,
                %err,
                "destroy failed after teardown initiated; tracked entry not restored"
            );
            return Err(err);
        }

        info!(card_id, device_id, vdev_id, "vdev destroyed");
        Ok(())
    }

    /// Query one vdev's resource grant.
    ///
    /// A `Destroyed` tracked state answers `NotFound` locally. IDs the
    /// manager has never seen go to the driver — another process may have
    /// created them.
    ///
    /// # Errors
    ///
    /// `NotFound` for a destroyed vdev, or the driver's failure.
    pub fn vdev(&self, card_id: i32, device_id: i32, vdev_id: u32) -> Result<VdevDescriptor> {
        let tracker = self.tracker(card_id, device_id);
        let state = tracker.read().expect("device tracker poisoned");

        if matches!(state.vdevs.get(&vdev_id), Some(VdevState::Destroyed)) {
            return Err(AscendError::not_found(format!(
                "vdev {vdev_id} on card {card_id} device {device_id} (destroyed)"
            )));
        }

        self.retry_read(|| self.driver.vdev_resource(card_id, device_id, vdev_id))
    }

    /// Tracked client-side state of a vdev ID, if any.
    #[must_use]
    pub fn tracked_state(&self, card_id: i32, device_id: i32, vdev_id: u32) -> Option<VdevState> {
        let tracker = self.tracker(card_id, device_id);
        let state = tracker.read().expect("device tracker poisoned");
        state.vdevs.get(&vdev_id).cloned()
    }

    /// Point-in-time total/free resource report.
    ///
    /// # Errors
    ///
    /// Driver failure after bounded retry, or `MalformedResponse`.
    pub fn snapshot(&self, card_id: i32, device_id: i32) -> Result<ResourceSnapshot> {
        let tracker = self.tracker(card_id, device_id);
        let _state = tracker.read().expect("device tracker poisoned");

        let total = self.retry_read(|| self.driver.total_resource(card_id, device_id))?;
        let free = self.retry_read(|| self.driver.free_resource(card_id, device_id))?;
        Ok(ResourceSnapshot { total, free })
    }

    /// Device health, serialized against in-flight mutations on the same
    /// device.
    ///
    /// # Errors
    ///
    /// Driver failure after bounded retry.
    pub fn device_health(&self, card_id: i32, device_id: i32) -> Result<DeviceHealth> {
        let tracker = self.tracker(card_id, device_id);
        let _state = tracker.read().expect("device tracker poisoned");

        let logical = self.retry_read(|| self.driver.logical_id(card_id, device_id))?;
        self.retry_read(|| self.driver.device_health(logical))
    }

    /// RoCE network health, serialized like [`Self::device_health`].
    ///
    /// # Errors
    ///
    /// Driver failure after bounded retry.
    pub fn network_health(&self, card_id: i32, device_id: i32) -> Result<NetworkHealth> {
        let tracker = self.tracker(card_id, device_id);
        let _state = tracker.read().expect("device tracker poisoned");

        let logical = self.retry_read(|| self.driver.logical_id(card_id, device_id))?;
        self.retry_read(|| self.driver.network_health(logical))
    }

    /// Chip identification, serialized like [`Self::device_health`].
    ///
    /// # Errors
    ///
    /// Driver failure after bounded retry.
    pub fn chip_info(&self, card_id: i32, device_id: i32) -> Result<ChipInfo> {
        let tracker = self.tracker(card_id, device_id);
        let _state = tracker.read().expect("device tracker poisoned");

        let logical = self.retry_read(|| self.driver.logical_id(card_id, device_id))?;
        self.retry_read(|| self.driver.chip_info(logical))
    }

    /// Re-verify the tracked set against the driver's allocated-ID table.
    ///
    /// Mandatory after a [`AscendError::Timeout`] before the affected vdev
    /// ID is reused: pending slots resolve to active (driver finished the
    /// create) or are dropped (driver failed it). Destroyed markers whose
    /// ID reappears in the driver table were recreated externally and the
    /// marker is cleared.
    ///
    /// # Errors
    ///
    /// Driver failure after bounded retry, or `MalformedResponse`.
    pub fn reconcile(&self, card_id: i32, device_id: i32) -> Result<()> {
        let tracker = self.tracker(card_id, device_id);
        let mut state = tracker.write().expect("device tracker poisoned");

        let total = self.retry_read(|| self.driver.total_resource(card_id, device_id))?;
        let live: std::collections::HashSet<u32> = total.vdev_ids.iter().copied().collect();

        state.vdevs.retain(|vdev_id, vstate| match vstate {
            VdevState::Pending => {
                if live.contains(vdev_id) {
                    debug!(card_id, device_id, vdev_id, "pending vdev resolved active");
                    *vstate = VdevState::Active(None);
                    true
                } else {
                    debug!(card_id, device_id, vdev_id, "pending vdev resolved absent");
                    false
                }
            }
            VdevState::Active(_) => {
                if live.contains(vdev_id) {
                    true
                } else {
                    warn!(
                        card_id,
                        device_id, vdev_id, "tracked vdev vanished driver-side, dropping"
                    );
                    false
                }
            }
            // keep the local stale-handle proof unless the ID was reused
            VdevState::Destroyed => !live.contains(vdev_id),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sim::{SimBackend, SimConfig};

    fn manager() -> (Arc<SimBackend>, VdevManager) {
        let sim = Arc::new(SimBackend::single_device());
        let mgr = VdevManager::new(sim.clone());
        (sim, mgr)
    }

    #[test]
    fn create_then_destroy_walks_the_state_machine() {
        let (sim, mgr) = manager();

        assert_eq!(mgr.tracked_state(0, 0, 5), None);

        let handle = mgr.create_vdev(0, 0, 5, "vir04", None).unwrap();
        assert_eq!(handle.vdev_id, 5);
        assert!(matches!(
            mgr.tracked_state(0, 0, 5),
            Some(VdevState::Active(Some(_)))
        ));

        mgr.destroy_vdev(0, 0, 5).unwrap();
        assert_eq!(mgr.tracked_state(0, 0, 5), Some(VdevState::Destroyed));

        // destroyed is terminal: the query answers locally
        let queries_before = sim.counts().vdev_resource;
        let err = mgr.vdev(0, 0, 5).unwrap_err();
        assert!(matches!(err, AscendError::NotFound { .. }));
        assert_eq!(sim.counts().vdev_resource, queries_before);
    }

    #[test]
    fn duplicate_id_rejected_without_driver_call() {
        let (sim, mgr) = manager();
        mgr.create_vdev(0, 0, 2, "vir04", None).unwrap();

        let creates_before = sim.counts().create;
        let err = mgr.create_vdev(0, 0, 2, "vir04", None).unwrap_err();
        assert!(matches!(err, AscendError::DuplicateId { vdev_id: 2, .. }));
        assert_eq!(sim.counts().create, creates_before);
    }

    #[test]
    fn destroy_unknown_id_is_local_not_found() {
        let (sim, mgr) = manager();
        let err = mgr.destroy_vdev(0, 0, 9).unwrap_err();
        assert!(matches!(err, AscendError::NotFound { .. }));
        assert_eq!(sim.counts().destroy, 0);
    }

    #[test]
    fn recreate_after_destroy_is_allowed() {
        let (_sim, mgr) = manager();
        mgr.create_vdev(0, 0, 1, "vir04", None).unwrap();
        mgr.destroy_vdev(0, 0, 1).unwrap();
        mgr.create_vdev(0, 0, 1, "vir04", None).unwrap();
        assert!(matches!(
            mgr.tracked_state(0, 0, 1),
            Some(VdevState::Active(Some(_)))
        ));
    }

    #[test]
    fn quota_precheck_rejects_oversized_template() {
        let (sim, mgr) = manager();
        let err = mgr.create_vdev(0, 0, 0, "vir64", None).unwrap_err();
        assert!(matches!(
            err,
            AscendError::ResourceExhausted {
                requested,
                available
            } if requested > available
        ));
        // rejected before the driver saw the create
        assert_eq!(sim.counts().create, 0);
    }

    #[test]
    fn destroy_failure_does_not_restore_tracked_entry() {
        let sim = Arc::new(SimBackend::new(SimConfig {
            fail_destroy: Some(-13),
            ..Default::default()
        }));
        let mgr = VdevManager::new(sim.clone());

        mgr.create_vdev(0, 0, 4, "vir04", None).unwrap();
        let err = mgr.destroy_vdev(0, 0, 4).unwrap_err();
        assert!(matches!(err, AscendError::Call { .. }));

        // best-effort once initiated: still destroyed client-side
        assert_eq!(mgr.tracked_state(0, 0, 4), Some(VdevState::Destroyed));
    }

    #[test]
    fn read_queries_retry_bounded_times() {
        let sim = Arc::new(SimBackend::new(SimConfig {
            fail_queries: Some((2, -7)),
            ..Default::default()
        }));
        let mgr = VdevManager::new(sim.clone());

        // two failures then success, inside the bound of 3 attempts
        let snapshot = mgr.snapshot(0, 0);
        assert!(snapshot.is_ok());
    }

    #[test]
    fn read_retries_exhaust_and_surface() {
        let sim = Arc::new(SimBackend::new(SimConfig {
            fail_queries: Some((10, -7)),
            ..Default::default()
        }));
        let mgr = VdevManager::new(sim);
        let err = mgr.snapshot(0, 0).unwrap_err();
        assert!(matches!(err, AscendError::Call { code: -7, .. }));
    }
}
