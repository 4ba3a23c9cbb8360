//! Session establishment against the vendor driver.
//!
//! `dcmi_init` is process-global in the vendor library, so initialization
//! runs exactly once per process behind a [`OnceLock`] no matter how many
//! sessions are opened; later opens reuse the recorded outcome.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use ascend_dcmi::DcmiLibrary;

use crate::backends::dcmi::DcmiBackend;
use crate::discovery::CardInventory;
use crate::driver::VendorDriver;
use crate::error::{AscendError, Result};
use crate::lifecycle::VdevManager;

static DCMI_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// An initialized handle to the driver plus the device inventory seen at
/// open time.
#[derive(Debug)]
pub struct DcmiSession {
    driver: Arc<dyn VendorDriver>,
    inventory: CardInventory,
}

impl DcmiSession {
    /// Load the vendor library from its well-known paths and initialize it.
    ///
    /// # Errors
    ///
    /// `DriverUnavailable` when the library cannot be found or
    /// `dcmi_init` fails; enumeration errors pass through.
    pub fn open() -> Result<Self> {
        let lib = DcmiLibrary::load()?;
        Self::with_backend(Arc::new(DcmiBackend::new(lib)))
    }

    /// Load the vendor library from an explicit path.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open`].
    pub fn open_at(path: &std::path::Path) -> Result<Self> {
        let lib = DcmiLibrary::load_from(path)?;
        Self::with_backend(Arc::new(DcmiBackend::new(lib)))
    }

    /// Build a session over an already constructed driver. This is how the
    /// simulator backend gets wired in.
    ///
    /// # Errors
    ///
    /// `DriverUnavailable` when initialization fails; enumeration errors
    /// pass through.
    pub fn with_backend(driver: Arc<dyn VendorDriver>) -> Result<Self> {
        let outcome = DCMI_INIT.get_or_init(|| {
            debug!("initializing driver");
            driver.probe().map_err(|err| err.to_string())
        });
        if let Err(reason) = outcome {
            return Err(AscendError::driver_unavailable(reason.clone()));
        }

        let inventory = CardInventory::enumerate(&driver)?;
        info!(devices = inventory.len(), "driver session opened");
        Ok(Self { driver, inventory })
    }

    /// The driver behind this session.
    #[must_use]
    pub fn driver(&self) -> Arc<dyn VendorDriver> {
        Arc::clone(&self.driver)
    }

    /// Devices enumerated when the session opened.
    #[must_use]
    pub fn inventory(&self) -> &CardInventory {
        &self.inventory
    }

    /// Build a lifecycle manager over this session's driver.
    #[must_use]
    pub fn vdev_manager(&self) -> VdevManager {
        VdevManager::new(Arc::clone(&self.driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sim::SimBackend;

    // DCMI_INIT is process-global, so both assertions share one test: the
    // second open must reuse the first probe instead of re-initializing.
    #[test]
    fn init_runs_once_across_sessions() {
        let first = DcmiSession::with_backend(Arc::new(SimBackend::single_device()));
        assert!(first.is_ok());

        let second = DcmiSession::with_backend(Arc::new(SimBackend::single_device()));
        assert!(second.is_ok());
        assert_eq!(second.unwrap().inventory().len(), 1);
    }
}
