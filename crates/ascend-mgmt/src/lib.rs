//! Device resource query and virtual-device lifecycle client for Huawei
//! Ascend NPUs.
//!
//! Sits on top of `ascend-dcmi`'s raw ABI surface and turns it into a
//! typed client: enumeration across the card/device/logical/physical ID
//! schemes, health and network queries, resource snapshots, and a
//! serialized vdev create/destroy lifecycle with stale-handle tracking.
//!
//! # Backend hierarchy
//!
//! ```text
//! Production:
//!   DcmiBackend — libdcmi.so loaded at runtime (requires the Ascend driver)
//!
//! Development / CI:
//!   SimBackend  — in-memory driver with fault and latency injection
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use ascend_mgmt::prelude::*;
//!
//! # fn main() -> ascend_mgmt::Result<()> {
//! let session = DcmiSession::open()?;
//! for dev in session.inventory().devices() {
//!     println!("card {} device {} -> logical {} physical {}",
//!              dev.card_id, dev.device_id, dev.logical_id, dev.physical_id);
//! }
//!
//! let mgr = session.vdev_manager();
//! let handle = mgr.create_vdev(0, 0, 0, "vir04", None)?;
//! println!("vdev {} at {}", handle.vdev_id, handle.bdf);
//! mgr.destroy_vdev(0, 0, handle.vdev_id)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod backends;
mod discovery;
mod driver;
mod error;
mod lifecycle;
mod resource;
mod session;

pub use discovery::{CardInventory, DeviceEntry};
pub use driver::VendorDriver;
pub use error::{AscendError, Result};
pub use lifecycle::{VdevManager, VdevState};
pub use resource::{
    decode_ip, decode_ip_interface, template_aicore, BaseQuota, ChipInfo, ComputingQuota,
    DeviceHealth, FreeResource, IpInterface, MediaQuota, NetworkHealth, NetworkPort, PcieBdf,
    ResourceSnapshot, TotalResource, VdevDescriptor, VdevHandle, VdevSlot, VdevTable,
};
pub use session::DcmiSession;

/// Common imports for client code.
pub mod prelude {
    pub use crate::backends::sim::SimBackend;
    pub use crate::{
        AscendError, CardInventory, DcmiSession, DeviceEntry, DeviceHealth, NetworkPort,
        ResourceSnapshot, VdevHandle, VdevManager, VendorDriver,
    };
}
