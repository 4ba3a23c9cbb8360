//! Driver backends.
//!
//! `DcmiBackend` binds to the vendor's `libdcmi.so`; `SimBackend` is a
//! deterministic in-memory driver so everything above the
//! [`VendorDriver`](crate::driver::VendorDriver) seam runs in CI without
//! Ascend hardware.

pub mod dcmi;
pub mod sim;

pub use dcmi::DcmiBackend;
pub use sim::{SimBackend, SimCallCounts, SimConfig, SimDeviceConfig};
