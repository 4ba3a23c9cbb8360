//! Vendor ABI surface for Huawei Ascend NPU management (DCMI/DSMI).
//!
//! This crate carries the two halves of the binary contract with the
//! closed-source driver:
//!
//! - [`wire`] — `#[repr(C)]` struct layouts, reserved padding, and the
//!   numeric command/status codes, transcribed from
//!   `dcmi_interface_api.h` and `dsmi_common_interface.h`.
//! - [`DcmiLibrary`] — `libdcmi.so` loaded at runtime with every entry
//!   point resolved up front, plus thin call wrappers that keep all
//!   `unsafe` inside this crate and return the raw vendor code on failure.
//!
//! Nothing here interprets results. Validation, error taxonomy, and
//! lifecycle tracking live in `ascend-mgmt`, one layer up.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod library;
pub mod wire;

pub use library::{DcmiLibrary, LoadError, RawResult};
