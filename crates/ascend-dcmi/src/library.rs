//! Dynamic loading of the vendor driver library.
//!
//! The DCMI/DSMI implementation ships as a closed-source `libdcmi.so`. It is
//! loaded at runtime with `dlopen` semantics and every entry point is
//! resolved once up front, so a missing symbol fails loading instead of a
//! call made hours later.

use std::ffi::{c_char, c_int, c_uint, c_void};
use std::path::PathBuf;
use std::sync::Arc;

use libloading::{Library, Symbol};
use thiserror::Error;
use tracing::{debug, info};

use crate::wire::{
    DcmiCreateVdevOut, DsmiChipInfo, DsmiIpAddr, DsmiVdevInfo,
};

/// Errors raised while locating or loading `libdcmi.so`.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The library was not found in any known location.
    #[error("libdcmi.so not found (searched {searched} locations); is the Ascend driver installed?")]
    NotFound {
        /// Number of candidate paths probed.
        searched: usize,
    },

    /// `dlopen` failed.
    #[error("failed to load {path}: {source}")]
    Open {
        /// Path that was attempted.
        path: PathBuf,
        /// Loader error.
        source: libloading::Error,
    },

    /// A required entry point is absent — driver too old or too new.
    #[error("libdcmi.so is missing symbol {symbol}: {source}")]
    MissingSymbol {
        /// The unresolved symbol name.
        symbol: &'static str,
        /// Loader error.
        source: libloading::Error,
    },
}

/// Result of a raw vendor call.
///
/// The driver's only documented contract is `0 == success`; any nonzero
/// code is opaque and is carried verbatim for diagnostics.
pub type RawResult<T> = Result<T, i32>;

fn check(rc: c_int) -> RawResult<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(rc)
    }
}

type DcmiInitFn = unsafe extern "C" fn() -> c_int;
type GetCardNumListFn =
    unsafe extern "C" fn(card_num: *mut c_int, card_list: *mut c_int, list_len: c_int) -> c_int;
type GetDeviceNumInCardFn = unsafe extern "C" fn(card_id: c_int, device_num: *mut c_int) -> c_int;
type GetDeviceLogicIdFn =
    unsafe extern "C" fn(device_logic_id: *mut c_int, card_id: c_int, device_id: c_int) -> c_int;
type CreateVdeviceFn = unsafe extern "C" fn(
    card_id: c_int,
    device_id: c_int,
    vdev_id: c_int,
    template_name: *const c_char,
    out: *mut DcmiCreateVdevOut,
) -> c_int;
type SetDestroyVdeviceFn =
    unsafe extern "C" fn(card_id: c_int, device_id: c_int, vdev_id: c_uint) -> c_int;
type GetDeviceInfoFn = unsafe extern "C" fn(
    card_id: c_int,
    device_id: c_int,
    main_cmd: c_uint,
    sub_cmd: c_uint,
    buf: *mut c_void,
    size: *mut c_uint,
) -> c_int;
type GetPhyidFromLogicidFn =
    unsafe extern "C" fn(logicid: c_uint, phyid: *mut c_uint) -> c_int;
type GetLogicidFromPhyidFn =
    unsafe extern "C" fn(phyid: c_uint, logicid: *mut c_uint) -> c_int;
type GetDeviceHealthFn = unsafe extern "C" fn(device_id: c_int, phealth: *mut c_uint) -> c_int;
type GetDeviceIpAddressFn = unsafe extern "C" fn(
    device_id: c_int,
    port_type: c_int,
    port_id: c_int,
    ip_address: *mut DsmiIpAddr,
    mask_address: *mut DsmiIpAddr,
) -> c_int;
type GetChipInfoFn =
    unsafe extern "C" fn(device_id: c_int, chip_info: *mut DsmiChipInfo) -> c_int;
type GetNetworkHealthFn =
    unsafe extern "C" fn(device_id: c_int, presult: *mut c_uint) -> c_int;
type GetVdeviceInfoFn =
    unsafe extern "C" fn(devid: c_uint, info: *mut DsmiVdevInfo) -> c_int;

/// Resolved entry points of `libdcmi.so`.
///
/// The raw pointers are only as valid as the [`Library`] they came from, so
/// the handle is kept alive alongside them.
pub struct DcmiLibrary {
    _library: Arc<Library>,
    pub(crate) init: DcmiInitFn,
    pub(crate) get_card_num_list: GetCardNumListFn,
    pub(crate) get_device_num_in_card: GetDeviceNumInCardFn,
    pub(crate) get_device_logic_id: GetDeviceLogicIdFn,
    pub(crate) create_vdevice: CreateVdeviceFn,
    pub(crate) set_destroy_vdevice: SetDestroyVdeviceFn,
    pub(crate) get_device_info: GetDeviceInfoFn,
    pub(crate) get_phyid_from_logicid: GetPhyidFromLogicidFn,
    pub(crate) get_logicid_from_phyid: GetLogicidFromPhyidFn,
    pub(crate) get_device_health: GetDeviceHealthFn,
    pub(crate) get_device_ip_address: GetDeviceIpAddressFn,
    pub(crate) get_chip_info: GetChipInfoFn,
    pub(crate) get_network_health: GetNetworkHealthFn,
    pub(crate) get_vdevice_info: GetVdeviceInfoFn,
}

impl std::fmt::Debug for DcmiLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcmiLibrary").finish_non_exhaustive()
    }
}

impl DcmiLibrary {
    /// Load `libdcmi.so` from the standard Ascend driver install locations.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if no candidate exists, `dlopen` fails, or a
    /// required symbol is absent.
    pub fn load() -> Result<Self, LoadError> {
        let path = Self::find_library()?;
        Self::load_from(path)
    }

    /// Load the driver library from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if `dlopen` fails or a required symbol is
    /// absent.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        info!(path = %path.display(), "loading DCMI driver library");

        // Safety: libdcmi.so is the vendor's stable C ABI; nothing runs on
        // load beyond its constructors.
        let library = unsafe {
            Library::new(&path).map_err(|source| LoadError::Open {
                path: path.clone(),
                source,
            })?
        };
        let library = Arc::new(library);

        macro_rules! resolve {
            ($name:literal, $ty:ty) => {{
                // Safety: signature types above transcribe the C prototypes
                // in dcmi_interface_api.h / dsmi_common_interface.h.
                let sym: Symbol<'_, $ty> = unsafe {
                    library
                        .get(concat!($name, "\0").as_bytes())
                        .map_err(|source| LoadError::MissingSymbol {
                            symbol: $name,
                            source,
                        })?
                };
                *sym
            }};
        }

        Ok(Self {
            init: resolve!("dcmi_init", DcmiInitFn),
            get_card_num_list: resolve!("dcmi_get_card_num_list", GetCardNumListFn),
            get_device_num_in_card: resolve!("dcmi_get_device_num_in_card", GetDeviceNumInCardFn),
            get_device_logic_id: resolve!("dcmi_get_device_logic_id", GetDeviceLogicIdFn),
            create_vdevice: resolve!("dcmi_create_vdevice", CreateVdeviceFn),
            set_destroy_vdevice: resolve!("dcmi_set_destroy_vdevice", SetDestroyVdeviceFn),
            get_device_info: resolve!("dcmi_get_device_info", GetDeviceInfoFn),
            get_phyid_from_logicid: resolve!("dsmi_get_phyid_from_logicid", GetPhyidFromLogicidFn),
            get_logicid_from_phyid: resolve!("dsmi_get_logicid_from_phyid", GetLogicidFromPhyidFn),
            get_device_health: resolve!("dsmi_get_device_health", GetDeviceHealthFn),
            get_device_ip_address: resolve!("dsmi_get_device_ip_address", GetDeviceIpAddressFn),
            get_chip_info: resolve!("dsmi_get_chip_info", GetChipInfoFn),
            get_network_health: resolve!("dsmi_get_network_health", GetNetworkHealthFn),
            get_vdevice_info: resolve!("dsmi_get_vdevice_info", GetVdeviceInfoFn),
            _library: library,
        })
    }

    /// `dcmi_init` — must succeed once per process before any other call.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn init(&self) -> RawResult<()> {
        // Safety: no arguments; vendor initializes its own global state.
        check(unsafe { (self.init)() })
    }

    /// `dcmi_get_card_num_list` — enumerate card IDs.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn card_num_list(&self) -> RawResult<(i32, [i32; crate::wire::MAX_CARD_NUM])> {
        let mut count: c_int = 0;
        let mut ids = [0 as c_int; crate::wire::MAX_CARD_NUM];
        // Safety: ids has MAX_CARD_NUM slots and the driver is told so.
        check(unsafe {
            (self.get_card_num_list)(
                &mut count,
                ids.as_mut_ptr(),
                crate::wire::MAX_CARD_NUM as c_int,
            )
        })?;
        Ok((count, ids))
    }

    /// `dcmi_get_device_num_in_card`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn device_num_in_card(&self, card_id: i32) -> RawResult<i32> {
        let mut num: c_int = 0;
        // Safety: out-pointer is valid for the duration of the call.
        check(unsafe { (self.get_device_num_in_card)(card_id, &mut num) })?;
        Ok(num)
    }

    /// `dcmi_get_device_logic_id`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn device_logic_id(&self, card_id: i32, device_id: i32) -> RawResult<i32> {
        let mut logic_id: c_int = 0;
        // Safety: out-pointer is valid for the duration of the call.
        check(unsafe { (self.get_device_logic_id)(&mut logic_id, card_id, device_id) })?;
        Ok(logic_id)
    }

    /// `dcmi_create_vdevice`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn create_vdevice(
        &self,
        card_id: i32,
        device_id: i32,
        vdev_id: i32,
        template_name: &std::ffi::CStr,
    ) -> RawResult<DcmiCreateVdevOut> {
        let mut out = DcmiCreateVdevOut::default();
        // Safety: template_name is NUL-terminated; out is a valid
        // dcmi_create_vdev_out buffer.
        check(unsafe {
            (self.create_vdevice)(card_id, device_id, vdev_id, template_name.as_ptr(), &mut out)
        })?;
        Ok(out)
    }

    /// `dcmi_set_destroy_vdevice`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn destroy_vdevice(&self, card_id: i32, device_id: i32, vdev_id: u32) -> RawResult<()> {
        // Safety: plain scalar arguments.
        check(unsafe { (self.set_destroy_vdevice)(card_id, device_id, vdev_id) })
    }

    /// `dcmi_get_device_info` over a caller-supplied `#[repr(C)]` buffer.
    ///
    /// The driver negotiates buffer sizes: `size` goes in as the buffer
    /// capacity and comes back as the bytes actually written. The caller
    /// checks the returned size against its expectation.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    #[allow(clippy::cast_possible_truncation)] // repr(C) structs are all well under u32::MAX
    pub fn device_info_buf<T: Copy>(
        &self,
        card_id: i32,
        device_id: i32,
        main_cmd: crate::wire::MainCmd,
        sub_cmd: u32,
        buf: &mut T,
    ) -> RawResult<u32> {
        let mut size = std::mem::size_of::<T>() as c_uint;
        // Safety: buf is a valid, writable buffer of `size` bytes; the
        // sub-command chooses which repr(C) struct the driver fills.
        check(unsafe {
            (self.get_device_info)(
                card_id,
                device_id,
                main_cmd as c_uint,
                sub_cmd,
                (buf as *mut T).cast::<c_void>(),
                &mut size,
            )
        })?;
        Ok(size)
    }

    /// `dsmi_get_phyid_from_logicid`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn phyid_from_logicid(&self, logic_id: u32) -> RawResult<u32> {
        let mut phy_id: c_uint = 0;
        // Safety: out-pointer is valid for the duration of the call.
        check(unsafe { (self.get_phyid_from_logicid)(logic_id, &mut phy_id) })?;
        Ok(phy_id)
    }

    /// `dsmi_get_logicid_from_phyid`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn logicid_from_phyid(&self, phy_id: u32) -> RawResult<u32> {
        let mut logic_id: c_uint = 0;
        // Safety: out-pointer is valid for the duration of the call.
        check(unsafe { (self.get_logicid_from_phyid)(phy_id, &mut logic_id) })?;
        Ok(logic_id)
    }

    /// `dsmi_get_device_health`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn device_health(&self, device_id: i32) -> RawResult<u32> {
        let mut health: c_uint = 0;
        // Safety: out-pointer is valid for the duration of the call.
        check(unsafe { (self.get_device_health)(device_id, &mut health) })?;
        Ok(health)
    }

    /// `dsmi_get_network_health`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn network_health(&self, device_id: i32) -> RawResult<u32> {
        let mut status: c_uint = 0;
        // Safety: out-pointer is valid for the duration of the call.
        check(unsafe { (self.get_network_health)(device_id, &mut status) })?;
        Ok(status)
    }

    /// `dsmi_get_chip_info`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn chip_info(&self, device_id: i32) -> RawResult<DsmiChipInfo> {
        let mut info = DsmiChipInfo::default();
        // Safety: info is a valid dsmi_chip_info_stru buffer.
        check(unsafe { (self.get_chip_info)(device_id, &mut info) })?;
        Ok(info)
    }

    /// `dsmi_get_device_ip_address` — returns `(ip, mask)`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn device_ip_address(
        &self,
        device_id: i32,
        port_type: i32,
        port_id: i32,
    ) -> RawResult<(DsmiIpAddr, DsmiIpAddr)> {
        let mut ip = DsmiIpAddr::default();
        let mut mask = DsmiIpAddr::default();
        // Safety: both out-buffers are valid ip_addr_t.
        check(unsafe {
            (self.get_device_ip_address)(device_id, port_type, port_id, &mut ip, &mut mask)
        })?;
        Ok((ip, mask))
    }

    /// `dsmi_get_vdevice_info`.
    ///
    /// # Errors
    ///
    /// Returns the raw vendor code on failure.
    pub fn vdevice_info(&self, logic_id: u32) -> RawResult<DsmiVdevInfo> {
        let mut info = DsmiVdevInfo::default();
        // Safety: info is a valid dsmi_vdev_info buffer.
        check(unsafe { (self.get_vdevice_info)(logic_id, &mut info) })?;
        Ok(info)
    }

    /// Probe the standard install locations for `libdcmi.so`.
    fn find_library() -> Result<PathBuf, LoadError> {
        let candidates = [
            "/usr/local/dcmi/libdcmi.so",
            "/usr/local/Ascend/driver/lib64/libdcmi.so",
            "/usr/local/Ascend/driver/lib64/driver/libdcmi.so",
            "/usr/lib64/libdcmi.so",
            "/usr/lib/libdcmi.so",
        ];

        for candidate in candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                debug!(path = %path.display(), "found libdcmi.so");
                return Ok(path);
            }
        }

        Err(LoadError::NotFound {
            searched: candidates.len(),
        })
    }
}
