//! NVML-backed implementation of [`DeviceManagement`].
//!
//! The high-level `nvml-wrapper` crate does not expose the MIG enumeration
//! entry points, so this module drives the dynamically loaded
//! `nvml-wrapper-sys` bindings directly and maps every status code through
//! `nvml_try`, the same conversion the wrapper uses internally.

use std::env;
use std::ffi::{CStr, OsStr, OsString};
use std::os::raw::{c_char, c_uint};
use std::ptr;

use nvml_wrapper::error::{nvml_try, NvmlError};
use nvml_wrapper_sys::bindings::{
    nvmlDevice_t, NvmlLib, NVML_DEVICE_MIG_DISABLE, NVML_DEVICE_UUID_V2_BUFFER_SIZE,
};

use crate::discovery::DeviceManagement;
use crate::error::DiscoveryError;

/// Overrides the NVML shared library path when set.
pub const NVML_LIB_PATH_ENV_VAR: &str = "MIG_DISCOVERY_NVML_LIB_PATH";

const PRIMARY_NVML_LIB: &str = "libnvidia-ml.so.1";
const FALLBACK_NVML_LIB: &str = "libnvidia-ml.so";

/// An initialized NVML session.
///
/// Holds the loaded library for its lifetime and calls `nvmlShutdown` on
/// drop, so the session is released on every exit path of a discovery call.
pub struct NvmlSession {
    lib: NvmlLib,
}

impl NvmlSession {
    /// Load the NVML shared library and initialize it.
    ///
    /// Candidates are tried in order: the [`NVML_LIB_PATH_ENV_VAR`] override
    /// if set, then the versioned soname, then the unversioned one. The last
    /// failure is returned when no candidate works.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::Init`] when the library cannot be loaded (driver or
    /// library missing) or `nvmlInit` fails (no compatible driver, no
    /// permission).
    pub fn init() -> Result<Self, DiscoveryError> {
        let mut last_err: Option<DiscoveryError> = None;

        for candidate in library_candidates() {
            let candidate_display = candidate.to_string_lossy().into_owned();
            tracing::info!("Loading NVML library from {candidate_display}");
            match Self::load(candidate.as_os_str()) {
                Ok(session) => return Ok(session),
                Err(err) => {
                    tracing::warn!(error = ?err, "Failed to load {candidate_display}");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| DiscoveryError::Init(Box::new(NvmlError::Unknown))))
    }

    fn load(path: &OsStr) -> Result<Self, DiscoveryError> {
        let lib =
            unsafe { NvmlLib::new(path) }.map_err(|err| DiscoveryError::Init(Box::new(err)))?;
        nvml_try(unsafe { lib.nvmlInit_v2() })
            .map_err(|err| DiscoveryError::Init(Box::new(err)))?;
        Ok(Self { lib })
    }
}

impl Drop for NvmlSession {
    fn drop(&mut self) {
        if let Err(err) = nvml_try(unsafe { self.lib.nvmlShutdown() }) {
            tracing::warn!(error = %err, "NVML shutdown failed");
        }
    }
}

fn library_candidates() -> Vec<OsString> {
    let mut candidates: Vec<OsString> = Vec::with_capacity(3);

    if let Some(path) = env::var_os(NVML_LIB_PATH_ENV_VAR) {
        candidates.push(path);
    }

    candidates.push(OsStr::new(PRIMARY_NVML_LIB).to_os_string());
    candidates.push(OsStr::new(FALLBACK_NVML_LIB).to_os_string());

    candidates
}

impl DeviceManagement for NvmlSession {
    type Handle = nvmlDevice_t;

    fn device_count(&self) -> Result<u32, NvmlError> {
        let mut count: c_uint = 0;
        nvml_try(unsafe { self.lib.nvmlDeviceGetCount_v2(&mut count) })?;
        Ok(count)
    }

    fn device_by_index(&self, index: u32) -> Result<Self::Handle, NvmlError> {
        let mut device: nvmlDevice_t = ptr::null_mut();
        nvml_try(unsafe { self.lib.nvmlDeviceGetHandleByIndex_v2(index, &mut device) })?;
        Ok(device)
    }

    fn mig_mode_enabled(&self, device: Self::Handle) -> Result<bool, NvmlError> {
        let mut current: c_uint = 0;
        let mut pending: c_uint = 0;
        nvml_try(unsafe { self.lib.nvmlDeviceGetMigMode(device, &mut current, &mut pending) })?;
        Ok(current != NVML_DEVICE_MIG_DISABLE)
    }

    fn uuid(&self, device: Self::Handle) -> Result<String, NvmlError> {
        let mut buf = [0 as c_char; NVML_DEVICE_UUID_V2_BUFFER_SIZE as usize];
        nvml_try(unsafe {
            self.lib
                .nvmlDeviceGetUUID(device, buf.as_mut_ptr(), NVML_DEVICE_UUID_V2_BUFFER_SIZE)
        })?;
        let uuid = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(uuid.to_string_lossy().into_owned())
    }

    fn max_mig_device_count(&self, device: Self::Handle) -> Result<u32, NvmlError> {
        let mut count: c_uint = 0;
        nvml_try(unsafe { self.lib.nvmlDeviceGetMaxMigDeviceCount(device, &mut count) })?;
        Ok(count)
    }

    fn mig_device_by_index(
        &self,
        device: Self::Handle,
        mig_index: u32,
    ) -> Result<Self::Handle, NvmlError> {
        let mut mig_device: nvmlDevice_t = ptr::null_mut();
        nvml_try(unsafe {
            self.lib
                .nvmlDeviceGetMigDeviceHandleByIndex(device, mig_index, &mut mig_device)
        })?;
        Ok(mig_device)
    }

    fn gpu_instance_id(&self, mig_device: Self::Handle) -> Result<u32, NvmlError> {
        let mut instance_id: c_uint = 0;
        nvml_try(unsafe { self.lib.nvmlDeviceGetGpuInstanceId(mig_device, &mut instance_id) })?;
        Ok(instance_id)
    }
}
