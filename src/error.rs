use derive_more::Display;
use nvml_wrapper::error::NvmlError;
use thiserror::Error;

/// Which per-device NVML call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DeviceQuery {
    #[display("resolve handle")]
    Handle,
    #[display("query MIG mode")]
    MigMode,
    #[display("query UUID")]
    Uuid,
    #[display("query max MIG device count")]
    MaxMigDeviceCount,
}

/// Which per-MIG-slot NVML call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MigQuery {
    #[display("resolve handle")]
    Handle,
    #[display("query UUID")]
    Uuid,
    #[display("query GPU instance id")]
    GpuInstanceId,
}

/// Errors produced by MIG partition discovery.
///
/// Every variant aborts the whole discovery call; there is no retry and no
/// partial result. The only non-error outcomes that skip work are MIG mode
/// being disabled on a device and `NOT_FOUND` on a MIG slot, both handled
/// inside the enumerator.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The NVML library could not be loaded or `nvmlInit` failed.
    #[error("unable to initialize NVML")]
    Init(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The physical device count could not be retrieved.
    #[error("unable to get device count")]
    DeviceCount(#[source] NvmlError),

    /// A query against a physical device failed.
    #[error("unable to {stage} for device at index {index}")]
    Device {
        stage: DeviceQuery,
        index: u32,
        #[source]
        source: NvmlError,
    },

    /// A query against a MIG sub-device failed.
    #[error("unable to {stage} for MIG device at mig index {mig_index} on device at index {parent_index}")]
    MigDevice {
        stage: MigQuery,
        parent_index: u32,
        mig_index: u32,
        #[source]
        source: NvmlError,
    },
}
