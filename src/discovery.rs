use std::collections::HashMap;

use nvml_wrapper::error::NvmlError;
use serde::Serialize;

use crate::error::{DeviceQuery, DiscoveryError, MigQuery};
use crate::nvml::NvmlSession;

/// One discovered MIG partition and its relationship to the physical GPU
/// hosting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigPartitionRecord {
    /// UUID of the physical GPU hosting this partition.
    pub parent_identity: String,
    /// Enumeration index of the physical GPU. Not stable across reboots or
    /// driver updates.
    pub parent_index: u32,
    /// UUID of the MIG sub-device itself; also the record's key in the
    /// result mapping.
    pub partition_identity: String,
    /// GPU instance id assigned by NVML to this partition.
    pub instance_id: u32,
    /// Index of this sub-device within its parent's MIG device list.
    pub partition_index: u32,
}

/// Capability surface of the GPU management interface needed for MIG
/// discovery.
///
/// [`NvmlSession`] implements this over the real NVML library; tests
/// implement it with scripted fakes. Handles for physical devices and MIG
/// sub-devices share one associated type because NVML represents both with
/// the same handle kind (a MIG handle answers the same UUID query as its
/// parent).
pub trait DeviceManagement {
    type Handle: Copy;

    fn device_count(&self) -> Result<u32, NvmlError>;
    fn device_by_index(&self, index: u32) -> Result<Self::Handle, NvmlError>;
    fn mig_mode_enabled(&self, device: Self::Handle) -> Result<bool, NvmlError>;
    fn uuid(&self, device: Self::Handle) -> Result<String, NvmlError>;
    fn max_mig_device_count(&self, device: Self::Handle) -> Result<u32, NvmlError>;
    /// Resolve the MIG sub-device at `mig_index`. Returns
    /// [`NvmlError::NotFound`] for a vacant slot.
    fn mig_device_by_index(
        &self,
        device: Self::Handle,
        mig_index: u32,
    ) -> Result<Self::Handle, NvmlError>;
    fn gpu_instance_id(&self, mig_device: Self::Handle) -> Result<u32, NvmlError>;
}

/// Discover all MIG partitions on this host.
///
/// Initializes an NVML session, enumerates every physical GPU, and returns
/// one record per MIG sub-device found, keyed by the sub-device UUID. The
/// session is shut down on every exit path, success or failure.
///
/// # Errors
///
/// - [`DiscoveryError::Init`] if NVML cannot be loaded or initialized
/// - any other [`DiscoveryError`] variant if a single hardware query fails;
///   no partial result is returned
pub fn discover_mig_partitions() -> Result<HashMap<String, MigPartitionRecord>, DiscoveryError> {
    let session = NvmlSession::init()?;
    discover_with(&session)
}

/// Run the enumeration against an already-acquired management interface.
pub fn discover_with<M: DeviceManagement>(
    mgmt: &M,
) -> Result<HashMap<String, MigPartitionRecord>, DiscoveryError> {
    let device_count = mgmt.device_count().map_err(DiscoveryError::DeviceCount)?;
    tracing::debug!("Enumerating {device_count} physical GPU device(s)");

    let mut partitions = HashMap::new();
    for parent_index in 0..device_count {
        let device = mgmt
            .device_by_index(parent_index)
            .map_err(|source| DiscoveryError::Device {
                stage: DeviceQuery::Handle,
                index: parent_index,
                source,
            })?;

        let mig_enabled = mgmt
            .mig_mode_enabled(device)
            .map_err(|source| DiscoveryError::Device {
                stage: DeviceQuery::MigMode,
                index: parent_index,
                source,
            })?;
        if !mig_enabled {
            tracing::debug!("Device {parent_index} has MIG disabled, skipping");
            continue;
        }

        let parent_identity = mgmt.uuid(device).map_err(|source| DiscoveryError::Device {
            stage: DeviceQuery::Uuid,
            index: parent_index,
            source,
        })?;

        let max_mig_count =
            mgmt.max_mig_device_count(device)
                .map_err(|source| DiscoveryError::Device {
                    stage: DeviceQuery::MaxMigDeviceCount,
                    index: parent_index,
                    source,
                })?;

        for partition_index in 0..max_mig_count {
            let mig_device = match mgmt.mig_device_by_index(device, partition_index) {
                Ok(handle) => handle,
                // MIG slots can be sparse after a partition is deleted
                Err(NvmlError::NotFound) => continue,
                Err(source) => {
                    return Err(DiscoveryError::MigDevice {
                        stage: MigQuery::Handle,
                        parent_index,
                        mig_index: partition_index,
                        source,
                    })
                }
            };

            let partition_identity =
                mgmt.uuid(mig_device)
                    .map_err(|source| DiscoveryError::MigDevice {
                        stage: MigQuery::Uuid,
                        parent_index,
                        mig_index: partition_index,
                        source,
                    })?;

            let instance_id =
                mgmt.gpu_instance_id(mig_device)
                    .map_err(|source| DiscoveryError::MigDevice {
                        stage: MigQuery::GpuInstanceId,
                        parent_index,
                        mig_index: partition_index,
                        source,
                    })?;

            tracing::debug!(
                "Device {parent_index}: found MIG partition {partition_identity} \
                 (instance id {instance_id}, mig index {partition_index})"
            );

            let record = MigPartitionRecord {
                parent_identity: parent_identity.clone(),
                parent_index,
                partition_identity: partition_identity.clone(),
                instance_id,
                partition_index,
            };
            if partitions.insert(partition_identity.clone(), record).is_some() {
                // NVML should never hand out the same MIG UUID twice;
                // last write wins if it somehow does
                tracing::warn!("Duplicate MIG device UUID {partition_identity}, keeping the latest record");
            }
        }
    }

    Ok(partitions)
}
