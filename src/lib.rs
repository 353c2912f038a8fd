//! Discovery of MIG (Multi-Instance GPU) partitions through NVML.
//!
//! The crate enumerates the physical GPUs on the host, filters to those with
//! MIG mode enabled, walks their MIG sub-device slots, and returns one
//! [`MigPartitionRecord`] per partition, keyed by the partition's UUID.
//!
//! The enumeration itself is written against the [`DeviceManagement`]
//! capability trait so it can run against a mock without NVIDIA hardware;
//! [`nvml::NvmlSession`] is the real NVML-backed implementation.

pub mod discovery;
pub mod error;
pub mod logging;
pub mod nvml;

pub use discovery::{discover_mig_partitions, DeviceManagement, MigPartitionRecord};
pub use error::DiscoveryError;
