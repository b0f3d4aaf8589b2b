// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Compute-device abstraction used by the GPU-accelerated film stages.
//!
//! Devices are enumerated fresh from a [`ComputeBackend`] each time a context is
//! created; nothing here caches descriptors between runs. A concrete backend
//! (wgpu) lives in `lucerna-infra`; [`NullComputeBackend`] is the implementation
//! used when no GPU runtime is available, so callers keep a single code path.

mod context;
mod selector;

pub use context::{destroy_context, FilmDeviceContext};
pub use selector::{select_device, DeviceRequest, DeviceSelection};

use crate::error::DeviceError;
use std::fmt;

/// The broad class of a compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeDeviceClass {
    /// A discrete, integrated or virtual GPU.
    Gpu,
    /// A CPU exposed through the compute runtime.
    Cpu,
    /// Any other accelerator exposed through the compute runtime.
    Accelerator,
    /// A host thread device. Not usable for compute staging.
    Native,
}

impl ComputeDeviceClass {
    /// Whether the device is driven through a compute runtime.
    pub fn is_compute(self) -> bool {
        !matches!(self, ComputeDeviceClass::Native)
    }
}

/// A `major.minor` feature level reported by a device driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl FeatureVersion {
    /// Creates a new feature version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for FeatureVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Describes one device reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeDeviceDescriptor {
    /// Index of the platform (driver stack / API) exposing the device.
    pub platform_index: usize,
    /// Index of the device in enumeration order.
    pub device_index: usize,
    /// Human-readable device name.
    pub name: String,
    /// Device class.
    pub class: ComputeDeviceClass,
    /// Feature level reported by the driver. Some drivers under-report it.
    pub feature_version: FeatureVersion,
}

/// Opaque handle of a buffer allocated on a [`ComputeDevice`].
pub type BufferId = u64;

/// An opened device bound to its own context.
pub trait ComputeDevice: Send {
    /// The descriptor the device was opened from.
    fn descriptor(&self) -> &ComputeDeviceDescriptor;

    /// The device name.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Enables or disables hybrid (data-parallel) dispatch on this device.
    fn set_data_parallel_support(&mut self, enabled: bool);

    /// Whether hybrid (data-parallel) dispatch is enabled.
    fn data_parallel_support(&self) -> bool;

    /// Allocates a device buffer of `size` bytes.
    fn create_buffer(&mut self, label: &str, size: u64) -> Result<BufferId, DeviceError>;

    /// Copies `data` into the start of a buffer.
    fn write_buffer(&mut self, id: BufferId, data: &[u8]) -> Result<(), DeviceError>;

    /// Frees a buffer.
    fn free_buffer(&mut self, id: BufferId) -> Result<(), DeviceError>;

    /// Releases the device and its context. Further use is invalid.
    fn release(&mut self);
}

/// A host compute runtime able to list and open devices.
pub trait ComputeBackend {
    /// A short name for logs.
    fn name(&self) -> &str;

    /// Lists the devices currently exposed by the runtime.
    fn enumerate_devices(&self) -> Result<Vec<ComputeDeviceDescriptor>, DeviceError>;

    /// Opens one device and creates a context bound to it.
    fn open_device(
        &self,
        descriptor: &ComputeDeviceDescriptor,
    ) -> Result<Box<dyn ComputeDevice>, DeviceError>;

    /// The feature version below which a capability warning is emitted.
    fn minimum_feature_version(&self) -> FeatureVersion;
}

/// A backend exposing no devices at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullComputeBackend;

impl ComputeBackend for NullComputeBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn enumerate_devices(&self) -> Result<Vec<ComputeDeviceDescriptor>, DeviceError> {
        Ok(Vec::new())
    }

    fn open_device(
        &self,
        descriptor: &ComputeDeviceDescriptor,
    ) -> Result<Box<dyn ComputeDevice>, DeviceError> {
        Err(DeviceError::Allocation {
            device: descriptor.name.clone(),
            reason: "the null backend has no devices".to_string(),
        })
    }

    fn minimum_feature_version(&self) -> FeatureVersion {
        FeatureVersion::new(0, 0)
    }
}
