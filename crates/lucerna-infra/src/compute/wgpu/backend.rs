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

use super::device::WgpuComputeDevice;
use lucerna_core::device::{
    ComputeBackend, ComputeDevice, ComputeDeviceClass, ComputeDeviceDescriptor, FeatureVersion,
};
use lucerna_core::error::DeviceError;
use wgpu::{Adapter, Backend, Backends, DeviceType, Instance, InstanceDescriptor, ShaderModel};

/// Shader model 5 is the level the film kernels are written against.
const MINIMUM_FEATURE_VERSION: FeatureVersion = FeatureVersion::new(5, 0);

/// Lists and opens wgpu adapters.
#[derive(Debug)]
pub struct WgpuComputeBackend {
    instance: Instance,
    backends: Backends,
}

impl WgpuComputeBackend {
    /// Creates a backend over every wgpu backend available on this platform.
    pub fn new() -> Self {
        Self::with_backends(Backends::all())
    }

    /// Creates a backend restricted to `backends`.
    pub fn with_backends(backends: Backends) -> Self {
        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });
        Self { instance, backends }
    }

    fn adapters(&self) -> Vec<Adapter> {
        self.instance.enumerate_adapters(self.backends)
    }

    /// Maps a wgpu backend to a stable platform index.
    pub(crate) fn platform_index(backend: Backend) -> usize {
        match backend {
            Backend::Vulkan => 0,
            Backend::Metal => 1,
            Backend::Dx12 => 2,
            Backend::Gl => 3,
            Backend::BrowserWebGpu => 4,
            _ => 5,
        }
    }

    /// Converts a wgpu adapter type to a device class.
    pub(crate) fn device_class(device_type: DeviceType) -> ComputeDeviceClass {
        match device_type {
            DeviceType::IntegratedGpu | DeviceType::DiscreteGpu | DeviceType::VirtualGpu => {
                ComputeDeviceClass::Gpu
            }
            DeviceType::Cpu => ComputeDeviceClass::Cpu,
            DeviceType::Other => ComputeDeviceClass::Accelerator,
        }
    }

    /// Converts the adapter shader model to a feature version.
    pub(crate) fn feature_version(shader_model: ShaderModel) -> FeatureVersion {
        match shader_model {
            ShaderModel::Sm2 => FeatureVersion::new(2, 0),
            ShaderModel::Sm4 => FeatureVersion::new(4, 0),
            ShaderModel::Sm5 => FeatureVersion::new(5, 0),
        }
    }

    fn describe(device_index: usize, adapter: &Adapter) -> ComputeDeviceDescriptor {
        let info = adapter.get_info();
        ComputeDeviceDescriptor {
            platform_index: Self::platform_index(info.backend),
            device_index,
            name: info.name,
            class: Self::device_class(info.device_type),
            feature_version: Self::feature_version(
                adapter.get_downlevel_capabilities().shader_model,
            ),
        }
    }
}

impl Default for WgpuComputeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for WgpuComputeBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn enumerate_devices(&self) -> Result<Vec<ComputeDeviceDescriptor>, DeviceError> {
        let devices: Vec<_> = self
            .adapters()
            .iter()
            .enumerate()
            .map(|(index, adapter)| Self::describe(index, adapter))
            .collect();
        log::debug!("wgpu reported {} adapter(s)", devices.len());
        for device in &devices {
            log::trace!(
                "  #{} \"{}\" platform {} {:?} SM {}",
                device.device_index,
                device.name,
                device.platform_index,
                device.class,
                device.feature_version
            );
        }
        Ok(devices)
    }

    fn open_device(
        &self,
        descriptor: &ComputeDeviceDescriptor,
    ) -> Result<Box<dyn ComputeDevice>, DeviceError> {
        // Adapters are re-enumerated: the descriptor only carries the enumeration index.
        let adapter = self
            .adapters()
            .into_iter()
            .nth(descriptor.device_index)
            .filter(|adapter| adapter.get_info().name == descriptor.name)
            .ok_or_else(|| DeviceError::Allocation {
                device: descriptor.name.clone(),
                reason: "adapter is no longer reported by wgpu".to_string(),
            })?;

        let device = WgpuComputeDevice::open(descriptor.clone(), &adapter).map_err(|e| {
            DeviceError::Allocation {
                device: descriptor.name.clone(),
                reason: format!("{e:#}"),
            }
        })?;
        log::info!(
            "✓ Opened film compute device \"{}\" ({:?})",
            descriptor.name,
            adapter.get_info().backend
        );
        Ok(Box::new(device))
    }

    fn minimum_feature_version(&self) -> FeatureVersion {
        MINIMUM_FEATURE_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_to_class() {
        assert_eq!(
            WgpuComputeBackend::device_class(DeviceType::DiscreteGpu),
            ComputeDeviceClass::Gpu
        );
        assert_eq!(
            WgpuComputeBackend::device_class(DeviceType::IntegratedGpu),
            ComputeDeviceClass::Gpu
        );
        assert_eq!(
            WgpuComputeBackend::device_class(DeviceType::Cpu),
            ComputeDeviceClass::Cpu
        );
        assert_eq!(
            WgpuComputeBackend::device_class(DeviceType::Other),
            ComputeDeviceClass::Accelerator
        );
    }

    #[test]
    fn test_shader_model_to_feature_version() {
        assert!(
            WgpuComputeBackend::feature_version(ShaderModel::Sm4) < MINIMUM_FEATURE_VERSION
        );
        assert_eq!(
            WgpuComputeBackend::feature_version(ShaderModel::Sm5),
            MINIMUM_FEATURE_VERSION
        );
    }

    #[test]
    fn test_platform_indices_are_distinct() {
        let indices = [
            Backend::Vulkan,
            Backend::Metal,
            Backend::Dx12,
            Backend::Gl,
            Backend::BrowserWebGpu,
        ]
        .map(WgpuComputeBackend::platform_index);
        for (i, a) in indices.iter().enumerate() {
            assert!(indices[i + 1..].iter().all(|b| b != a));
        }
    }

    #[test]
    fn test_enumeration_indices_follow_order_or_skip() {
        // Requires a wgpu runtime; an empty list is a valid outcome on headless CI.
        let backend = WgpuComputeBackend::new();
        let devices = backend.enumerate_devices().unwrap();
        for (index, device) in devices.iter().enumerate() {
            assert_eq!(device.device_index, index);
        }
    }
}
