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

//! The film's single-purpose compute context.

use super::{select_device, BufferId, ComputeBackend, ComputeDevice, DeviceRequest, DeviceSelection};
use crate::error::DeviceError;
use crate::film::FilmOutputFormat;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct StagingBuffer {
    id: BufferId,
    size: u64,
}

/// Owns one opened compute device and the film's per-format staging buffers.
///
/// The context is created by the film output path and is independent of the
/// render worker pool. It is released by [`FilmDeviceContext::destroy`] or, on
/// any other exit path, when dropped.
pub struct FilmDeviceContext {
    device: Option<Box<dyn ComputeDevice>>,
    selection: DeviceSelection,
    staging: HashMap<FilmOutputFormat, StagingBuffer>,
}

impl FilmDeviceContext {
    /// Selects a device and opens a context bound to it.
    ///
    /// Returns `Ok(None)` when the backend exposes no suitable device. An
    /// allocation failure is returned as an error and nothing stays allocated.
    pub fn create(
        backend: &dyn ComputeBackend,
        request: &DeviceRequest,
    ) -> Result<Option<Self>, DeviceError> {
        let devices = backend.enumerate_devices()?;
        log::debug!(
            "{} backend reports {} compute device(s)",
            backend.name(),
            devices.len()
        );

        let Some(selection) = select_device(request, &devices) else {
            log::info!("No compute device available for the film, staging stays on the CPU");
            return Ok(None);
        };

        let mut device = backend.open_device(&selection.descriptor)?;
        log::info!("Film compute device used: {}", device.name());

        // Output staging only, never general intersection work.
        device.set_data_parallel_support(false);
        log::info!(
            "  Device feature version: {}",
            selection.descriptor.feature_version
        );

        Ok(Some(Self {
            device: Some(device),
            selection,
            staging: HashMap::new(),
        }))
    }

    /// The selection that produced this context.
    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }

    /// The opened device.
    pub fn device(&self) -> Option<&dyn ComputeDevice> {
        self.device.as_deref()
    }

    /// Allocates (or reallocates) the staging buffer used for `format`.
    pub fn allocate_staging(
        &mut self,
        format: FilmOutputFormat,
        pixel_count: u64,
    ) -> Result<(), DeviceError> {
        let size = pixel_count * format.bytes_per_pixel();
        if self.staging.get(&format).is_some_and(|buf| buf.size == size) {
            return Ok(());
        }
        let device = self.device_mut(format)?;
        let id = device.create_buffer(&format!("film staging {format:?}"), size)?;
        if let Some(old) = self.staging.insert(format, StagingBuffer { id, size }) {
            self.device_mut(format)?.free_buffer(old.id)?;
        }
        Ok(())
    }

    /// Uploads converted film output into the staging buffer of `format`.
    pub fn upload(&mut self, format: FilmOutputFormat, data: &[u8]) -> Result<(), DeviceError> {
        let buffer = *self
            .staging
            .get(&format)
            .ok_or(DeviceError::NoStagingBuffer(format))?;
        if data.len() as u64 > buffer.size {
            return Err(DeviceError::Buffer {
                label: format!("film staging {format:?}"),
                reason: format!("{} bytes do not fit in {} bytes", data.len(), buffer.size),
            });
        }
        self.device_mut(format)?.write_buffer(buffer.id, data)
    }

    /// Size in bytes of the staging buffer of `format`, if allocated.
    pub fn staging_size(&self, format: FilmOutputFormat) -> Option<u64> {
        self.staging.get(&format).map(|buf| buf.size)
    }

    /// Releases every staging buffer, the device and its context.
    pub fn destroy(mut self) {
        self.release();
    }

    fn device_mut(
        &mut self,
        format: FilmOutputFormat,
    ) -> Result<&mut (dyn ComputeDevice + 'static), DeviceError> {
        self.device
            .as_deref_mut()
            .ok_or(DeviceError::NoStagingBuffer(format))
    }

    fn release(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };
        for (format, buffer) in self.staging.drain() {
            if let Err(e) = device.free_buffer(buffer.id) {
                log::warn!("Failed to free {format:?} staging buffer: {e}");
            }
        }
        log::debug!("Releasing film compute device {}", device.name());
        device.release();
    }
}

impl Drop for FilmDeviceContext {
    fn drop(&mut self) {
        self.release();
    }
}

/// Destroys a context that may be absent. `None` is a no-op.
pub fn destroy_context(context: Option<FilmDeviceContext>) {
    if let Some(context) = context {
        context.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ComputeDeviceClass, ComputeDeviceDescriptor, FeatureVersion};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct DeviceLog {
        opened: usize,
        released: usize,
        live_buffers: usize,
        data_parallel: Option<bool>,
        written: Vec<u8>,
    }

    struct FakeDevice {
        descriptor: ComputeDeviceDescriptor,
        log: Arc<Mutex<DeviceLog>>,
        next_id: BufferId,
        data_parallel: bool,
    }

    impl ComputeDevice for FakeDevice {
        fn descriptor(&self) -> &ComputeDeviceDescriptor {
            &self.descriptor
        }
        fn set_data_parallel_support(&mut self, enabled: bool) {
            self.data_parallel = enabled;
            self.log.lock().unwrap().data_parallel = Some(enabled);
        }
        fn data_parallel_support(&self) -> bool {
            self.data_parallel
        }
        fn create_buffer(&mut self, _label: &str, _size: u64) -> Result<BufferId, DeviceError> {
            self.next_id += 1;
            self.log.lock().unwrap().live_buffers += 1;
            Ok(self.next_id)
        }
        fn write_buffer(&mut self, _id: BufferId, data: &[u8]) -> Result<(), DeviceError> {
            self.log.lock().unwrap().written = data.to_vec();
            Ok(())
        }
        fn free_buffer(&mut self, _id: BufferId) -> Result<(), DeviceError> {
            self.log.lock().unwrap().live_buffers -= 1;
            Ok(())
        }
        fn release(&mut self) {
            self.log.lock().unwrap().released += 1;
        }
    }

    struct FakeBackend {
        devices: Vec<ComputeDeviceDescriptor>,
        fail_open: bool,
        log: Arc<Mutex<DeviceLog>>,
    }

    impl FakeBackend {
        fn new(devices: Vec<ComputeDeviceDescriptor>) -> Self {
            Self {
                devices,
                fail_open: false,
                log: Arc::default(),
            }
        }
    }

    impl ComputeBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }
        fn enumerate_devices(&self) -> Result<Vec<ComputeDeviceDescriptor>, DeviceError> {
            Ok(self.devices.clone())
        }
        fn open_device(
            &self,
            descriptor: &ComputeDeviceDescriptor,
        ) -> Result<Box<dyn ComputeDevice>, DeviceError> {
            if self.fail_open {
                return Err(DeviceError::Allocation {
                    device: descriptor.name.clone(),
                    reason: "driver refused".to_string(),
                });
            }
            self.log.lock().unwrap().opened += 1;
            Ok(Box::new(FakeDevice {
                descriptor: descriptor.clone(),
                log: self.log.clone(),
                next_id: 0,
                data_parallel: true,
            }))
        }
        fn minimum_feature_version(&self) -> FeatureVersion {
            FeatureVersion::new(1, 1)
        }
    }

    fn gpu() -> ComputeDeviceDescriptor {
        ComputeDeviceDescriptor {
            platform_index: 0,
            device_index: 0,
            name: "Fake GPU".to_string(),
            class: ComputeDeviceClass::Gpu,
            feature_version: FeatureVersion::new(1, 2),
        }
    }

    #[test]
    fn test_create_opens_one_device_without_hybrid_mode() {
        let backend = FakeBackend::new(vec![gpu()]);
        let ctx = FilmDeviceContext::create(&backend, &DeviceRequest::any())
            .unwrap()
            .expect("a GPU is available");

        assert_eq!(ctx.device().unwrap().name(), "Fake GPU");
        assert!(!ctx.device().unwrap().data_parallel_support());
        let log = backend.log.lock().unwrap();
        assert_eq!(log.opened, 1);
        assert_eq!(log.data_parallel, Some(false));
    }

    #[test]
    fn test_create_without_devices_is_absent() {
        let backend = FakeBackend::new(Vec::new());
        let ctx = FilmDeviceContext::create(&backend, &DeviceRequest::any()).unwrap();
        assert!(ctx.is_none());
        destroy_context(ctx);
    }

    #[test]
    fn test_open_failure_propagates() {
        let mut backend = FakeBackend::new(vec![gpu()]);
        backend.fail_open = true;
        let result = FilmDeviceContext::create(&backend, &DeviceRequest::any());
        assert!(matches!(result, Err(DeviceError::Allocation { .. })));
        assert_eq!(backend.log.lock().unwrap().opened, 0);
    }

    #[test]
    fn test_staging_upload_and_destroy_releases_everything() {
        let backend = FakeBackend::new(vec![gpu()]);
        let mut ctx = FilmDeviceContext::create(&backend, &DeviceRequest::any())
            .unwrap()
            .unwrap();

        ctx.allocate_staging(FilmOutputFormat::Rgb8, 4).unwrap();
        assert_eq!(ctx.staging_size(FilmOutputFormat::Rgb8), Some(12));
        ctx.upload(FilmOutputFormat::Rgb8, &[7u8; 12]).unwrap();
        assert!(ctx.upload(FilmOutputFormat::Rgb8, &[0u8; 13]).is_err());
        assert!(matches!(
            ctx.upload(FilmOutputFormat::RgbaF32, &[0u8; 4]),
            Err(DeviceError::NoStagingBuffer(FilmOutputFormat::RgbaF32))
        ));

        destroy_context(Some(ctx));

        let log = backend.log.lock().unwrap();
        assert_eq!(log.written, vec![7u8; 12]);
        assert_eq!(log.live_buffers, 0);
        assert_eq!(log.released, 1);
    }

    #[test]
    fn test_drop_releases_device_once() {
        let backend = FakeBackend::new(vec![gpu()]);
        {
            let mut ctx = FilmDeviceContext::create(&backend, &DeviceRequest::any())
                .unwrap()
                .unwrap();
            ctx.allocate_staging(FilmOutputFormat::RgbaF32, 2).unwrap();
        }
        let log = backend.log.lock().unwrap();
        assert_eq!(log.released, 1);
        assert_eq!(log.live_buffers, 0);
    }
}
