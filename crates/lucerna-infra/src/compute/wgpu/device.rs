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

use anyhow::{Context, Result};
use lucerna_core::device::{BufferId, ComputeDevice, ComputeDeviceDescriptor};
use lucerna_core::error::DeviceError;
use std::collections::HashMap;

/// A wgpu logical device with its queue and the buffers allocated on it.
#[derive(Debug)]
pub struct WgpuComputeDevice {
    descriptor: ComputeDeviceDescriptor,
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    next_buffer: BufferId,
    data_parallel: bool,
    released: bool,
}

impl WgpuComputeDevice {
    /// Requests a logical device and queue from `adapter`.
    pub fn open(descriptor: ComputeDeviceDescriptor, adapter: &wgpu::Adapter) -> Result<Self> {
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Lucerna Film Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::Off,
        }))
        .with_context(|| format!("Failed to create logical device on \"{}\"", descriptor.name))?;

        device.on_uncaptured_error(Box::new(|e| {
            log::error!("WGPU Uncaptured Error: {e:?}");
        }));

        Ok(Self {
            descriptor,
            device,
            queue,
            buffers: HashMap::new(),
            next_buffer: 1,
            data_parallel: true,
            released: false,
        })
    }
}

/// Rounds `size` up to the copy alignment wgpu requires.
fn aligned(size: u64) -> u64 {
    size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

impl ComputeDevice for WgpuComputeDevice {
    fn descriptor(&self) -> &ComputeDeviceDescriptor {
        &self.descriptor
    }

    fn set_data_parallel_support(&mut self, enabled: bool) {
        self.data_parallel = enabled;
    }

    fn data_parallel_support(&self) -> bool {
        self.data_parallel
    }

    fn create_buffer(&mut self, label: &str, size: u64) -> Result<BufferId, DeviceError> {
        let max = self.device.limits().max_buffer_size;
        let size = aligned(size.max(1));
        if size > max {
            return Err(DeviceError::Buffer {
                label: label.to_string(),
                reason: format!("{size} bytes exceeds the device limit of {max}"),
            });
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let id = self.next_buffer;
        self.next_buffer += 1;
        self.buffers.insert(id, buffer);
        log::trace!("Allocated buffer {id} ({label}, {size} bytes)");
        Ok(id)
    }

    fn write_buffer(&mut self, id: BufferId, data: &[u8]) -> Result<(), DeviceError> {
        let buffer = self.buffers.get(&id).ok_or(DeviceError::InvalidBuffer(id))?;
        let padded_len = aligned(data.len() as u64);
        if padded_len > buffer.size() {
            return Err(DeviceError::Buffer {
                label: format!("#{id}"),
                reason: format!("{} bytes do not fit in {} bytes", data.len(), buffer.size()),
            });
        }
        if padded_len == data.len() as u64 {
            self.queue.write_buffer(buffer, 0, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(padded_len as usize, 0);
            self.queue.write_buffer(buffer, 0, &padded);
        }
        self.queue.submit(std::iter::empty());
        Ok(())
    }

    fn free_buffer(&mut self, id: BufferId) -> Result<(), DeviceError> {
        let buffer = self.buffers.remove(&id).ok_or(DeviceError::InvalidBuffer(id))?;
        buffer.destroy();
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy();
        }
        self.device.destroy();
        self.released = true;
    }
}

impl Drop for WgpuComputeDevice {
    fn drop(&mut self) {
        self.release();
    }
}
