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

//! The accumulation target for rendered samples.
//!
//! The render engine only declares channels and the radiance group count and
//! then lets its workers add samples. [`MemoryFilm`] is a plain in-memory
//! implementation, enough for tests, checkpoints and GPU staging.

use crate::scene::Spectrum;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A per-pixel output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilmChannel {
    /// Radiance accumulated per radiance group, normalized by the pixel weight.
    RadiancePerPixelNormalized,
    /// Alpha coverage.
    Alpha,
}

/// Pixel layout of an exported film image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilmOutputFormat {
    /// Tone-mapped 8-bit RGB.
    Rgb8,
    /// Linear 32-bit float RGBA.
    RgbaF32,
}

impl FilmOutputFormat {
    /// Size of one pixel in bytes.
    pub fn bytes_per_pixel(self) -> u64 {
        match self {
            FilmOutputFormat::Rgb8 => 3,
            FilmOutputFormat::RgbaF32 => 16,
        }
    }
}

/// A film shared between the engine and its worker threads.
pub trait Film: Send + Sync {
    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Declares a channel. Declaring the same channel twice has no effect.
    fn add_channel(&self, channel: FilmChannel);

    /// Sets the number of radiance groups (at least one).
    fn set_radiance_group_count(&self, count: u32);

    /// Allocates the declared channels, discarding any previous content.
    fn init(&self);

    /// Adds one weighted sample to pixel `(x, y)`. `radiance` holds one value per
    /// radiance group; groups beyond the film's count are ignored.
    fn add_sample(&self, x: u32, y: u32, radiance: &[Spectrum], alpha: f32, weight: f32);
}

#[derive(Debug, Default)]
struct FilmBuffers {
    channels: Vec<FilmChannel>,
    group_count: u32,
    initialized: bool,
    // Per group: rgb sum and weight sum per pixel.
    radiance: Vec<Vec<[f32; 4]>>,
    alpha: Vec<[f32; 2]>,
    sample_count: u64,
}

/// An in-memory [`Film`].
#[derive(Debug)]
pub struct MemoryFilm {
    width: u32,
    height: u32,
    buffers: Mutex<FilmBuffers>,
}

impl MemoryFilm {
    /// Creates a film of the given size with no channels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            buffers: Mutex::new(FilmBuffers {
                group_count: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FilmBuffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Declared channels, in declaration order.
    pub fn channels(&self) -> Vec<FilmChannel> {
        self.lock().channels.clone()
    }

    /// Number of radiance groups.
    pub fn radiance_group_count(&self) -> u32 {
        self.lock().group_count
    }

    /// Whether [`Film::init`] has been called.
    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Number of pixel samples added since the last `init`, all groups together.
    pub fn sample_count(&self) -> u64 {
        self.lock().sample_count
    }

    /// The normalized radiance of a pixel, summed over all groups.
    pub fn pixel_radiance(&self, x: u32, y: u32) -> Spectrum {
        let buffers = self.lock();
        let index = (y * self.width + x) as usize;
        buffers
            .radiance
            .iter()
            .filter_map(|group| group.get(index))
            .filter(|px| px[3] > 0.0)
            .map(|px| Spectrum::new(px[0], px[1], px[2]) / px[3])
            .sum()
    }

    /// Linear RGBA float pixels, row-major.
    pub fn to_rgba_f32(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.pixel_count() * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                let rgb = self.pixel_radiance(x, y);
                let alpha = {
                    let buffers = self.lock();
                    let index = (y * self.width + x) as usize;
                    buffers
                        .alpha
                        .get(index)
                        .filter(|a| a[1] > 0.0)
                        .map_or(1.0, |a| a[0] / a[1])
                };
                out.extend_from_slice(&[rgb.x, rgb.y, rgb.z, alpha]);
            }
        }
        out
    }

    /// Tone-mapped 8-bit RGB pixels, row-major (linear scale, gamma 2.2).
    pub fn to_rgb8(&self, scale: f32) -> Vec<u8> {
        let encode = |v: f32| -> u8 {
            ((v * scale).max(0.0).powf(1.0 / 2.2).min(1.0) * 255.0).round() as u8
        };
        let mut out = Vec::with_capacity(self.pixel_count() * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                let rgb = self.pixel_radiance(x, y);
                out.extend_from_slice(&[encode(rgb.x), encode(rgb.y), encode(rgb.z)]);
            }
        }
        out
    }
}

impl Film for MemoryFilm {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn add_channel(&self, channel: FilmChannel) {
        let mut buffers = self.lock();
        if !buffers.channels.contains(&channel) {
            buffers.channels.push(channel);
        }
    }

    fn set_radiance_group_count(&self, count: u32) {
        self.lock().group_count = count.max(1);
    }

    fn init(&self) {
        let pixels = self.pixel_count();
        let mut buffers = self.lock();
        let groups = buffers.group_count as usize;
        buffers.radiance = if buffers.channels.contains(&FilmChannel::RadiancePerPixelNormalized) {
            vec![vec![[0.0; 4]; pixels]; groups]
        } else {
            Vec::new()
        };
        buffers.alpha = if buffers.channels.contains(&FilmChannel::Alpha) {
            vec![[0.0; 2]; pixels]
        } else {
            Vec::new()
        };
        buffers.sample_count = 0;
        buffers.initialized = true;
    }

    fn add_sample(&self, x: u32, y: u32, radiance: &[Spectrum], alpha: f32, weight: f32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = (y * self.width + x) as usize;
        let mut buffers = self.lock();
        if !buffers.initialized {
            return;
        }
        for (group, value) in buffers.radiance.iter_mut().zip(radiance) {
            let px = &mut group[index];
            px[0] += value.x * weight;
            px[1] += value.y * weight;
            px[2] += value.z * weight;
            px[3] += weight;
        }
        if let Some(a) = buffers.alpha.get_mut(index) {
            a[0] += alpha * weight;
            a[1] += weight;
        }
        buffers.sample_count += 1;
    }
}
