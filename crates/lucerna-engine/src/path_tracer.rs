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

//! Per-run render parameters derived from the configuration on every start.

use crate::cache::PhotonGiCache;
use lucerna_core::config::Properties;
use lucerna_core::error::ConfigError;
use lucerna_core::filter::PixelFilter;
use std::sync::Arc;

/// Path depth limits and radiance clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathTracerOptions {
    /// Maximum total path depth.
    pub max_total_depth: u32,
    /// Maximum number of diffuse bounces.
    pub max_diffuse_depth: u32,
    /// Maximum number of glossy bounces.
    pub max_glossy_depth: u32,
    /// Maximum number of specular bounces.
    pub max_specular_depth: u32,
    /// Depth at which russian roulette starts.
    pub russian_roulette_depth: u32,
    /// Minimum survival probability of russian roulette.
    pub russian_roulette_cap: f32,
    /// Maximum sample luminance, `0` disables clamping.
    pub clamp_max_value: f32,
    /// Whether escaped rays count as black background instead of transparent.
    pub force_black_background: bool,
}

impl Default for PathTracerOptions {
    fn default() -> Self {
        Self {
            max_total_depth: 6,
            max_diffuse_depth: 4,
            max_glossy_depth: 4,
            max_specular_depth: 6,
            russian_roulette_depth: 3,
            russian_roulette_cap: 0.5,
            clamp_max_value: 0.0,
            force_black_background: false,
        }
    }
}

impl PathTracerOptions {
    /// Reads the `path.*` properties.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let options = Self {
            max_total_depth: props.get_u32("path.pathdepth.total", defaults.max_total_depth)?,
            max_diffuse_depth: props.get_u32("path.pathdepth.diffuse", defaults.max_diffuse_depth)?,
            max_glossy_depth: props.get_u32("path.pathdepth.glossy", defaults.max_glossy_depth)?,
            max_specular_depth: props
                .get_u32("path.pathdepth.specular", defaults.max_specular_depth)?,
            russian_roulette_depth: props
                .get_u32("path.russianroulette.depth", defaults.russian_roulette_depth)?,
            russian_roulette_cap: props
                .get_f32("path.russianroulette.cap", defaults.russian_roulette_cap)?,
            clamp_max_value: props
                .get_f32("path.clamping.variance.maxvalue", defaults.clamp_max_value)?,
            force_black_background: props.get_bool(
                "path.forceblackbackground.enable",
                defaults.force_black_background,
            )?,
        };

        if !(0.0..=1.0).contains(&options.russian_roulette_cap) {
            return Err(ConfigError::Malformed {
                key: "path.russianroulette.cap".to_string(),
                value: options.russian_roulette_cap.to_string(),
                expected: "a probability in [0, 1]",
            });
        }
        if options.clamp_max_value < 0.0 {
            return Err(ConfigError::Malformed {
                key: "path.clamping.variance.maxvalue".to_string(),
                value: options.clamp_max_value.to_string(),
                expected: "a non-negative number",
            });
        }
        Ok(options)
    }

    /// Number of specular bounces a camera path may follow.
    pub fn specular_bounce_limit(&self) -> u32 {
        self.max_specular_depth.min(self.max_total_depth)
    }
}

const FILTER_TABLE_SIZE: usize = 32;

/// Tabulated pixel filter used to importance sample sample offsets.
#[derive(Debug, Clone)]
pub struct PixelFilterDistribution {
    width: f32,
    marginal_cdf: Vec<f32>,
    conditional_cdfs: Vec<Vec<f32>>,
}

impl PixelFilterDistribution {
    /// Tabulates `|filter|` over its support.
    pub fn new(filter: &dyn PixelFilter) -> Self {
        let width = filter.width();
        let cell = 2.0 * width / FILTER_TABLE_SIZE as f32;
        let center = |i: usize| -width + (i as f32 + 0.5) * cell;

        let mut row_sums = Vec::with_capacity(FILTER_TABLE_SIZE);
        let mut conditional_cdfs = Vec::with_capacity(FILTER_TABLE_SIZE);
        for row in 0..FILTER_TABLE_SIZE {
            let values: Vec<f32> = (0..FILTER_TABLE_SIZE)
                .map(|col| filter.evaluate(center(col), center(row)).abs())
                .collect();
            row_sums.push(values.iter().sum());
            conditional_cdfs.push(cdf(&values));
        }

        Self {
            width,
            marginal_cdf: cdf(&row_sums),
            conditional_cdfs,
        }
    }

    /// Filter radius in pixels.
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Maps two uniform numbers to an offset `(dx, dy)` from the pixel center.
    pub fn sample(&self, u: f32, v: f32) -> (f32, f32) {
        let (row, fy) = sample_cdf(&self.marginal_cdf, v);
        let (col, fx) = sample_cdf(&self.conditional_cdfs[row], u);
        let scale = 2.0 * self.width / FILTER_TABLE_SIZE as f32;
        (
            -self.width + (col as f32 + fx) * scale,
            -self.width + (row as f32 + fy) * scale,
        )
    }
}

/// Normalized cumulative distribution with a leading zero. A table summing to zero
/// becomes uniform.
fn cdf(values: &[f32]) -> Vec<f32> {
    let total: f32 = values.iter().sum();
    let mut result = Vec::with_capacity(values.len() + 1);
    result.push(0.0);
    let mut running = 0.0;
    for (i, value) in values.iter().enumerate() {
        running += if total > 0.0 { value / total } else { 1.0 / values.len() as f32 };
        result.push(if i + 1 == values.len() { 1.0 } else { running });
    }
    result
}

/// Returns the bucket containing `u` and the position of `u` inside it.
fn sample_cdf(cdf: &[f32], u: f32) -> (usize, f32) {
    let buckets = cdf.len() - 1;
    let index = cdf.partition_point(|&c| c <= u).saturating_sub(1).min(buckets - 1);
    let width = cdf[index + 1] - cdf[index];
    let fraction = if width > 0.0 { (u - cdf[index]) / width } else { 0.5 };
    (index, fraction.clamp(0.0, 1.0))
}

/// Everything the render workers share for one run.
#[derive(Debug)]
pub struct PathTracer {
    options: PathTracerOptions,
    filter_distribution: PixelFilterDistribution,
    cache: Option<Arc<PhotonGiCache>>,
}

impl PathTracer {
    /// Bundles the per-run parameters with the (preprocessed) photon cache.
    pub fn new(
        options: PathTracerOptions,
        filter_distribution: PixelFilterDistribution,
        cache: Option<PhotonGiCache>,
    ) -> Self {
        Self {
            options,
            filter_distribution,
            cache: cache.map(Arc::new),
        }
    }

    /// The path options.
    pub fn options(&self) -> &PathTracerOptions {
        &self.options
    }

    /// The pixel filter distribution.
    pub fn filter_distribution(&self) -> &PixelFilterDistribution {
        &self.filter_distribution
    }

    /// The photon cache, if any.
    pub fn cache(&self) -> Option<&PhotonGiCache> {
        self.cache.as_deref()
    }

    /// Releases the filter distribution and hands back the cache.
    ///
    /// Returns `None` for the cache if it was not built or is still shared.
    pub fn release(self) -> Option<PhotonGiCache> {
        let Self {
            options: _,
            filter_distribution,
            cache,
        } = self;
        drop(filter_distribution);

        let cache = cache?;
        match Arc::try_unwrap(cache) {
            Ok(cache) => Some(cache),
            Err(_) => {
                log::error!("Photon GI cache is still shared after the render threads stopped");
                None
            }
        }
    }
}
