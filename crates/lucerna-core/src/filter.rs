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

//! Pixel reconstruction filters.

use crate::config::Properties;
use crate::error::ConfigError;
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

/// A separable filter centered on the pixel, with support `[-width, width]` on each axis.
pub trait PixelFilter: Send + Sync + fmt::Debug {
    /// Filter radius in pixels.
    fn width(&self) -> f32;

    /// Filter weight at offset `(x, y)` from the pixel center. Zero outside the support.
    fn evaluate(&self, x: f32, y: f32) -> f32;
}

/// Constant weight inside the support.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxFilter {
    width: f32,
}

impl BoxFilter {
    /// Creates a box filter of radius `width`.
    pub fn new(width: f32) -> Self {
        Self { width }
    }
}

impl PixelFilter for BoxFilter {
    fn width(&self) -> f32 {
        self.width
    }

    fn evaluate(&self, x: f32, y: f32) -> f32 {
        if x.abs() <= self.width && y.abs() <= self.width {
            1.0
        } else {
            0.0
        }
    }
}

/// Truncated gaussian, shifted so it reaches zero at the support edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFilter {
    width: f32,
    alpha: f32,
    edge: f32,
}

impl GaussianFilter {
    /// Creates a gaussian filter of radius `width` and falloff `alpha`.
    pub fn new(width: f32, alpha: f32) -> Self {
        Self {
            width,
            alpha,
            edge: (-alpha * width * width).exp(),
        }
    }

    fn gaussian(&self, d: f32) -> f32 {
        ((-self.alpha * d * d).exp() - self.edge).max(0.0)
    }
}

impl PixelFilter for GaussianFilter {
    fn width(&self) -> f32 {
        self.width
    }

    fn evaluate(&self, x: f32, y: f32) -> f32 {
        if x.abs() > self.width || y.abs() > self.width {
            return 0.0;
        }
        self.gaussian(x) * self.gaussian(y)
    }
}

/// Four-term Blackman-Harris window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlackmanHarrisFilter {
    width: f32,
}

impl BlackmanHarrisFilter {
    /// Creates a Blackman-Harris filter of radius `width`.
    pub fn new(width: f32) -> Self {
        Self { width }
    }

    fn window(&self, d: f32) -> f32 {
        let t = 2.0 * PI * (d / (2.0 * self.width) + 0.5);
        0.35875 - 0.48829 * t.cos() + 0.14128 * (2.0 * t).cos() - 0.01168 * (3.0 * t).cos()
    }
}

impl PixelFilter for BlackmanHarrisFilter {
    fn width(&self) -> f32 {
        self.width
    }

    fn evaluate(&self, x: f32, y: f32) -> f32 {
        if x.abs() > self.width || y.abs() > self.width {
            return 0.0;
        }
        self.window(x) * self.window(y)
    }
}

/// Builds the filter named by `film.filter.type`.
///
/// `NONE` is a half-pixel box: every sample lands in the pixel it was drawn for.
pub fn pixel_filter_from_properties(
    props: &Properties,
) -> Result<Arc<dyn PixelFilter>, ConfigError> {
    let kind = props.get_string("film.filter.type", "BLACKMANHARRIS")?;
    let width = props.get_f32("film.filter.width", 1.5)?;
    if width <= 0.0 {
        return Err(ConfigError::Malformed {
            key: "film.filter.width".to_string(),
            value: width.to_string(),
            expected: "a positive radius",
        });
    }

    let filter: Arc<dyn PixelFilter> = match kind.as_str() {
        "NONE" => Arc::new(BoxFilter::new(0.5)),
        "BOX" => Arc::new(BoxFilter::new(width)),
        "GAUSSIAN" => Arc::new(GaussianFilter::new(
            width,
            props.get_f32("film.filter.gaussian.alpha", 2.0)?,
        )),
        "BLACKMANHARRIS" => Arc::new(BlackmanHarrisFilter::new(width)),
        _ => {
            return Err(ConfigError::UnknownValue {
                key: "film.filter.type".to_string(),
                value: kind,
                what: "pixel filter",
            })
        }
    };
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_filter_support() {
        let filter = BoxFilter::new(1.0);
        assert_eq!(filter.evaluate(0.9, -0.9), 1.0);
        assert_eq!(filter.evaluate(1.1, 0.0), 0.0);
    }

    #[test]
    fn test_gaussian_vanishes_at_the_edge() {
        let filter = GaussianFilter::new(1.5, 2.0);
        assert_relative_eq!(filter.evaluate(1.5, 0.0), 0.0, epsilon = 1e-6);
        assert!(filter.evaluate(0.0, 0.0) > filter.evaluate(0.5, 0.5));
    }

    #[test]
    fn test_blackman_harris_peaks_at_center() {
        let filter = BlackmanHarrisFilter::new(1.5);
        assert_relative_eq!(filter.evaluate(0.0, 0.0), 1.0, epsilon = 1e-4);
        assert!(filter.evaluate(1.4, 0.0) < 0.01);
        assert_eq!(filter.evaluate(2.0, 0.0), 0.0);
    }

    #[test]
    fn test_default_filter_is_blackman_harris() {
        let filter = pixel_filter_from_properties(&Properties::new()).unwrap();
        assert_relative_eq!(filter.width(), 1.5);
        assert!(format!("{filter:?}").starts_with("BlackmanHarris"));
    }

    #[test]
    fn test_none_maps_to_half_pixel_box() {
        let props = Properties::new().with("film.filter.type", "NONE");
        let filter = pixel_filter_from_properties(&props).unwrap();
        assert_relative_eq!(filter.width(), 0.5);
    }

    #[test]
    fn test_unknown_filter_is_rejected() {
        let props = Properties::new().with("film.filter.type", "MITCHELL");
        assert!(matches!(
            pixel_filter_from_properties(&props),
            Err(ConfigError::UnknownValue { .. })
        ));
    }
}
