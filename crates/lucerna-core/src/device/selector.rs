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

//! Deterministic device selection policy.

use super::{ComputeDeviceClass, ComputeDeviceDescriptor, FeatureVersion};
use crate::config::Properties;
use crate::error::ConfigError;

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Restrict the candidates to one platform.
    pub platform_index: Option<usize>,
    /// Explicit device override, an index into the filtered candidate list.
    pub device_index: Option<usize>,
    /// Devices below this version still get selected, with a warning.
    pub minimum_version: FeatureVersion,
}

impl DeviceRequest {
    /// A request with no override and no minimum version.
    pub fn any() -> Self {
        Self {
            platform_index: None,
            device_index: None,
            minimum_version: FeatureVersion::new(0, 0),
        }
    }

    /// Reads `film.gpu.platform` and `film.gpu.device`. Negative values mean "no preference".
    pub fn from_properties(
        props: &Properties,
        minimum_version: FeatureVersion,
    ) -> Result<Self, ConfigError> {
        let index = |key: &str| -> Result<Option<usize>, ConfigError> {
            let value = props.get_i32(key, -1)?;
            Ok(usize::try_from(value).ok())
        };
        Ok(Self {
            platform_index: index("film.gpu.platform")?,
            device_index: index("film.gpu.device")?,
            minimum_version,
        })
    }
}

/// The outcome of [`select_device`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelection {
    /// The chosen device.
    pub descriptor: ComputeDeviceDescriptor,
    /// Whether the device was chosen through the explicit index.
    pub explicit: bool,
    /// Whether the reported feature version meets the request's minimum.
    pub meets_minimum_version: bool,
}

/// Picks a device for a single-purpose compute context.
///
/// An in-range explicit index always wins; otherwise the first GPU in
/// enumeration order is taken. An empty candidate list yields `None`, which is
/// a normal outcome. A device reporting a feature version below the minimum is
/// still returned: drivers are known to under-report, so only a warning is logged.
pub fn select_device(
    request: &DeviceRequest,
    devices: &[ComputeDeviceDescriptor],
) -> Option<DeviceSelection> {
    let candidates: Vec<&ComputeDeviceDescriptor> = devices
        .iter()
        .filter(|desc| desc.class.is_compute())
        .filter(|desc| {
            request
                .platform_index
                .map_or(true, |platform| desc.platform_index == platform)
        })
        .collect();

    let (descriptor, explicit) = match request.device_index {
        Some(index) if index < candidates.len() => (candidates[index], true),
        _ => (
            *candidates
                .iter()
                .find(|desc| desc.class == ComputeDeviceClass::Gpu)?,
            false,
        ),
    };

    let meets_minimum_version = descriptor.feature_version >= request.minimum_version;
    if !meets_minimum_version {
        log::warn!(
            "Feature version {} or better is required. Device {} reports {} and may not work.",
            request.minimum_version,
            descriptor.name,
            descriptor.feature_version
        );
    }

    Some(DeviceSelection {
        descriptor: descriptor.clone(),
        explicit,
        meets_minimum_version,
    })
}
