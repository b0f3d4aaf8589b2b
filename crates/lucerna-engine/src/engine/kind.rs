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

use lucerna_core::config::Properties;
use lucerna_core::error::ConfigError;
use lucerna_core::film::FilmChannel;

/// Sampler types understood by the CPU engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    /// Sobol low-discrepancy sequence.
    Sobol,
    /// Independent uniform samples.
    Random,
    /// Metropolis light transport sampler.
    Metropolis,
    /// Tile-based sampler, used by tile engines only.
    TilePath,
    /// Real-time sampler, used by the real-time engine only.
    RtPathCpu,
}

impl SamplerType {
    /// Parses a `sampler.type` value.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "SOBOL" => Some(SamplerType::Sobol),
            "RANDOM" => Some(SamplerType::Random),
            "METROPOLIS" => Some(SamplerType::Metropolis),
            "TILEPATHSAMPLER" => Some(SamplerType::TilePath),
            "RTPATHCPUSAMPLER" => Some(SamplerType::RtPathCpu),
            _ => None,
        }
    }

    /// The property value naming this sampler.
    pub fn tag(self) -> &'static str {
        match self {
            SamplerType::Sobol => "SOBOL",
            SamplerType::Random => "RANDOM",
            SamplerType::Metropolis => "METROPOLIS",
            SamplerType::TilePath => "TILEPATHSAMPLER",
            SamplerType::RtPathCpu => "RTPATHCPUSAMPLER",
        }
    }

    /// Reads `sampler.type`.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let tag = props.get_string("sampler.type", SamplerType::Sobol.tag())?;
        Self::from_tag(&tag).ok_or_else(|| ConfigError::UnknownValue {
            key: "sampler.type".to_string(),
            value: tag.clone(),
            what: "sampler type",
        })
    }
}

/// The render engine variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderEngineKind {
    /// Progressive CPU path tracer.
    PathCpu,
    /// CPU path tracer baking illumination into maps.
    BakeCpu,
    /// Interactive CPU path tracer.
    RtPathCpu,
}

const PATH_CPU_CHANNELS: &[FilmChannel] =
    &[FilmChannel::RadiancePerPixelNormalized, FilmChannel::Alpha];
const BAKE_CPU_CHANNELS: &[FilmChannel] = &[FilmChannel::RadiancePerPixelNormalized];

impl RenderEngineKind {
    /// Every engine kind.
    pub const ALL: [RenderEngineKind; 3] = [
        RenderEngineKind::PathCpu,
        RenderEngineKind::BakeCpu,
        RenderEngineKind::RtPathCpu,
    ];

    /// The tag used in `renderengine.type` and in render state headers.
    pub fn tag(self) -> &'static str {
        match self {
            RenderEngineKind::PathCpu => "PATHCPU",
            RenderEngineKind::BakeCpu => "BAKECPU",
            RenderEngineKind::RtPathCpu => "RTPATHCPU",
        }
    }

    /// Parses an engine tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Reads `renderengine.type`.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let tag = props.get_string("renderengine.type", RenderEngineKind::PathCpu.tag())?;
        Self::from_tag(&tag).ok_or_else(|| ConfigError::UnknownValue {
            key: "renderengine.type".to_string(),
            value: tag.clone(),
            what: "render engine type",
        })
    }

    /// The properties this engine assumes when they are not set.
    pub fn default_properties(self) -> Properties {
        let sampler = match self {
            RenderEngineKind::RtPathCpu => SamplerType::RtPathCpu,
            RenderEngineKind::PathCpu | RenderEngineKind::BakeCpu => SamplerType::Sobol,
        };
        Properties::new()
            .with("renderengine.type", self.tag())
            .with("renderengine.seed", "1")
            .with("sampler.type", sampler.tag())
            .with("film.filter.type", "BLACKMANHARRIS")
            .with("film.filter.width", "1.5")
            .with("path.pathdepth.total", "6")
            .with("path.pathdepth.diffuse", "4")
            .with("path.pathdepth.glossy", "4")
            .with("path.pathdepth.specular", "6")
            .with("path.russianroulette.depth", "3")
            .with("path.russianroulette.cap", "0.5")
            .with("path.clamping.variance.maxvalue", "0")
            .with("path.forceblackbackground.enable", "0")
    }

    /// Rejects samplers this engine can not drive.
    pub fn validate_sampler(self, props: &Properties) -> Result<SamplerType, ConfigError> {
        let sampler = SamplerType::from_properties(props)?;
        let compatible = match self {
            RenderEngineKind::PathCpu | RenderEngineKind::BakeCpu => {
                !matches!(sampler, SamplerType::TilePath | SamplerType::RtPathCpu)
            }
            RenderEngineKind::RtPathCpu => sampler == SamplerType::RtPathCpu,
        };
        if compatible {
            Ok(sampler)
        } else {
            Err(ConfigError::Incompatible {
                key: "sampler.type".to_string(),
                value: sampler.tag().to_string(),
                engine: self.tag(),
            })
        }
    }

    /// The film channels this engine writes.
    pub fn film_channels(self) -> &'static [FilmChannel] {
        match self {
            RenderEngineKind::PathCpu | RenderEngineKind::RtPathCpu => PATH_CPU_CHANNELS,
            RenderEngineKind::BakeCpu => BAKE_CPU_CHANNELS,
        }
    }
}
