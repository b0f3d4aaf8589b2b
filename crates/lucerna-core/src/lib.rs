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

//! # Lucerna Core
//!
//! Foundational crate containing configuration, the error hierarchy, compute-device
//! selection and the collaborator contracts (scene, film, pixel filter) the render
//! lifecycle is built on.

#![warn(missing_docs)]

pub mod config;
pub mod device;
pub mod error;
pub mod film;
pub mod filter;
pub mod scene;

pub use config::{Properties, Property};
pub use error::{ConfigError, DeviceError};
pub use film::{Film, FilmChannel, FilmOutputFormat, MemoryFilm};
pub use filter::PixelFilter;
pub use scene::{Scene, Spectrum};
