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

//! # Lucerna Engine
//!
//! The render lifecycle: engine kinds and their state machine, the render thread
//! pool, the photon GI cache shared across runs, and the render state that
//! carries a render across process restarts.

#![warn(missing_docs)]

pub mod bake;
pub mod cache;
pub mod engine;
pub mod error;
pub mod path_tracer;
pub mod state;
pub mod worker;

pub use cache::PhotonGiCache;
pub use engine::{RenderConfig, RenderEngine, RenderEngineKind, RenderEnginePhase};
pub use error::{EngineError, GiCacheError, RenderStateError};
pub use state::RenderState;
