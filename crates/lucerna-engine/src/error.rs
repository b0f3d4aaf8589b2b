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

//! Errors raised by the render lifecycle.

use crate::engine::RenderEnginePhase;
use lucerna_core::error::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// An error raised while building, persisting or restoring the photon GI cache.
#[derive(Debug, Error)]
pub enum GiCacheError {
    /// `preprocess` was called on a cache that already holds its photon maps.
    #[error("Photon GI cache has already been preprocessed")]
    AlreadyPreprocessed,
    /// The cache parameters could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A photon tracing thread panicked.
    #[error("Photon tracing thread {0} panicked")]
    WorkerPanicked(usize),
    /// The persistent cache file could not be read or written.
    #[error("Photon GI cache file '{}': {source}", path.display())]
    Io {
        /// The cache file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The cache could not be encoded.
    #[error("Failed to encode the photon GI cache: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    /// The cache file does not decode to a cache.
    #[error("Failed to decode the photon GI cache: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// An error raised while encoding, decoding or applying a render state.
#[derive(Debug, Error)]
pub enum RenderStateError {
    /// The buffer is shorter than a header, or than its declared payload.
    #[error("Render state is truncated: {actual} bytes, {expected} expected")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
    /// The buffer does not start with the render state magic bytes.
    #[error("Invalid magic bytes; not a render state")]
    BadMagic,
    /// The header was written by an incompatible format version.
    #[error("Unsupported render state version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version in the header.
        found: u8,
        /// Version this build reads.
        expected: u8,
    },
    /// The header names an engine this build does not know.
    #[error("Unknown render engine tag '{0}' in render state")]
    UnknownEngine(String),
    /// The state was produced by a different engine kind.
    #[error("Invalid render state: expected {expected} state but got {found}")]
    EngineMismatch {
        /// The tag of the engine consuming the state.
        expected: &'static str,
        /// The tag recorded in the state.
        found: &'static str,
    },
    /// The state file could not be read or written.
    #[error("Render state file '{}': {source}", path.display())]
    Io {
        /// The state file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The payload could not be encoded.
    #[error("Failed to encode the render state: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    /// The payload could not be decoded.
    #[error("Failed to decode the render state: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// The error type of [`RenderEngine`](crate::engine::RenderEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid or incompatible configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The supplied render state can not be used.
    #[error(transparent)]
    State(#[from] RenderStateError),
    /// The photon GI cache could not be built or loaded.
    #[error(transparent)]
    Cache(#[from] GiCacheError),
    /// The operation is not allowed in the current phase.
    #[error("Can not {operation} a render engine in the {phase:?} phase")]
    InvalidPhase {
        /// The rejected operation.
        operation: &'static str,
        /// The phase the engine was in.
        phase: RenderEnginePhase,
    },
    /// A render thread could not be spawned.
    #[error("Failed to spawn render thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}
