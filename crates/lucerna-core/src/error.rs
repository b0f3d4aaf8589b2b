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

//! Error types shared by the foundational layer.
//!
//! Configuration errors always carry the offending key so the caller can report
//! exactly which property was rejected. Device errors cover
//! allocation and staging-buffer failures of a compute backend.

use std::path::PathBuf;
use thiserror::Error;

/// An error raised while reading or interpreting configuration properties.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A line of a property file could not be parsed.
    #[error("Syntax error in property file at line {line}: '{text}'")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },
    /// A property is present but its value does not have the expected form.
    #[error("Malformed value '{value}' for property '{key}': expected {expected}")]
    Malformed {
        /// The property name.
        key: String,
        /// The value as written.
        value: String,
        /// A description of what was expected.
        expected: &'static str,
    },
    /// A property names a variant that does not exist (engine, sampler, map type...).
    #[error("Unknown {what} '{value}' in property '{key}'")]
    UnknownValue {
        /// The property name.
        key: String,
        /// The unrecognized value.
        value: String,
        /// What kind of value was expected, e.g. "bake map type".
        what: &'static str,
    },
    /// A value is valid in general but not for the engine that reads it.
    #[error("{engine} render engine can not use {value} (property '{key}')")]
    Incompatible {
        /// The property name.
        key: String,
        /// The rejected value.
        value: String,
        /// The engine tag that rejected it.
        engine: &'static str,
    },
    /// A repeating-group definition has an empty or malformed tag.
    #[error("Syntax error in {group} definition: {name}")]
    InvalidGroupKey {
        /// The repeating group, e.g. "bake.maps".
        group: &'static str,
        /// The property name that could not be resolved to a tag.
        name: String,
    },
    /// The property file could not be read.
    #[error("Failed to read property file '{}': {source}", path.display())]
    Io {
        /// The file that failed to load.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// An error raised by a compute-device backend.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A device could not be opened.
    #[error("Failed to allocate device '{device}': {reason}")]
    Allocation {
        /// The device name.
        device: String,
        /// Backend-specific failure description.
        reason: String,
    },
    /// A buffer operation failed on an opened device.
    #[error("Buffer '{label}' failed: {reason}")]
    Buffer {
        /// The buffer label.
        label: String,
        /// Backend-specific failure description.
        reason: String,
    },
    /// A buffer handle does not belong to the device.
    #[error("Invalid buffer handle {0}")]
    InvalidBuffer(u64),
    /// No staging buffer has been allocated for the requested format.
    #[error("No staging buffer allocated for {0:?}")]
    NoStagingBuffer(crate::film::FilmOutputFormat),
}
