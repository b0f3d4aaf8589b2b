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

//! Render state snapshots and their file format.
//!
//! A render state file is a fixed-size [`RenderStateHeader`] followed by a
//! `bincode` payload holding the boot seed and, optionally, the photon GI cache.
//! The header carries the tag of the engine that produced the state so a
//! consumer can reject a state meant for another engine before decoding it.

use crate::cache::PhotonGiCache;
use crate::engine::RenderEngineKind;
use crate::error::RenderStateError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identifies render state files ("LUCNSTAT").
pub const RENDER_STATE_MAGIC: [u8; 8] = *b"LUCNSTAT";
/// The header/payload layout written by this build.
pub const RENDER_STATE_FORMAT_VERSION: u8 = 1;
const ENGINE_TAG_LEN: usize = 32;

/// The fixed-size header at the beginning of every render state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderStateHeader {
    /// Must be [`RENDER_STATE_MAGIC`].
    pub magic_bytes: [u8; 8],
    /// The version of the file format.
    pub format_version: u8,
    /// NUL-padded engine tag, e.g. "BAKECPU".
    pub engine_tag: [u8; ENGINE_TAG_LEN],
    /// Length of the payload following the header, in bytes.
    pub payload_length: u64,
}

impl RenderStateHeader {
    /// The total size of the header in bytes.
    pub const SIZE: usize = 8 + 1 + ENGINE_TAG_LEN + 8;

    fn new(kind: RenderEngineKind, payload_length: u64) -> Self {
        let mut engine_tag = [0u8; ENGINE_TAG_LEN];
        let tag = kind.tag().as_bytes();
        engine_tag[..tag.len()].copy_from_slice(tag);
        Self {
            magic_bytes: RENDER_STATE_MAGIC,
            format_version: RENDER_STATE_FORMAT_VERSION,
            engine_tag,
            payload_length,
        }
    }

    /// The engine tag without its padding.
    pub fn engine_tag(&self) -> String {
        String::from_utf8_lossy(&self.engine_tag)
            .trim_end_matches('\0')
            .to_string()
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.magic_bytes);
        bytes[8] = self.format_version;
        bytes[9..9 + ENGINE_TAG_LEN].copy_from_slice(&self.engine_tag);
        bytes[9 + ENGINE_TAG_LEN..].copy_from_slice(&self.payload_length.to_le_bytes());
        bytes
    }

    /// Parses a header from the beginning of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RenderStateError> {
        let Some(bytes) = bytes.get(..Self::SIZE) else {
            return Err(RenderStateError::Truncated {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        };

        let mut magic_bytes = [0u8; 8];
        magic_bytes.copy_from_slice(&bytes[0..8]);
        if magic_bytes != RENDER_STATE_MAGIC {
            return Err(RenderStateError::BadMagic);
        }

        let format_version = bytes[8];
        if format_version != RENDER_STATE_FORMAT_VERSION {
            return Err(RenderStateError::UnsupportedVersion {
                found: format_version,
                expected: RENDER_STATE_FORMAT_VERSION,
            });
        }

        let mut engine_tag = [0u8; ENGINE_TAG_LEN];
        engine_tag.copy_from_slice(&bytes[9..9 + ENGINE_TAG_LEN]);
        let mut length = [0u8; 8];
        length.copy_from_slice(&bytes[9 + ENGINE_TAG_LEN..]);

        Ok(Self {
            magic_bytes,
            format_version,
            engine_tag,
            payload_length: u64::from_le_bytes(length),
        })
    }
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    boot_seed: u64,
    cache: Option<&'a PhotonGiCache>,
}

#[derive(Deserialize)]
struct Payload {
    boot_seed: u64,
    cache: Option<PhotonGiCache>,
}

/// A single-use snapshot of a render: the engine kind, its boot seed and the
/// photon GI cache it owned.
#[derive(Debug)]
pub struct RenderState {
    kind: RenderEngineKind,
    boot_seed: u64,
    cache: Option<PhotonGiCache>,
}

impl RenderState {
    /// Creates a state owning `cache`.
    pub fn new(kind: RenderEngineKind, boot_seed: u64, cache: Option<PhotonGiCache>) -> Self {
        Self {
            kind,
            boot_seed,
            cache,
        }
    }

    /// The engine that produced this state.
    pub fn kind(&self) -> RenderEngineKind {
        self.kind
    }

    /// The boot seed of the run that produced this state.
    pub fn boot_seed(&self) -> u64 {
        self.boot_seed
    }

    /// The photon GI cache owned by this state.
    pub fn cache(&self) -> Option<&PhotonGiCache> {
        self.cache.as_ref()
    }

    /// Fails unless the state was produced by a `kind` engine.
    pub fn check_kind(&self, kind: RenderEngineKind) -> Result<(), RenderStateError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(RenderStateError::EngineMismatch {
                expected: kind.tag(),
                found: self.kind.tag(),
            })
        }
    }

    pub(crate) fn into_parts(self) -> (u64, Option<PhotonGiCache>) {
        (self.boot_seed, self.cache)
    }

    /// Encodes the header and payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RenderStateError> {
        let payload = bincode::serde::encode_to_vec(
            PayloadRef {
                boot_seed: self.boot_seed,
                cache: self.cache.as_ref(),
            },
            bincode::config::standard(),
        )?;
        let header = RenderStateHeader::new(self.kind, payload.len() as u64);

        let mut bytes = Vec::with_capacity(RenderStateHeader::SIZE + payload.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decodes a state. The cache, if any, has no scene attached.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RenderStateError> {
        let header = RenderStateHeader::from_bytes(bytes)?;
        let tag = header.engine_tag();
        let kind =
            RenderEngineKind::from_tag(&tag).ok_or(RenderStateError::UnknownEngine(tag))?;

        let expected = RenderStateHeader::SIZE.saturating_add(header.payload_length as usize);
        let Some(payload) = bytes.get(RenderStateHeader::SIZE..expected) else {
            return Err(RenderStateError::Truncated {
                expected,
                actual: bytes.len(),
            });
        };
        let (payload, _): (Payload, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())?;

        Ok(Self {
            kind,
            boot_seed: payload.boot_seed,
            cache: payload.cache,
        })
    }

    /// Writes the state to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RenderStateError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_bytes()?).map_err(|source| RenderStateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Render state saved to {}", path.display());
        Ok(())
    }

    /// Reads a state written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RenderStateError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| RenderStateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = RenderStateHeader::new(RenderEngineKind::BakeCpu, 42);
        let bytes = header.to_bytes();

        assert_eq!(&bytes[0..8], b"LUCNSTAT");
        assert_eq!(bytes[8], RENDER_STATE_FORMAT_VERSION);
        assert_eq!(&bytes[9..16], b"BAKECPU");
        assert_eq!(bytes[16], 0);
        assert_eq!(RenderStateHeader::from_bytes(&bytes).unwrap(), header);
        assert_eq!(header.engine_tag(), "BAKECPU");
    }

    #[test]
    fn test_state_without_cache_round_trips() {
        let state = RenderState::new(RenderEngineKind::PathCpu, 99, None);
        let decoded = RenderState::from_bytes(&state.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.kind(), RenderEngineKind::PathCpu);
        assert_eq!(decoded.boot_seed(), 99);
        assert!(decoded.cache().is_none());
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let mut bytes = RenderState::new(RenderEngineKind::PathCpu, 1, None)
            .to_bytes()
            .unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            RenderState::from_bytes(&bytes),
            Err(RenderStateError::BadMagic)
        ));
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let mut bytes = RenderState::new(RenderEngineKind::PathCpu, 1, None)
            .to_bytes()
            .unwrap();
        bytes[8] = RENDER_STATE_FORMAT_VERSION + 1;
        assert!(matches!(
            RenderState::from_bytes(&bytes),
            Err(RenderStateError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let bytes = RenderState::new(RenderEngineKind::BakeCpu, 1, None)
            .to_bytes()
            .unwrap();
        assert!(matches!(
            RenderState::from_bytes(&bytes[..bytes.len() - 1]),
            Err(RenderStateError::Truncated { .. })
        ));
        assert!(matches!(
            RenderState::from_bytes(&bytes[..10]),
            Err(RenderStateError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unknown_engine_tag_is_rejected() {
        let mut bytes = RenderState::new(RenderEngineKind::BakeCpu, 1, None)
            .to_bytes()
            .unwrap();
        bytes[9..16].copy_from_slice(b"BIDIRVM");
        assert!(matches!(
            RenderState::from_bytes(&bytes),
            Err(RenderStateError::UnknownEngine(tag)) if tag == "BIDIRVM"
        ));
    }

    #[test]
    fn test_check_kind() {
        let state = RenderState::new(RenderEngineKind::BakeCpu, 1, None);
        assert!(state.check_kind(RenderEngineKind::BakeCpu).is_ok());
        let err = state.check_kind(RenderEngineKind::PathCpu).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid render state: expected PATHCPU state but got BAKECPU"
        );
    }
}
