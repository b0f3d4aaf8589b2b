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

//! Photon maps with a hash-grid spatial index.

use glam::{IVec3, Vec3};
use lucerna_core::scene::Spectrum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f32::consts::PI;

/// A photon stored on a diffuse surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Photon {
    /// Hit position.
    pub position: Vec3,
    /// Surface normal at the hit, facing the incoming photon.
    pub normal: Vec3,
    /// Carried power.
    pub power: Spectrum,
    /// Radiance group of the emitting light.
    pub light_group: u32,
}

#[derive(Deserialize)]
struct PhotonMapRecord {
    photons: Vec<Photon>,
    lookup_radius: f32,
    cos_normal_angle: f32,
}

impl From<PhotonMapRecord> for PhotonMap {
    fn from(record: PhotonMapRecord) -> Self {
        PhotonMap::new(record.photons, record.lookup_radius, record.cos_normal_angle)
    }
}

/// A set of photons indexed by a uniform grid with one cell per lookup radius.
///
/// The grid is not serialized; it is rebuilt from the photon list on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "PhotonMapRecord")]
pub struct PhotonMap {
    photons: Vec<Photon>,
    lookup_radius: f32,
    cos_normal_angle: f32,
    #[serde(skip)]
    grid: HashMap<IVec3, Vec<u32>>,
}

impl PhotonMap {
    /// Indexes `photons` for lookups within `lookup_radius`, accepting photons whose
    /// normal is within `acos(cos_normal_angle)` of the query normal.
    pub fn new(photons: Vec<Photon>, lookup_radius: f32, cos_normal_angle: f32) -> Self {
        let mut map = Self {
            photons,
            lookup_radius,
            cos_normal_angle,
            grid: HashMap::new(),
        };
        for (index, photon) in map.photons.iter().enumerate() {
            map.grid
                .entry(map.cell(photon.position))
                .or_default()
                .push(index as u32);
        }
        map
    }

    fn cell(&self, position: Vec3) -> IVec3 {
        (position / self.lookup_radius).floor().as_ivec3()
    }

    /// Number of stored photons.
    pub fn len(&self) -> usize {
        self.photons.len()
    }

    /// Whether the map holds no photon.
    pub fn is_empty(&self) -> bool {
        self.photons.is_empty()
    }

    /// The stored photons.
    pub fn photons(&self) -> &[Photon] {
        &self.photons
    }

    /// Lookup radius.
    pub fn lookup_radius(&self) -> f32 {
        self.lookup_radius
    }

    /// Irradiance estimate at `point` from the photons of `light_group`.
    pub fn estimate(&self, point: Vec3, normal: Vec3, light_group: u32) -> Spectrum {
        let radius_sq = self.lookup_radius * self.lookup_radius;
        let center = self.cell(point);
        let mut flux = Spectrum::ZERO;
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let Some(indices) = self.grid.get(&(center + IVec3::new(dx, dy, dz))) else {
                        continue;
                    };
                    for &index in indices {
                        let photon = &self.photons[index as usize];
                        if photon.light_group == light_group
                            && photon.position.distance_squared(point) <= radius_sq
                            && photon.normal.dot(normal) >= self.cos_normal_angle
                        {
                            flux += photon.power;
                        }
                    }
                }
            }
        }
        flux / (PI * radius_sq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn photon(x: f32, z: f32, group: u32) -> Photon {
        Photon {
            position: Vec3::new(x, 0.0, z),
            normal: Vec3::Y,
            power: Spectrum::ONE,
            light_group: group,
        }
    }

    #[test]
    fn test_estimate_counts_photons_in_radius() {
        let map = PhotonMap::new(
            vec![photon(0.0, 0.0, 0), photon(0.05, 0.0, 0), photon(0.5, 0.0, 0)],
            0.1,
            0.9,
        );
        let estimate = map.estimate(Vec3::ZERO, Vec3::Y, 0);
        assert_relative_eq!(estimate.x, 2.0 / (PI * 0.01), epsilon = 1e-3);
    }

    #[test]
    fn test_estimate_filters_group_and_normal() {
        let map = PhotonMap::new(vec![photon(0.0, 0.0, 1)], 0.1, 0.9);
        assert_eq!(map.estimate(Vec3::ZERO, Vec3::Y, 0), Spectrum::ZERO);
        assert_eq!(map.estimate(Vec3::ZERO, Vec3::X, 1), Spectrum::ZERO);
        assert!(map.estimate(Vec3::ZERO, Vec3::Y, 1).x > 0.0);
    }

    #[test]
    fn test_estimate_crosses_cell_boundaries() {
        let map = PhotonMap::new(vec![photon(-0.01, -0.01, 0)], 0.1, 0.9);
        assert!(map.estimate(Vec3::new(0.01, 0.0, 0.01), Vec3::Y, 0).x > 0.0);
    }

    #[test]
    fn test_grid_is_rebuilt_after_decoding() {
        let map = PhotonMap::new(vec![photon(0.0, 0.0, 0)], 0.1, 0.9);
        let bytes = bincode::serde::encode_to_vec(&map, bincode::config::standard()).unwrap();
        let (decoded, _): (PhotonMap, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();

        assert_eq!(decoded.len(), 1);
        assert_eq!(
            decoded.estimate(Vec3::ZERO, Vec3::Y, 0),
            map.estimate(Vec3::ZERO, Vec3::Y, 0)
        );
    }
}
