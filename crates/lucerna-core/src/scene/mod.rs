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

//! The scene as seen by the render lifecycle.
//!
//! Geometry, materials and acceleration structures are outside this crate. The
//! [`Scene`] trait only exposes what the lifecycle and the photon cache need:
//! light group counts for film setup, photon emission, ray intersection, camera
//! rays and direct-light evaluation.

mod ground_plane;

pub use ground_plane::{GroundPlaneScene, PointLight};

use glam::Vec3;
use std::fmt;

/// RGB radiometric quantity.
pub type Spectrum = Vec3;

/// A ray with a normalized direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Origin.
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    /// Creates a ray, normalizing the direction.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// The point at parametric distance `t`.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A ray/surface intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Distance along the ray.
    pub distance: f32,
    /// Hit point.
    pub point: Vec3,
    /// Shading normal, facing the incoming ray.
    pub normal: Vec3,
    /// Diffuse reflectance (or specular tint for specular surfaces).
    pub albedo: Spectrum,
    /// Whether the surface is a perfect specular reflector.
    pub specular: bool,
}

/// A photon leaving a light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotonEmission {
    /// The photon path's first ray.
    pub ray: Ray,
    /// Flux carried by the photon, already divided by the sampling pdf.
    pub power: Spectrum,
    /// The radiance group of the emitting light.
    pub light_group: u32,
}

/// The scene a render runs on.
pub trait Scene: Send + Sync + fmt::Debug {
    /// Number of radiance groups (at least one).
    fn light_group_count(&self) -> u32;

    /// Number of light sources.
    fn light_count(&self) -> usize;

    /// Samples a photon from the lights using four uniform numbers in `[0, 1)`.
    fn emit_photon(&self, u: [f32; 4]) -> Option<PhotonEmission>;

    /// The closest intersection along `ray`.
    fn intersect(&self, ray: &Ray) -> Option<SurfaceHit>;

    /// The primary ray through continuous film coordinates `(film_x, film_y)`.
    fn camera_ray(&self, film_x: f32, film_y: f32, film_width: u32, film_height: u32) -> Ray;

    /// Radiance reflected at `hit` from the lights of `group`, shadows included.
    fn direct_light(&self, hit: &SurfaceHit, group: u32) -> Spectrum;
}
