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

//! A small analytic scene: a diffuse ground plane, an optional mirror sphere
//! and point lights. It stands in for a full scene description when running
//! the lifecycle on its own.

use super::{PhotonEmission, Ray, Scene, Spectrum, SurfaceHit};
use crate::config::Properties;
use crate::error::ConfigError;
use glam::Vec3;
use std::f32::consts::PI;

const RAY_EPSILON: f32 = 1e-4;

/// An isotropic point light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// World position.
    pub position: Vec3,
    /// Radiant intensity.
    pub gain: Spectrum,
    /// Radiance group the light contributes to.
    pub group: u32,
}

/// Ground plane at `y = 0`, an optional mirror sphere and a list of point lights.
#[derive(Debug, Clone)]
pub struct GroundPlaneScene {
    floor_albedo: Spectrum,
    sphere: Option<(Vec3, f32, Spectrum)>,
    lights: Vec<PointLight>,
    camera_origin: Vec3,
    camera_target: Vec3,
    field_of_view: f32,
}

impl Default for GroundPlaneScene {
    fn default() -> Self {
        Self {
            floor_albedo: Spectrum::splat(0.7),
            sphere: Some((Vec3::new(0.0, 1.0, 0.0), 1.0, Spectrum::splat(0.9))),
            lights: vec![PointLight {
                position: Vec3::new(0.0, 5.0, 2.0),
                gain: Spectrum::splat(30.0),
                group: 0,
            }],
            camera_origin: Vec3::new(0.0, 3.0, 8.0),
            camera_target: Vec3::new(0.0, 0.5, 0.0),
            field_of_view: 45.0,
        }
    }
}

impl GroundPlaneScene {
    /// Creates the default scene with a custom light list.
    pub fn with_lights(lights: Vec<PointLight>) -> Self {
        Self {
            lights,
            ..Self::default()
        }
    }

    /// Removes the mirror sphere.
    pub fn without_sphere(mut self) -> Self {
        self.sphere = None;
        self
    }

    /// Reads the `scene.*` properties. Missing keys keep the default scene.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let mut scene = Self::default();

        if props.is_defined("scene.camera.lookat") {
            let values = read_floats(props, "scene.camera.lookat", 6)?;
            scene.camera_origin = Vec3::new(values[0], values[1], values[2]);
            scene.camera_target = Vec3::new(values[3], values[4], values[5]);
        }
        scene.field_of_view = props.get_f32("scene.camera.fieldofview", scene.field_of_view)?;
        scene.floor_albedo = read_vec3(props, "scene.floor.albedo", scene.floor_albedo)?;

        let radius = props.get_f32("scene.sphere.radius", 1.0)?;
        scene.sphere = if radius > 0.0 {
            let center = read_vec3(props, "scene.sphere.center", Vec3::new(0.0, 1.0, 0.0))?;
            let color = read_vec3(props, "scene.sphere.color", Spectrum::splat(0.9))?;
            Some((center, radius, color))
        } else {
            None
        };

        let light_keys = props.unique_sub_names("scene.lights");
        if !light_keys.is_empty() {
            scene.lights.clear();
        }
        for key in light_keys {
            if Properties::extract_field(&key, 2).is_empty() {
                return Err(ConfigError::InvalidGroupKey {
                    group: "scene.lights",
                    name: key,
                });
            }
            scene.lights.push(PointLight {
                position: read_vec3(props, &format!("{key}.position"), Vec3::new(0.0, 5.0, 0.0))?,
                gain: read_vec3(props, &format!("{key}.gain"), Spectrum::splat(30.0))?,
                group: props.get_u32(&format!("{key}.group"), 0)?,
            });
        }

        Ok(scene)
    }

    /// The point lights of the scene.
    pub fn lights(&self) -> &[PointLight] {
        &self.lights
    }

    fn intersect_floor(&self, ray: &Ray) -> Option<SurfaceHit> {
        if ray.direction.y.abs() < 1e-6 {
            return None;
        }
        let t = -ray.origin.y / ray.direction.y;
        if t <= RAY_EPSILON {
            return None;
        }
        let normal = if ray.direction.y > 0.0 { Vec3::NEG_Y } else { Vec3::Y };
        Some(SurfaceHit {
            distance: t,
            point: ray.at(t),
            normal,
            albedo: self.floor_albedo,
            specular: false,
        })
    }

    fn intersect_sphere(&self, ray: &Ray) -> Option<SurfaceHit> {
        let (center, radius, color) = self.sphere?;
        let oc = ray.origin - center;
        let b = oc.dot(ray.direction);
        let c = oc.length_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant <= 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let t = if -b - root > RAY_EPSILON { -b - root } else { -b + root };
        if t <= RAY_EPSILON {
            return None;
        }
        let point = ray.at(t);
        let mut normal = (point - center) / radius;
        if normal.dot(ray.direction) > 0.0 {
            normal = -normal;
        }
        Some(SurfaceHit {
            distance: t,
            point,
            normal,
            albedo: color,
            specular: true,
        })
    }
}

impl Scene for GroundPlaneScene {
    fn light_group_count(&self) -> u32 {
        self.lights.iter().map(|l| l.group + 1).max().unwrap_or(1)
    }

    fn light_count(&self) -> usize {
        self.lights.len()
    }

    fn emit_photon(&self, u: [f32; 4]) -> Option<PhotonEmission> {
        if self.lights.is_empty() {
            return None;
        }
        let count = self.lights.len();
        let light = &self.lights[((u[0] * count as f32) as usize).min(count - 1)];

        // Uniform direction on the sphere.
        let z = 1.0 - 2.0 * u[1];
        let r = (1.0 - z * z).max(0.0).sqrt();
        let phi = 2.0 * PI * u[2];
        let direction = Vec3::new(r * phi.cos(), r * phi.sin(), z);

        Some(PhotonEmission {
            ray: Ray::new(light.position, direction),
            power: light.gain * (4.0 * PI * count as f32),
            light_group: light.group,
        })
    }

    fn intersect(&self, ray: &Ray) -> Option<SurfaceHit> {
        match (self.intersect_floor(ray), self.intersect_sphere(ray)) {
            (Some(floor), Some(sphere)) => Some(if floor.distance < sphere.distance {
                floor
            } else {
                sphere
            }),
            (floor, sphere) => floor.or(sphere),
        }
    }

    fn camera_ray(&self, film_x: f32, film_y: f32, film_width: u32, film_height: u32) -> Ray {
        let forward = (self.camera_target - self.camera_origin).normalize_or_zero();
        let mut right = forward.cross(Vec3::Y).normalize_or_zero();
        if right == Vec3::ZERO {
            right = Vec3::X;
        }
        let up = right.cross(forward);

        let tan_half = (self.field_of_view.to_radians() * 0.5).tan();
        let aspect = film_width as f32 / film_height.max(1) as f32;
        let ndc_x = (2.0 * film_x / film_width.max(1) as f32 - 1.0) * aspect * tan_half;
        let ndc_y = (1.0 - 2.0 * film_y / film_height.max(1) as f32) * tan_half;

        Ray::new(self.camera_origin, forward + right * ndc_x + up * ndc_y)
    }

    fn direct_light(&self, hit: &SurfaceHit, group: u32) -> Spectrum {
        if hit.specular {
            return Spectrum::ZERO;
        }
        let mut result = Spectrum::ZERO;
        for light in self.lights.iter().filter(|l| l.group == group) {
            let to_light = light.position - hit.point;
            let distance_sq = to_light.length_squared();
            let distance = distance_sq.sqrt();
            let direction = to_light / distance;
            let cos_theta = hit.normal.dot(direction);
            if cos_theta <= 0.0 {
                continue;
            }
            let shadow = Ray::new(hit.point + hit.normal * RAY_EPSILON, direction);
            if self
                .intersect(&shadow)
                .is_some_and(|occluder| occluder.distance < distance - RAY_EPSILON)
            {
                continue;
            }
            result += hit.albedo / PI * light.gain * cos_theta / distance_sq;
        }
        result
    }
}

fn read_floats(props: &Properties, key: &str, count: usize) -> Result<Vec<f32>, ConfigError> {
    let values = props.get_strings(key, &[]);
    let malformed = || ConfigError::Malformed {
        key: key.to_string(),
        value: values.join(" "),
        expected: "a list of numbers of the right length",
    };
    if values.len() != count {
        return Err(malformed());
    }
    values
        .iter()
        .map(|v| v.parse::<f32>().map_err(|_| malformed()))
        .collect()
}

fn read_vec3(props: &Properties, key: &str, default: Vec3) -> Result<Vec3, ConfigError> {
    if !props.is_defined(key) {
        return Ok(default);
    }
    let values = read_floats(props, key, 3)?;
    Ok(Vec3::new(values[0], values[1], values[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_floor_intersection_faces_the_ray() {
        let scene = GroundPlaneScene::default().without_sphere();
        let hit = scene
            .intersect(&Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y))
            .unwrap();
        assert_relative_eq!(hit.distance, 2.0);
        assert_eq!(hit.normal, Vec3::Y);
        assert!(!hit.specular);
    }

    #[test]
    fn test_sphere_is_closer_than_floor() {
        let scene = GroundPlaneScene::default();
        let hit = scene
            .intersect(&Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y))
            .unwrap();
        assert!(hit.specular);
        assert_relative_eq!(hit.point.y, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_photon_power_accounts_for_the_sphere_pdf() {
        let scene = GroundPlaneScene::default();
        let photon = scene.emit_photon([0.3, 0.5, 0.25, 0.0]).unwrap();
        assert_relative_eq!(photon.power.x, 30.0 * 4.0 * PI, epsilon = 1e-3);
        assert_relative_eq!(photon.ray.direction.length(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_direct_light_is_shadowed_under_the_sphere() {
        let light = PointLight {
            position: Vec3::new(0.0, 5.0, 0.0),
            gain: Spectrum::splat(10.0),
            group: 0,
        };
        let scene = GroundPlaneScene::with_lights(vec![light]);
        let below = SurfaceHit {
            distance: 1.0,
            point: Vec3::new(0.3, 0.0, 0.0),
            normal: Vec3::Y,
            albedo: Spectrum::splat(0.7),
            specular: false,
        };
        assert_eq!(scene.direct_light(&below, 0), Spectrum::ZERO);

        let open = scene
            .intersect(&Ray::new(Vec3::new(4.0, 1.0, 0.0), Vec3::NEG_Y))
            .unwrap();
        assert!(scene.direct_light(&open, 0).x > 0.0);
        assert_eq!(scene.direct_light(&open, 1), Spectrum::ZERO);
    }

    #[test]
    fn test_camera_center_ray_points_at_target() {
        let scene = GroundPlaneScene::default();
        let ray = scene.camera_ray(50.0, 50.0, 100, 100);
        let expected = (Vec3::new(0.0, 0.5, 0.0) - Vec3::new(0.0, 3.0, 8.0)).normalize();
        assert_relative_eq!(ray.direction.dot(expected), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_from_properties_reads_lights_and_groups() {
        let props = Properties::new()
            .with_values("scene.lights.key.position", ["1", "4", "0"])
            .with_values("scene.lights.fill.position", ["-1", "4", "0"])
            .with("scene.lights.fill.group", "2")
            .with("scene.sphere.radius", "0");
        let scene = GroundPlaneScene::from_properties(&props).unwrap();

        assert_eq!(scene.light_count(), 2);
        assert_eq!(scene.light_group_count(), 3);
        assert_eq!(scene.lights()[0].position, Vec3::new(1.0, 4.0, 0.0));
        assert!(scene.intersect_sphere(&Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y)).is_none());
    }

    #[test]
    fn test_from_properties_rejects_short_vectors() {
        let props = Properties::new().with_values("scene.floor.albedo", ["0.5", "0.5"]);
        assert!(matches!(
            GroundPlaneScene::from_properties(&props),
            Err(ConfigError::Malformed { .. })
        ));
    }
}
