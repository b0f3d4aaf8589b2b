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

//! The photon global-illumination cache.
//!
//! Photons are traced from the scene lights once per render (or loaded from a
//! persistent file) and stored in two maps: indirect photons land on diffuse
//! surfaces after at least one bounce, caustic photons on diffuse surfaces
//! reached through a chain of specular bounces only. Render workers query the
//! maps concurrently once the cache is preprocessed.

use super::photon_map::{Photon, PhotonMap};
use crate::error::GiCacheError;
use glam::Vec3;
use lucerna_core::config::Properties;
use lucerna_core::error::ConfigError;
use lucerna_core::scene::{Ray, Scene, Spectrum, SurfaceHit};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// Seeds of the photon tracing threads are `PHOTON_SEED_BASE + thread index`.
const PHOTON_SEED_BASE: u64 = 0x5eed_9ac1;
const RAY_EPSILON: f32 = 1e-4;
const LARGE_STEP_PROBABILITY: f32 = 0.3;

/// How photon paths are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhotonSamplerType {
    /// Independent uniform samples.
    Random,
    /// A Markov chain favouring paths that store photons.
    Metropolis,
}

impl PhotonSamplerType {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "RANDOM" => Some(PhotonSamplerType::Random),
            "METROPOLIS" => Some(PhotonSamplerType::Metropolis),
            _ => None,
        }
    }
}

/// Settings of one photon map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotonMapParams {
    /// Whether the map is built.
    pub enabled: bool,
    /// Maximum number of stored photons.
    pub max_size: usize,
    /// Density estimation radius.
    pub lookup_radius: f32,
    /// Maximum angle in degrees between the query normal and a photon normal.
    pub lookup_normal_angle: f32,
}

/// Parameters of the photon GI cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotonGiParams {
    /// Photon path sampler.
    pub sampler: PhotonSamplerType,
    /// Maximum number of photon paths traced by `preprocess`.
    pub max_photon_count: u64,
    /// Maximum number of bounces of a photon path.
    pub max_photon_depth: u32,
    /// Indirect map settings.
    pub indirect: PhotonMapParams,
    /// Caustic map settings.
    pub caustic: PhotonMapParams,
    /// File the cache is loaded from, or saved to after being built.
    pub persistent_file: Option<PathBuf>,
}

impl PhotonGiParams {
    /// Reads the `path.photongi.*` properties. `None` when both maps are disabled.
    pub fn from_properties(props: &Properties) -> Result<Option<Self>, ConfigError> {
        let indirect = PhotonMapParams {
            enabled: props.get_bool("path.photongi.indirect.enabled", false)?,
            max_size: props.get_u64("path.photongi.indirect.maxsize", 10_000_000)? as usize,
            lookup_radius: positive(props, "path.photongi.indirect.lookup.radius", 0.15)?,
            lookup_normal_angle: props
                .get_f32("path.photongi.indirect.lookup.normalangle", 10.0)?,
        };
        let caustic = PhotonMapParams {
            enabled: props.get_bool("path.photongi.caustic.enabled", false)?,
            max_size: props.get_u64("path.photongi.caustic.maxsize", 100_000)? as usize,
            lookup_radius: positive(props, "path.photongi.caustic.lookup.radius", 0.15)?,
            lookup_normal_angle: props
                .get_f32("path.photongi.caustic.lookup.normalangle", 10.0)?,
        };
        if !indirect.enabled && !caustic.enabled {
            return Ok(None);
        }

        let sampler_tag = props.get_string("path.photongi.sampler.type", "METROPOLIS")?;
        let sampler =
            PhotonSamplerType::from_tag(&sampler_tag).ok_or_else(|| ConfigError::UnknownValue {
                key: "path.photongi.sampler.type".to_string(),
                value: sampler_tag.clone(),
                what: "photon sampler",
            })?;
        let persistent_file = props.get_string("path.photongi.persistent.file", "")?;

        Ok(Some(Self {
            sampler,
            max_photon_count: props.get_u64("path.photongi.photon.maxcount", 20_000_000)?,
            max_photon_depth: props.get_u32("path.photongi.photon.maxdepth", 4)?,
            indirect,
            caustic,
            persistent_file: (!persistent_file.is_empty()).then(|| PathBuf::from(persistent_file)),
        }))
    }
}

fn positive(props: &Properties, key: &str, default: f32) -> Result<f32, ConfigError> {
    let value = props.get_f32(key, default)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Malformed {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a positive number",
        })
    }
}

/// Photons deposited by one tracing thread, before normalization.
#[derive(Default)]
struct TraceOutput {
    indirect: Vec<Photon>,
    caustic: Vec<Photon>,
    paths: u64,
}

/// Photon GI cache: parameters, photon maps and the scene they were traced in.
#[derive(Serialize, Deserialize)]
pub struct PhotonGiCache {
    params: PhotonGiParams,
    #[serde(skip)]
    scene: Option<Arc<dyn Scene>>,
    preprocessed: bool,
    traced_paths: u64,
    indirect: Option<PhotonMap>,
    caustic: Option<PhotonMap>,
}

impl fmt::Debug for PhotonGiCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotonGiCache")
            .field("params", &self.params)
            .field("scene_attached", &self.scene.is_some())
            .field("preprocessed", &self.preprocessed)
            .field("indirect_photons", &self.indirect_photon_count())
            .field("caustic_photons", &self.caustic_photon_count())
            .finish()
    }
}

impl PhotonGiCache {
    /// Creates an empty cache. Call [`preprocess`](Self::preprocess) before querying it.
    pub fn new(scene: Arc<dyn Scene>, params: PhotonGiParams) -> Self {
        Self {
            params,
            scene: Some(scene),
            preprocessed: false,
            traced_paths: 0,
            indirect: None,
            caustic: None,
        }
    }

    /// Creates a cache from the `path.photongi.*` properties.
    ///
    /// Returns `Ok(None)` when neither photon map is enabled.
    pub fn from_properties(
        scene: Arc<dyn Scene>,
        props: &Properties,
    ) -> Result<Option<Self>, ConfigError> {
        Ok(PhotonGiParams::from_properties(props)?.map(|params| Self::new(scene, params)))
    }

    /// The cache parameters.
    pub fn params(&self) -> &PhotonGiParams {
        &self.params
    }

    /// The persistent cache file, if one is configured.
    pub fn persistent_file(&self) -> Option<&Path> {
        self.params.persistent_file.as_deref()
    }

    /// Whether the photon maps have been built.
    pub fn is_preprocessed(&self) -> bool {
        self.preprocessed
    }

    /// Whether a scene is attached.
    pub fn has_scene(&self) -> bool {
        self.scene.is_some()
    }

    /// Number of photon paths traced while building the maps.
    pub fn traced_paths(&self) -> u64 {
        self.traced_paths
    }

    /// Photons in the indirect map.
    pub fn indirect_photon_count(&self) -> usize {
        self.indirect.as_ref().map_or(0, PhotonMap::len)
    }

    /// Photons in the caustic map.
    pub fn caustic_photon_count(&self) -> usize {
        self.caustic.as_ref().map_or(0, PhotonMap::len)
    }

    /// The indirect photon map, once built.
    pub fn indirect_map(&self) -> Option<&PhotonMap> {
        self.indirect.as_ref()
    }

    /// The caustic photon map, once built.
    pub fn caustic_map(&self) -> Option<&PhotonMap> {
        self.caustic.as_ref()
    }

    /// Reattaches the scene after the cache has been decoded.
    pub fn set_scene(&mut self, scene: Arc<dyn Scene>) {
        self.scene = Some(scene);
    }

    /// Traces the photons and builds the photon maps using `parallelism` threads.
    ///
    /// Blocks until every thread has finished. A second call fails with
    /// [`GiCacheError::AlreadyPreprocessed`] and leaves the maps untouched.
    pub fn preprocess(&mut self, parallelism: usize) -> Result<(), GiCacheError> {
        if self.preprocessed {
            return Err(GiCacheError::AlreadyPreprocessed);
        }
        let scene = self
            .scene
            .clone()
            .expect("photon GI cache preprocessed without a scene");
        let thread_count = parallelism.max(1);
        let params = &self.params;
        log::info!(
            "Photon GI: tracing up to {} photon paths with {} thread(s)",
            params.max_photon_count,
            thread_count
        );

        let paths_per_thread = params.max_photon_count.div_ceil(thread_count as u64);
        let indirect_quota = quota(params.indirect, thread_count);
        let caustic_quota = quota(params.caustic, thread_count);

        let outputs = thread::scope(|s| {
            let handles: Vec<_> = (0..thread_count)
                .map(|index| {
                    let scene = scene.as_ref();
                    s.spawn(move || {
                        let mut tracer = PhotonTracer {
                            scene,
                            params,
                            rng: SmallRng::seed_from_u64(PHOTON_SEED_BASE + index as u64),
                            indirect_quota,
                            caustic_quota,
                        };
                        tracer.run(paths_per_thread)
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| handle.join().map_err(|_| GiCacheError::WorkerPanicked(index)))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut indirect = Vec::new();
        let mut caustic = Vec::new();
        let mut traced_paths = 0;
        for output in outputs {
            indirect.extend(output.indirect);
            caustic.extend(output.caustic);
            traced_paths += output.paths;
        }
        indirect.truncate(self.params.indirect.max_size);
        caustic.truncate(self.params.caustic.max_size);

        self.indirect = self.params.indirect.enabled.then(|| build_map(indirect, self.params.indirect));
        self.caustic = self.params.caustic.enabled.then(|| build_map(caustic, self.params.caustic));
        self.traced_paths = traced_paths;
        self.preprocessed = true;

        log::info!(
            "Photon GI: {} photon paths traced, {} indirect and {} caustic photons stored",
            traced_paths,
            self.indirect_photon_count(),
            self.caustic_photon_count()
        );
        Ok(())
    }

    fn assert_usable(&self) {
        assert!(self.preprocessed, "photon GI cache queried before preprocess");
        assert!(self.scene.is_some(), "photon GI cache queried before set_scene");
    }

    /// Irradiance from indirect photons around `point`, for one radiance group.
    ///
    /// # Panics
    /// If the cache is not preprocessed or has no scene attached.
    pub fn query_indirect(&self, point: Vec3, normal: Vec3, light_group: u32) -> Spectrum {
        self.assert_usable();
        self.indirect
            .as_ref()
            .map_or(Spectrum::ZERO, |map| map.estimate(point, normal, light_group))
    }

    /// Irradiance from caustic photons around `point`, for one radiance group.
    ///
    /// # Panics
    /// If the cache is not preprocessed or has no scene attached.
    pub fn query_caustic(&self, point: Vec3, normal: Vec3, light_group: u32) -> Spectrum {
        self.assert_usable();
        self.caustic
            .as_ref()
            .map_or(Spectrum::ZERO, |map| map.estimate(point, normal, light_group))
    }

    /// Encodes the cache (without its scene).
    pub fn to_bytes(&self) -> Result<Vec<u8>, GiCacheError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    /// Decodes a cache. [`set_scene`](Self::set_scene) must be called before querying it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GiCacheError> {
        let (cache, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(cache)
    }

    /// Writes the cache to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GiCacheError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_bytes()?).map_err(|source| GiCacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Photon GI cache saved to {}", path.display());
        Ok(())
    }

    /// Reads a cache written by [`save`](Self::save) and attaches `scene` to it.
    pub fn load(path: impl AsRef<Path>, scene: Arc<dyn Scene>) -> Result<Self, GiCacheError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| GiCacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cache = Self::from_bytes(&bytes)?;
        cache.set_scene(scene);
        log::info!(
            "Photon GI cache loaded from {} ({} indirect, {} caustic photons)",
            path.display(),
            cache.indirect_photon_count(),
            cache.caustic_photon_count()
        );
        Ok(cache)
    }
}

fn quota(params: PhotonMapParams, thread_count: usize) -> usize {
    if params.enabled {
        params.max_size.div_ceil(thread_count)
    } else {
        0
    }
}

fn build_map(photons: Vec<Photon>, params: PhotonMapParams) -> PhotonMap {
    PhotonMap::new(
        photons,
        params.lookup_radius,
        params.lookup_normal_angle.to_radians().cos(),
    )
}

/// One photon tracing thread.
struct PhotonTracer<'a> {
    scene: &'a dyn Scene,
    params: &'a PhotonGiParams,
    rng: SmallRng,
    indirect_quota: usize,
    caustic_quota: usize,
}

impl PhotonTracer<'_> {
    fn dimensions(&self) -> usize {
        4 + 2 * self.params.max_photon_depth as usize
    }

    fn full(&self, output: &TraceOutput) -> bool {
        output.indirect.len() >= self.indirect_quota && output.caustic.len() >= self.caustic_quota
    }

    fn run(&mut self, max_paths: u64) -> TraceOutput {
        match self.params.sampler {
            PhotonSamplerType::Random => self.run_random(max_paths),
            PhotonSamplerType::Metropolis => self.run_metropolis(max_paths),
        }
    }

    fn run_random(&mut self, max_paths: u64) -> TraceOutput {
        let mut output = TraceOutput::default();
        let mut sample = vec![0.0; self.dimensions()];
        while output.paths < max_paths && !self.full(&output) {
            sample.iter_mut().for_each(|u| *u = self.rng.gen());
            let (indirect, caustic) = self.trace(&sample);
            self.store(&mut output, &indirect, &caustic);
            output.paths += 1;
        }
        let scale = 1.0 / output.paths.max(1) as f32;
        scale_power(&mut output, scale);
        output
    }

    /// Visibility-driven Metropolis sampling: the chain only moves to paths that
    /// store at least one photon, and the useful fraction of the uniform large
    /// steps normalizes the stored power.
    fn run_metropolis(&mut self, max_paths: u64) -> TraceOutput {
        let mut output = TraceOutput::default();
        let dimensions = self.dimensions();
        let mut current: Option<(Vec<f32>, Vec<Photon>, Vec<Photon>)> = None;
        let mut candidate = vec![0.0; dimensions];
        let mut large_steps = 0u64;
        let mut useful_large_steps = 0u64;

        while output.paths < max_paths && !self.full(&output) {
            let large_step = current.is_none() || self.rng.gen::<f32>() < LARGE_STEP_PROBABILITY;
            match (&current, large_step) {
                (Some((state, _, _)), false) => {
                    for (u, &base) in candidate.iter_mut().zip(state) {
                        *u = mutate(base, self.rng.gen(), self.rng.gen());
                    }
                }
                _ => candidate.iter_mut().for_each(|u| *u = self.rng.gen()),
            }

            let (indirect, caustic) = self.trace(&candidate);
            let useful = !indirect.is_empty() || !caustic.is_empty();
            if large_step {
                large_steps += 1;
                if useful {
                    useful_large_steps += 1;
                }
            }
            if useful {
                current = Some((candidate.clone(), indirect, caustic));
            }
            if let Some((_, indirect, caustic)) = &current {
                self.store(&mut output, indirect, caustic);
            }
            output.paths += 1;
        }

        let useful_fraction = useful_large_steps as f32 / large_steps.max(1) as f32;
        let scale = useful_fraction / output.paths.max(1) as f32;
        scale_power(&mut output, scale);
        output
    }

    fn store(&self, output: &mut TraceOutput, indirect: &[Photon], caustic: &[Photon]) {
        let room = self.indirect_quota.saturating_sub(output.indirect.len());
        output.indirect.extend(indirect.iter().take(room));
        let room = self.caustic_quota.saturating_sub(output.caustic.len());
        output.caustic.extend(caustic.iter().take(room));
    }

    /// Traces the photon path described by `sample` and returns the photons it stores.
    fn trace(&self, sample: &[f32]) -> (Vec<Photon>, Vec<Photon>) {
        let mut indirect = Vec::new();
        let mut caustic = Vec::new();
        let Some(emission) = self
            .scene
            .emit_photon([sample[0], sample[1], sample[2], sample[3]])
        else {
            return (indirect, caustic);
        };

        let mut ray = emission.ray;
        let mut power = emission.power;
        let mut specular_chain = true;
        for depth in 0..self.params.max_photon_depth as usize {
            let Some(hit) = self.scene.intersect(&ray) else {
                break;
            };
            let (u0, u1) = (sample[4 + 2 * depth], sample[5 + 2 * depth]);

            if hit.specular {
                ray = reflect(&ray, &hit);
            } else {
                if depth > 0 {
                    let photon = Photon {
                        position: hit.point,
                        normal: hit.normal,
                        power,
                        light_group: emission.light_group,
                    };
                    if specular_chain {
                        if self.params.caustic.enabled {
                            caustic.push(photon);
                        }
                    } else if self.params.indirect.enabled {
                        indirect.push(photon);
                    }
                }
                specular_chain = false;
                ray = Ray::new(hit.point + hit.normal * RAY_EPSILON, cosine_direction(hit.normal, u0, u1));
            }
            power *= hit.albedo;
            if power.max_element() <= 0.0 {
                break;
            }
        }
        (indirect, caustic)
    }
}

fn scale_power(output: &mut TraceOutput, scale: f32) {
    for photon in output.indirect.iter_mut().chain(output.caustic.iter_mut()) {
        photon.power *= scale;
    }
}

/// Small exponential perturbation of `value`, wrapped into `[0, 1)`.
fn mutate(value: f32, u: f32, direction: f32) -> f32 {
    const S1: f32 = 1.0 / 1024.0;
    const S2: f32 = 1.0 / 64.0;
    let delta = S2 * (-(S2 / S1).ln() * u).exp();
    let moved = if direction < 0.5 { value + delta } else { value - delta };
    moved.rem_euclid(1.0)
}

fn reflect(ray: &Ray, hit: &SurfaceHit) -> Ray {
    let direction = ray.direction - 2.0 * ray.direction.dot(hit.normal) * hit.normal;
    Ray::new(hit.point + hit.normal * RAY_EPSILON, direction)
}

/// Cosine-weighted direction around `normal`.
fn cosine_direction(normal: Vec3, u0: f32, u1: f32) -> Vec3 {
    let r = u0.sqrt();
    let phi = 2.0 * PI * u1;
    let local = Vec3::new(r * phi.cos(), r * phi.sin(), (1.0 - u0).max(0.0).sqrt());
    let (tangent, bitangent) = normal.any_orthonormal_pair();
    tangent * local.x + bitangent * local.y + normal * local.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucerna_core::scene::GroundPlaneScene;

    fn scene() -> Arc<dyn Scene> {
        Arc::new(GroundPlaneScene::default())
    }

    fn props(sampler: &str) -> Properties {
        Properties::new()
            .with("path.photongi.sampler.type", sampler)
            .with("path.photongi.photon.maxcount", "20000")
            .with("path.photongi.indirect.enabled", "true")
            .with("path.photongi.caustic.enabled", "true")
            .with("path.photongi.indirect.maxsize", "5000")
            .with("path.photongi.caustic.maxsize", "2000")
    }

    #[test]
    fn test_disabled_cache_is_absent() {
        let cache = PhotonGiCache::from_properties(scene(), &Properties::new()).unwrap();
        assert!(cache.is_none());
    }

    #[test]
    fn test_params_defaults() {
        let props = Properties::new().with("path.photongi.indirect.enabled", "true");
        let params = PhotonGiParams::from_properties(&props).unwrap().unwrap();

        assert_eq!(params.sampler, PhotonSamplerType::Metropolis);
        assert_eq!(params.max_photon_count, 20_000_000);
        assert_eq!(params.max_photon_depth, 4);
        assert_eq!(params.indirect.max_size, 10_000_000);
        assert!(!params.caustic.enabled);
        assert_eq!(params.persistent_file, None);
    }

    #[test]
    fn test_unknown_sampler_is_rejected() {
        let props = props("SOBOL");
        assert!(matches!(
            PhotonGiParams::from_properties(&props),
            Err(ConfigError::UnknownValue { .. })
        ));
    }

    #[test]
    fn test_malformed_radius_is_rejected() {
        let props = props("RANDOM").with("path.photongi.indirect.lookup.radius", "-1");
        assert!(matches!(
            PhotonGiParams::from_properties(&props),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_preprocess_fills_both_maps() {
        for sampler in ["RANDOM", "METROPOLIS"] {
            let mut cache = PhotonGiCache::from_properties(scene(), &props(sampler))
                .unwrap()
                .unwrap();
            cache.preprocess(2).unwrap();

            assert!(cache.is_preprocessed());
            assert!(cache.indirect_photon_count() > 0, "{sampler}");
            assert!(cache.caustic_photon_count() > 0, "{sampler}");
            assert!(cache.indirect_photon_count() <= 5000);
            assert!(cache.caustic_photon_count() <= 2000);
            assert!(cache.traced_paths() <= 20000);
        }
    }

    #[test]
    fn test_preprocess_twice_is_rejected_and_keeps_data() {
        let mut cache = PhotonGiCache::from_properties(scene(), &props("RANDOM"))
            .unwrap()
            .unwrap();
        cache.preprocess(2).unwrap();
        let before = cache.indirect_map().unwrap().photons().to_vec();

        let second = cache.preprocess(4);

        assert!(matches!(second, Err(GiCacheError::AlreadyPreprocessed)));
        assert_eq!(cache.indirect_map().unwrap().photons(), before.as_slice());
    }

    #[test]
    fn test_preprocess_is_deterministic_for_a_thread_count() {
        let build = || {
            let mut cache = PhotonGiCache::from_properties(scene(), &props("RANDOM"))
                .unwrap()
                .unwrap();
            cache.preprocess(3).unwrap();
            cache
        };
        let (a, b) = (build(), build());
        assert_eq!(a.indirect_map().unwrap().photons(), b.indirect_map().unwrap().photons());
    }

    #[test]
    #[should_panic(expected = "queried before preprocess")]
    fn test_query_before_preprocess_panics() {
        let cache = PhotonGiCache::from_properties(scene(), &props("RANDOM"))
            .unwrap()
            .unwrap();
        cache.query_indirect(Vec3::ZERO, Vec3::Y, 0);
    }

    #[test]
    #[should_panic(expected = "queried before set_scene")]
    fn test_query_after_decoding_requires_scene() {
        let mut cache = PhotonGiCache::from_properties(scene(), &props("RANDOM"))
            .unwrap()
            .unwrap();
        cache.preprocess(1).unwrap();
        let decoded = PhotonGiCache::from_bytes(&cache.to_bytes().unwrap()).unwrap();
        decoded.query_caustic(Vec3::ZERO, Vec3::Y, 0);
    }

    #[test]
    fn test_save_and_load_preserve_photons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gi.cache");
        let mut cache = PhotonGiCache::from_properties(scene(), &props("METROPOLIS"))
            .unwrap()
            .unwrap();
        cache.preprocess(2).unwrap();
        cache.save(&path).unwrap();

        let loaded = PhotonGiCache::load(&path, scene()).unwrap();

        assert!(loaded.is_preprocessed());
        assert_eq!(loaded.params(), cache.params());
        assert_eq!(loaded.indirect_photon_count(), cache.indirect_photon_count());
        let point = Vec3::new(1.5, 0.0, 0.5);
        assert_eq!(
            loaded.query_indirect(point, Vec3::Y, 0),
            cache.query_indirect(point, Vec3::Y, 0)
        );
    }

    #[test]
    fn test_metropolis_photon_power_is_normalized() {
        // ARRANGE
        let mut cache = PhotonGiCache::from_properties(scene(), &props("METROPOLIS"))
            .unwrap()
            .unwrap();

        // ACT
        cache.preprocess(2).unwrap();

        // ASSERT
        let photons = cache.indirect_map().unwrap().photons();
        assert!(!photons.is_empty());
        for photon in photons {
            assert!(photon.power.is_finite(), "{:?}", photon.power);
            assert!(photon.power.max_element() > 0.0, "{:?}", photon.power);
        }
    }

    #[test]
    fn test_mutation_stays_in_unit_interval() {
        for &(value, u, d) in &[(0.999, 0.0, 0.2), (0.0, 0.0, 0.9), (0.5, 1.0, 0.1)] {
            let moved = mutate(value, u, d);
            assert!((0.0..1.0).contains(&moved), "{moved}");
        }
    }
}
