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

//! The render thread pool.

use crate::path_tracer::PathTracer;
use lucerna_core::film::Film;
use lucerna_core::scene::{Ray, Scene, Spectrum, SurfaceHit};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::FRAC_1_PI;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

const RAY_EPSILON: f32 = 1e-4;

/// Fixed-size pool of named render threads sharing one stop flag.
#[derive(Debug)]
pub struct RenderThreadPool {
    running: Arc<AtomicBool>,
    samples: Arc<AtomicU64>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl RenderThreadPool {
    /// Spawns `thread_count` render threads. Thread `i` seeds its generator with
    /// `boot_seed + i`.
    ///
    /// If a thread fails to spawn, the threads already running are stopped and
    /// joined before the error is returned.
    pub fn start(
        thread_count: usize,
        boot_seed: u64,
        tracer: Arc<PathTracer>,
        scene: Arc<dyn Scene>,
        film: Arc<dyn Film>,
    ) -> io::Result<Self> {
        let mut pool = Self {
            running: Arc::new(AtomicBool::new(true)),
            samples: Arc::new(AtomicU64::new(0)),
            handles: Vec::with_capacity(thread_count),
        };

        for index in 0..thread_count {
            let worker = RenderWorker {
                index,
                rng: SmallRng::seed_from_u64(boot_seed.wrapping_add(index as u64)),
                running: Arc::clone(&pool.running),
                samples: Arc::clone(&pool.samples),
                tracer: Arc::clone(&tracer),
                scene: Arc::clone(&scene),
                film: Arc::clone(&film),
            };
            let spawned = thread::Builder::new()
                .name(format!("render-{index}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    log::error!("Failed to spawn render thread {index}: {e}");
                    pool.stop();
                    return Err(e);
                }
            }
        }

        log::info!("Started {thread_count} render thread(s) with seed {boot_seed}");
        Ok(pool)
    }

    /// Number of live threads.
    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Samples added to the film so far.
    pub fn sample_count(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Signals every thread to stop and waits for all of them. Returns the sample total.
    pub fn stop(&mut self) -> u64 {
        self.running.store(false, Ordering::SeqCst);
        let count = self.handles.len();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("A render thread panicked");
            }
        }
        let samples = self.sample_count();
        if count > 0 {
            log::info!("Stopped {count} render thread(s) after {samples} samples");
        }
        samples
    }
}

impl Drop for RenderThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RenderWorker {
    index: usize,
    rng: SmallRng,
    running: Arc<AtomicBool>,
    samples: Arc<AtomicU64>,
    tracer: Arc<PathTracer>,
    scene: Arc<dyn Scene>,
    film: Arc<dyn Film>,
}

impl RenderWorker {
    fn run(mut self) {
        log::debug!("Render thread {} started", self.index);
        let group_count = self.scene.light_group_count().max(1);
        let mut radiance = vec![Spectrum::ZERO; group_count as usize];

        while self.running.load(Ordering::Relaxed) {
            let (x, y) = (
                self.rng.gen_range(0..self.film.width()),
                self.rng.gen_range(0..self.film.height()),
            );
            let (dx, dy) = self
                .tracer
                .filter_distribution()
                .sample(self.rng.gen(), self.rng.gen());
            let ray = self.scene.camera_ray(
                x as f32 + 0.5 + dx,
                y as f32 + 0.5 + dy,
                self.film.width(),
                self.film.height(),
            );

            let alpha = self.sample_radiance(ray, &mut radiance);
            self.film.add_sample(x, y, &radiance, alpha, 1.0);
            self.samples.fetch_add(1, Ordering::Relaxed);
        }
        log::debug!("Render thread {} stopped", self.index);
    }

    /// Fills `radiance` per group for one camera ray and returns the sample alpha.
    fn sample_radiance(&mut self, mut ray: Ray, radiance: &mut [Spectrum]) -> f32 {
        radiance.fill(Spectrum::ZERO);
        let options = *self.tracer.options();
        let mut throughput = Spectrum::ONE;
        let mut depth = 0;

        let hit = loop {
            let Some(hit) = self.scene.intersect(&ray) else {
                return if options.force_black_background || depth > 0 { 1.0 } else { 0.0 };
            };
            if !hit.specular {
                break hit;
            }
            if depth >= options.specular_bounce_limit() {
                return 1.0;
            }
            throughput *= hit.albedo;
            if depth >= options.russian_roulette_depth {
                let survival = throughput.max_element().clamp(options.russian_roulette_cap, 1.0);
                if self.rng.gen::<f32>() >= survival {
                    return 1.0;
                }
                throughput /= survival;
            }
            ray = reflect(&ray, &hit);
            depth += 1;
        };

        for (group, value) in radiance.iter_mut().enumerate() {
            let group = group as u32;
            let mut sample = self.scene.direct_light(&hit, group);
            if let Some(cache) = self.tracer.cache() {
                let irradiance = cache.query_indirect(hit.point, hit.normal, group)
                    + cache.query_caustic(hit.point, hit.normal, group);
                sample += hit.albedo * FRAC_1_PI * irradiance;
            }
            *value = clamp(throughput * sample, options.clamp_max_value);
        }
        1.0
    }
}

fn reflect(ray: &Ray, hit: &SurfaceHit) -> Ray {
    let direction = ray.direction - 2.0 * ray.direction.dot(hit.normal) * hit.normal;
    Ray::new(hit.point + hit.normal * RAY_EPSILON, direction)
}

fn clamp(value: Spectrum, max_value: f32) -> Spectrum {
    if max_value > 0.0 {
        value.min(Spectrum::splat(max_value))
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_tracer::{PathTracerOptions, PixelFilterDistribution};
    use lucerna_core::film::{FilmChannel, MemoryFilm};
    use lucerna_core::filter::BoxFilter;
    use glam::Vec3;
    use lucerna_core::scene::{GroundPlaneScene, PointLight};
    use std::time::Duration;

    fn tracer() -> Arc<PathTracer> {
        Arc::new(PathTracer::new(
            PathTracerOptions::default(),
            PixelFilterDistribution::new(&BoxFilter::new(0.5)),
            None,
        ))
    }

    #[test]
    fn test_pool_renders_until_stopped() {
        // ARRANGE
        let film = Arc::new(MemoryFilm::new(16, 12));
        film.add_channel(FilmChannel::RadiancePerPixelNormalized);
        film.init();
        let scene: Arc<dyn Scene> = Arc::new(GroundPlaneScene::default());

        // ACT
        let mut pool = RenderThreadPool::start(2, 7, tracer(), scene, film.clone()).unwrap();
        assert_eq!(pool.thread_count(), 2);
        thread::sleep(Duration::from_millis(50));
        let samples = pool.stop();

        // ASSERT
        assert!(samples > 0);
        assert_eq!(pool.thread_count(), 0);
        assert_eq!(film.sample_count(), samples);
        assert_eq!(pool.stop(), samples);
    }

    #[test]
    fn test_film_counts_one_sample_per_pixel_sample_with_several_groups() {
        let lights = vec![
            PointLight {
                position: Vec3::new(0.0, 5.0, 2.0),
                gain: Spectrum::splat(30.0),
                group: 0,
            },
            PointLight {
                position: Vec3::new(-3.0, 4.0, 0.0),
                gain: Spectrum::splat(10.0),
                group: 1,
            },
        ];
        let scene: Arc<dyn Scene> = Arc::new(GroundPlaneScene::with_lights(lights));
        let film = Arc::new(MemoryFilm::new(8, 8));
        film.add_channel(FilmChannel::RadiancePerPixelNormalized);
        film.set_radiance_group_count(scene.light_group_count());
        film.init();

        let mut pool = RenderThreadPool::start(2, 3, tracer(), scene, film.clone()).unwrap();
        thread::sleep(Duration::from_millis(30));
        let samples = pool.stop();

        assert_eq!(film.radiance_group_count(), 2);
        assert_eq!(film.sample_count(), samples);
    }

    #[test]
    fn test_dropping_the_pool_joins_threads() {
        let film = Arc::new(MemoryFilm::new(4, 4));
        film.init();
        let scene: Arc<dyn Scene> = Arc::new(GroundPlaneScene::default());
        let tracer = tracer();

        let pool = RenderThreadPool::start(3, 1, Arc::clone(&tracer), scene, film).unwrap();
        drop(pool);

        assert_eq!(Arc::strong_count(&tracer), 1);
    }

    #[test]
    fn test_clamp() {
        let value = Spectrum::new(0.5, 4.0, 2.0);
        assert_eq!(clamp(value, 0.0), value);
        assert_eq!(clamp(value, 1.0), Spectrum::new(0.5, 1.0, 1.0));
    }
}
