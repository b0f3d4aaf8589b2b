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

//! The render engine state machine.
//!
//! ```text
//! Configured ──start──▶ Starting ──▶ Running ──stop──▶ Stopping ──▶ Stopped
//!     ▲                    │                                          │
//!     └──── failure ───────┘◀──────────────── start ──────────────────┘
//! ```
//!
//! The engine owns the photon GI cache between runs. While running, the cache is
//! shared read-only with the render threads and ownership comes back on `stop`.
//! `capture_state` moves it into a [`RenderState`] that a later `start` (in this
//! process or another one) consumes.

mod kind;

pub use kind::{RenderEngineKind, SamplerType};

use crate::bake::{parse_bake_maps, BakeMapInfo};
use crate::cache::{PhotonGiCache, PhotonGiParams};
use crate::error::EngineError;
use crate::path_tracer::{PathTracer, PathTracerOptions, PixelFilterDistribution};
use crate::state::RenderState;
use crate::worker::RenderThreadPool;
use lucerna_core::config::Properties;
use lucerna_core::error::ConfigError;
use lucerna_core::film::Film;
use lucerna_core::filter::pixel_filter_from_properties;
use lucerna_core::scene::Scene;
use std::sync::Arc;

/// The configuration a render engine is built from.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    properties: Properties,
    scene: Arc<dyn Scene>,
}

impl RenderConfig {
    /// Pairs a property set with the scene it renders.
    pub fn new(properties: Properties, scene: Arc<dyn Scene>) -> Self {
        Self { properties, scene }
    }

    /// The properties as supplied, without engine defaults.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// The scene.
    pub fn scene(&self) -> &Arc<dyn Scene> {
        &self.scene
    }
}

/// Lifecycle phase of a [`RenderEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderEnginePhase {
    /// Constructed, or a start attempt failed.
    Configured,
    /// `start` is in progress.
    Starting,
    /// Render threads are running.
    Running,
    /// `stop` is in progress.
    Stopping,
    /// Render threads are joined. The engine can be started again.
    Stopped,
}

/// The per-run settings, parsed in full before a start changes anything.
struct RunSettings {
    options: PathTracerOptions,
    filter_distribution: PixelFilterDistribution,
    cache_params: Option<PhotonGiParams>,
}

impl RunSettings {
    fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let options = PathTracerOptions::from_properties(props)?;
        let filter = pixel_filter_from_properties(props)?;
        Ok(Self {
            options,
            filter_distribution: PixelFilterDistribution::new(filter.as_ref()),
            cache_params: PhotonGiParams::from_properties(props)?,
        })
    }
}

#[derive(Debug)]
struct ActiveRun {
    pool: RenderThreadPool,
    tracer: Arc<PathTracer>,
}

/// A render engine of one [`RenderEngineKind`].
#[derive(Debug)]
pub struct RenderEngine {
    config: RenderConfig,
    properties: Properties,
    kind: RenderEngineKind,
    phase: RenderEnginePhase,
    boot_seed: u64,
    worker_count: usize,
    bake_maps: Vec<BakeMapInfo>,
    cache: Option<PhotonGiCache>,
    run: Option<ActiveRun>,
}

impl RenderEngine {
    /// Parses the engine kind, worker count, seed and (for bake engines) the bake maps.
    pub fn new(config: RenderConfig) -> Result<Self, EngineError> {
        let kind = RenderEngineKind::from_properties(config.properties())?;
        let mut properties = kind.default_properties();
        properties.merge(config.properties());

        let host_threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        let worker_count = properties.get_u32("native.threads.count", host_threads as u32)? as usize;
        if worker_count == 0 {
            return Err(ConfigError::Malformed {
                key: "native.threads.count".to_string(),
                value: "0".to_string(),
                expected: "at least one thread",
            }
            .into());
        }
        let boot_seed = properties.get_u64("renderengine.seed", 1)?;
        let bake_maps = match kind {
            RenderEngineKind::BakeCpu => parse_bake_maps(&properties)?,
            RenderEngineKind::PathCpu | RenderEngineKind::RtPathCpu => Vec::new(),
        };

        log::info!(
            "{} render engine configured with {} render thread(s)",
            kind.tag(),
            worker_count
        );
        Ok(Self {
            config,
            properties,
            kind,
            phase: RenderEnginePhase::Configured,
            boot_seed,
            worker_count,
            bake_maps,
            cache: None,
            run: None,
        })
    }

    /// The engine kind.
    pub fn kind(&self) -> RenderEngineKind {
        self.kind
    }

    /// The current phase.
    pub fn phase(&self) -> RenderEnginePhase {
        self.phase
    }

    /// The seed of the current (or next) run.
    pub fn boot_seed(&self) -> u64 {
        self.boot_seed
    }

    /// Number of render threads.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Bake maps of a bake engine, empty for the other kinds.
    pub fn bake_maps(&self) -> &[BakeMapInfo] {
        &self.bake_maps
    }

    /// The effective properties: engine defaults overridden by the configuration.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// The configuration the engine was built from.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// The photon GI cache, owned or lent to the running render threads.
    pub fn cache(&self) -> Option<&PhotonGiCache> {
        self.cache
            .as_ref()
            .or_else(|| self.run.as_ref().and_then(|run| run.tracer.cache()))
    }

    /// Samples rendered by the current run.
    pub fn sample_count(&self) -> u64 {
        self.run.as_ref().map_or(0, |run| run.pool.sample_count())
    }

    /// Starts rendering into `film`, resuming from `resume` when given.
    ///
    /// The configuration and the render state kind are checked before anything
    /// changes, so a configuration error leaves the engine untouched (see
    /// [`check_start`](Self::check_start) to validate while keeping `resume`). A
    /// failure later on (cache I/O, thread spawn) leaves the engine `Configured`
    /// with its previous seed, no thread running and no cache.
    pub fn start(
        &mut self,
        resume: Option<RenderState>,
        film: Arc<dyn Film>,
    ) -> Result<(), EngineError> {
        let settings = self.prepare_start(resume.as_ref())?;

        self.phase = RenderEnginePhase::Starting;
        log::debug!("Starting {} render engine", self.kind.tag());

        let previous_seed = self.boot_seed;
        match self.start_run(resume, film, settings) {
            Ok(run) => {
                self.run = Some(run);
                self.phase = RenderEnginePhase::Running;
                Ok(())
            }
            Err(e) => {
                self.cache = None;
                self.boot_seed = previous_seed;
                self.phase = RenderEnginePhase::Configured;
                Err(e)
            }
        }
    }

    /// Runs every check `start` performs before it changes anything, without
    /// taking ownership of `resume`.
    pub fn check_start(&self, resume: Option<&RenderState>) -> Result<(), EngineError> {
        self.prepare_start(resume).map(|_| ())
    }

    fn prepare_start(&self, resume: Option<&RenderState>) -> Result<RunSettings, EngineError> {
        if !matches!(
            self.phase,
            RenderEnginePhase::Configured | RenderEnginePhase::Stopped
        ) {
            return Err(EngineError::InvalidPhase {
                operation: "start",
                phase: self.phase,
            });
        }
        let sampler = self.kind.validate_sampler(&self.properties)?;
        log::trace!("Sampler {} accepted by {}", sampler.tag(), self.kind.tag());
        let settings = RunSettings::from_properties(&self.properties)?;
        if let Some(state) = resume {
            state.check_kind(self.kind)?;
        }
        Ok(settings)
    }

    fn start_run(
        &mut self,
        resume: Option<RenderState>,
        film: Arc<dyn Film>,
        settings: RunSettings,
    ) -> Result<ActiveRun, EngineError> {
        match resume {
            Some(state) => self.restore(state),
            None => {
                if self.cache.take().is_some() {
                    log::debug!("Discarding the photon GI cache of the previous run");
                }
            }
        }

        let cache = match (self.cache.take(), settings.cache_params) {
            (Some(mut cache), _) => {
                if !cache.is_preprocessed() {
                    cache.preprocess(self.worker_count)?;
                }
                Some(cache)
            }
            (None, Some(params)) => Some(self.acquire_cache(params)?),
            (None, None) => None,
        };

        for &channel in self.kind.film_channels() {
            film.add_channel(channel);
        }
        film.set_radiance_group_count(self.config.scene().light_group_count());
        film.init();

        let tracer = Arc::new(PathTracer::new(
            settings.options,
            settings.filter_distribution,
            cache,
        ));
        let pool = RenderThreadPool::start(
            self.worker_count,
            self.boot_seed,
            Arc::clone(&tracer),
            Arc::clone(self.config.scene()),
            film,
        )
        .map_err(EngineError::WorkerSpawn)?;
        Ok(ActiveRun { pool, tracer })
    }

    fn restore(&mut self, state: RenderState) {
        let (seed, cache) = state.into_parts();
        self.boot_seed = seed.wrapping_add(1);
        log::info!("Continuing the rendering with new seed: {}", self.boot_seed);

        self.cache = cache.map(|mut cache| {
            cache.set_scene(Arc::clone(self.config.scene()));
            cache
        });
    }

    /// Builds the cache, or loads it from its persistent file when that file exists.
    fn acquire_cache(&self, params: PhotonGiParams) -> Result<PhotonGiCache, EngineError> {
        let scene = Arc::clone(self.config.scene());
        if let Some(path) = params.persistent_file.as_deref().filter(|path| path.exists()) {
            return Ok(PhotonGiCache::load(path, scene)?);
        }

        let file = params.persistent_file.clone();
        let mut cache = PhotonGiCache::new(scene, params);
        cache.preprocess(self.worker_count)?;
        if let Some(path) = file {
            cache.save(path)?;
        }
        Ok(cache)
    }

    /// Stops and joins the render threads, then takes the cache back.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if self.phase != RenderEnginePhase::Running {
            return Err(EngineError::InvalidPhase {
                operation: "stop",
                phase: self.phase,
            });
        }
        self.phase = RenderEnginePhase::Stopping;
        self.halt();
        self.phase = RenderEnginePhase::Stopped;
        Ok(())
    }

    fn halt(&mut self) {
        let Some(ActiveRun { mut pool, tracer }) = self.run.take() else {
            return;
        };
        pool.stop();
        drop(pool);
        self.cache = match Arc::into_inner(tracer) {
            Some(tracer) => tracer.release(),
            None => {
                log::error!("Render parameters are still shared after the render threads stopped");
                None
            }
        };
    }

    /// Moves the cache and the boot seed into a [`RenderState`].
    ///
    /// Only allowed once the engine is stopped.
    pub fn capture_state(&mut self) -> Result<RenderState, EngineError> {
        if self.phase != RenderEnginePhase::Stopped {
            return Err(EngineError::InvalidPhase {
                operation: "capture the state of",
                phase: self.phase,
            });
        }
        Ok(RenderState::new(self.kind, self.boot_seed, self.cache.take()))
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        if self.phase == RenderEnginePhase::Running {
            self.halt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucerna_core::film::{FilmChannel, MemoryFilm};
    use lucerna_core::scene::GroundPlaneScene;

    fn config(props: Properties) -> RenderConfig {
        RenderConfig::new(props, Arc::new(GroundPlaneScene::default()))
    }

    fn film() -> Arc<MemoryFilm> {
        Arc::new(MemoryFilm::new(8, 6))
    }

    #[test]
    fn test_new_reads_kind_threads_and_seed() {
        let props = Properties::new()
            .with("renderengine.type", "BAKECPU")
            .with("native.threads.count", "3")
            .with("renderengine.seed", "41")
            .with("bake.maps.a.type", "LIGHTMAP");
        let engine = RenderEngine::new(config(props)).unwrap();

        assert_eq!(engine.kind(), RenderEngineKind::BakeCpu);
        assert_eq!(engine.worker_count(), 3);
        assert_eq!(engine.boot_seed(), 41);
        assert_eq!(engine.bake_maps().len(), 1);
        assert_eq!(engine.phase(), RenderEnginePhase::Configured);
    }

    #[test]
    fn test_zero_threads_is_rejected() {
        let props = Properties::new().with("native.threads.count", "0");
        assert!(matches!(
            RenderEngine::new(config(props)),
            Err(EngineError::Config(ConfigError::Malformed { .. }))
        ));
    }

    #[test]
    fn test_incompatible_sampler_rejected_before_any_change() {
        let props = Properties::new()
            .with("renderengine.type", "BAKECPU")
            .with("native.threads.count", "1")
            .with("sampler.type", "TILEPATHSAMPLER");
        let mut engine = RenderEngine::new(config(props)).unwrap();
        let film = film();

        let err = engine.start(None, film.clone()).unwrap_err();

        assert!(matches!(err, EngineError::Config(ConfigError::Incompatible { .. })));
        assert_eq!(engine.phase(), RenderEnginePhase::Configured);
        assert!(!film.is_initialized());
    }

    #[test]
    fn test_start_initializes_film_per_kind() {
        let props = Properties::new()
            .with("renderengine.type", "BAKECPU")
            .with("native.threads.count", "1");
        let mut engine = RenderEngine::new(config(props)).unwrap();
        let film = film();

        engine.start(None, film.clone()).unwrap();
        assert_eq!(engine.phase(), RenderEnginePhase::Running);
        engine.stop().unwrap();

        assert_eq!(film.channels(), vec![FilmChannel::RadiancePerPixelNormalized]);
        assert_eq!(film.radiance_group_count(), 1);
        assert_eq!(engine.phase(), RenderEnginePhase::Stopped);
    }

    #[test]
    fn test_invalid_filter_unwinds_to_configured() {
        let props = Properties::new()
            .with("native.threads.count", "1")
            .with("film.filter.type", "SINC")
            .with("path.photongi.indirect.enabled", "true")
            .with("path.photongi.photon.maxcount", "1000");
        let mut engine = RenderEngine::new(config(props)).unwrap();

        assert!(engine.start(None, film()).is_err());
        assert_eq!(engine.phase(), RenderEnginePhase::Configured);
        assert!(engine.cache().is_none());
    }

    #[test]
    fn test_stop_and_capture_require_the_right_phase() {
        let props = Properties::new().with("native.threads.count", "1");
        let mut engine = RenderEngine::new(config(props)).unwrap();

        assert!(matches!(
            engine.stop(),
            Err(EngineError::InvalidPhase { operation: "stop", .. })
        ));
        assert!(engine.capture_state().is_err());

        engine.start(None, film()).unwrap();
        assert!(matches!(
            engine.start(None, film()),
            Err(EngineError::InvalidPhase { operation: "start", .. })
        ));
    }
}
