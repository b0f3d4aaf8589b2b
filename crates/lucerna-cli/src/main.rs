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

//! `lucerna`: render a scene for a while, optionally resuming from and writing
//! render state checkpoints, and stage the film output on a GPU when enabled.

use anyhow::{Context, Result};
use clap::Parser;
use lucerna_core::config::Properties;
use lucerna_core::device::{destroy_context, ComputeBackend, DeviceRequest, FilmDeviceContext};
use lucerna_core::film::{Film, FilmOutputFormat, MemoryFilm};
use lucerna_core::scene::{GroundPlaneScene, Scene};
use lucerna_engine::{RenderConfig, RenderEngine, RenderState};
use lucerna_infra::WgpuComputeBackend;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "lucerna", version, about = "Render, checkpoint and resume")]
struct Args {
    /// Property file describing the render.
    config: PathBuf,

    /// How long to render, in seconds.
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,

    /// Resume from a render state written by `--checkpoint`.
    #[arg(long, value_name = "FILE")]
    resume: Option<PathBuf>,

    /// Write the render state to FILE once the render stops.
    #[arg(long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,

    /// Override a property, e.g. `--set native.threads.count=4`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, String)>,
}

fn parse_override(text: &str) -> Result<(String, String), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{text}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing property name in '{text}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn load_properties(args: &Args) -> Result<Properties> {
    let mut props = Properties::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    for (key, value) in &args.overrides {
        let line: Properties = format!("{key} = {value}")
            .parse()
            .with_context(|| format!("Invalid override for {key}"))?;
        props.merge(&line);
    }
    Ok(props)
}

/// Copies the tone-mapped and the linear film into device staging buffers.
fn upload_film(context: &mut FilmDeviceContext, film: &MemoryFilm) -> Result<()> {
    let pixels = u64::from(film.width()) * u64::from(film.height());

    context.allocate_staging(FilmOutputFormat::Rgb8, pixels)?;
    context.upload(FilmOutputFormat::Rgb8, &film.to_rgb8(1.0))?;

    let linear: Vec<u8> = film
        .to_rgba_f32()
        .into_iter()
        .flat_map(f32::to_le_bytes)
        .collect();
    context.allocate_staging(FilmOutputFormat::RgbaF32, pixels)?;
    context.upload(FilmOutputFormat::RgbaF32, &linear)?;

    log::info!(
        "Film staged on the device ({} + {} bytes)",
        context.staging_size(FilmOutputFormat::Rgb8).unwrap_or(0),
        context.staging_size(FilmOutputFormat::RgbaF32).unwrap_or(0)
    );
    Ok(())
}

fn stage_film(props: &Properties, film: &MemoryFilm) -> Result<()> {
    let backend = WgpuComputeBackend::new();
    let request = DeviceRequest::from_properties(props, backend.minimum_feature_version())?;
    let mut context = FilmDeviceContext::create(&backend, &request)
        .context("Failed to create the film device context")?;

    let staged = match context.as_mut() {
        Some(context) => upload_film(context, film),
        None => Ok(()),
    };
    destroy_context(context);
    staged
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Warn)
        .init();

    let args = Args::parse();
    let props = load_properties(&args)?;

    let scene: Arc<dyn Scene> = Arc::new(GroundPlaneScene::from_properties(&props)?);
    let film = Arc::new(MemoryFilm::new(
        props.get_u32("film.width", 640)?,
        props.get_u32("film.height", 480)?,
    ));
    let resume = args
        .resume
        .as_ref()
        .map(RenderState::load)
        .transpose()
        .context("Failed to read the render state to resume from")?;

    let mut engine = RenderEngine::new(RenderConfig::new(props.clone(), scene))?;
    engine.start(resume, film.clone())?;
    thread::sleep(Duration::from_secs_f64(args.seconds.max(0.0)));
    let samples = engine.sample_count();
    engine.stop()?;
    log::info!(
        "Rendered {} samples ({:.1} per pixel)",
        samples,
        samples as f64 / (f64::from(film.width()) * f64::from(film.height()))
    );

    if let Some(path) = &args.checkpoint {
        engine
            .capture_state()?
            .save(path)
            .with_context(|| format!("Failed to write checkpoint {}", path.display()))?;
    }

    if props.get_bool("film.gpu.enable", false)? {
        stage_film(&props, &film)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("native.threads.count=4").unwrap(),
            ("native.threads.count".to_string(), "4".to_string())
        );
        assert!(parse_override("film.width").is_err());
        assert!(parse_override("=4").is_err());
    }

    #[test]
    fn test_overrides_accept_value_lists() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("scene.cfg");
        std::fs::write(&config, "renderengine.type = BAKECPU\n").unwrap();
        let args = Args::parse_from([
            "lucerna",
            config.to_str().unwrap(),
            "--set",
            "renderengine.type=PATHCPU",
            "--set",
            "scene.camera.lookat=0 1 5 0 0 0",
        ]);

        let props = load_properties(&args).unwrap();

        assert_eq!(props.get_string("renderengine.type", "").unwrap(), "PATHCPU");
        assert_eq!(props.get_strings("scene.camera.lookat", &[]).len(), 6);
    }
}
