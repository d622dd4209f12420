use orbitview::cli::Args;
use orbitview::config::ViewerConfig;
use orbitview::core::{ProgressObserver, Viewer};
use orbitview::entities::{Canvas, ImageBackend};
use orbitview::paths::{self, PathConfig};
use orbitview::raster::RasterCanvas;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// ~60 Hz host frame callback
const TICK: Duration = Duration::from_millis(16);

/// Pointer-move events used to play back `--drag`
const DRAG_STEPS: usize = 12;

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;

    let config = build_config(&args, &path_config)?;
    if config.base_path.is_empty() {
        use clap::CommandFactory;
        let _ = Args::command().print_help();
        println!();
        bail!("No BASE_PATH given (argument or \"basePath\" in the config file)");
    }

    let total = config.logical_frame_count();
    let progress: ProgressObserver = Arc::new(move |loaded, total| {
        eprint!("\rLoaded {}/{}", loaded, total);
        let _ = std::io::stderr().flush();
    });
    let canvas = RasterCanvas::new(args.width, args.height).with_dpr(args.dpr);
    let backend = Arc::new(ImageBackend::new());
    let mut viewer = Viewer::init_with_progress(canvas, args.start, config, backend, Some(progress))
        .context("Viewer init failed")?;
    info!("First frame {} of {} on screen", viewer.target_frame(), total);

    if let Some(distance) = args.drag {
        play_drag(&mut viewer, distance);
    }

    let mut ticks = 0;
    while ticks < args.ticks {
        let report = viewer.tick();
        if let Some(frame) = report.promoted {
            info!("High-res frame {} on screen", frame);
        }
        if viewer.is_settled() {
            break;
        }
        ticks += 1;
        std::thread::sleep(TICK);
    }
    eprintln!();
    if !viewer.is_settled() {
        warn!("Tick budget ({}) used up before the viewer settled", args.ticks);
    }

    let stats = viewer.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    debug!("Final state: {:?}, last drawn {:?}", viewer.state(), viewer.last_drawn());

    if let Some(out) = &args.out {
        viewer
            .canvas()
            .save(out)
            .with_context(|| format!("Failed to save canvas: {}", out.display()))?;
        info!("Saved {}", out.display());
    }

    viewer.destroy();
    Ok(())
}

/// Config file (explicit or default location) with CLI overrides on top
fn build_config(args: &Args, path_config: &PathConfig) -> Result<ViewerConfig> {
    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => {
            let default_path = paths::config_file(paths::CONFIG_FILE, path_config);
            if default_path.is_file() {
                ViewerConfig::load(&default_path)?
            } else {
                debug!("No config at {}, using defaults", default_path.display());
                ViewerConfig::default()
            }
        }
    };

    if let Some(base) = &args.base_path {
        config.base_path = base.clone();
    }
    if let Some(ext) = &args.extension {
        config.extension = ext.trim_start_matches('.').to_string();
    }
    if let Some(frames) = args.frames {
        config.total_frames = frames;
    }
    if let Some(step) = args.step {
        config.frame_step = step;
    }
    config.validate().context("Invalid viewer config")?;
    Ok(config)
}

/// Press at the canvas centre, move `distance` px in steps, release
fn play_drag(viewer: &mut Viewer<RasterCanvas>, distance: f32) {
    let (width, height) = viewer.canvas().client_size();
    let (x0, y) = (width / 2.0, height / 2.0);
    const POINTER: i32 = 1;

    viewer.pointer_down(x0, y, POINTER);
    for step in 1..=DRAG_STEPS {
        viewer.pointer_move(x0 + distance * step as f32 / DRAG_STEPS as f32, y);
        viewer.tick();
        std::thread::sleep(TICK);
    }
    viewer.pointer_up(POINTER);
    info!("Drag of {}px settled on frame {}", distance, viewer.target_frame());
}

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| paths::config_file(paths::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("ureq", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level.as_str().to_lowercase()))
            .filter_module("ureq", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}
