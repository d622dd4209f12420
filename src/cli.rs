use clap::Parser;
use std::path::PathBuf;

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Decode: image 0.25 (RGBA8)\n",
    "HTTP:   ureq 2\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless 360° frame-sequence viewer
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Path or URL prefix up to the frame number, e.g. `orbit/Day/Exterior360_2.`
    #[arg(value_name = "BASE_PATH")]
    pub base_path: Option<String>,

    /// Image extension (without dot)
    #[arg(short = 'e', long = "ext", value_name = "EXT")]
    pub extension: Option<String>,

    /// Raw frames on disk
    #[arg(short = 'n', long = "frames", value_name = "N")]
    pub frames: Option<usize>,

    /// Decimation: show every Nth raw frame
    #[arg(short = 's', long = "step", value_name = "N")]
    pub step: Option<usize>,

    /// Viewer config JSON (default: <config dir>/orbitview/orbitview.json if present)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Initial logical frame
    #[arg(long = "start", value_name = "N", default_value_t = 0)]
    pub start: usize,

    /// Simulate a horizontal drag of PX pixels (negative = left) after init
    #[arg(long = "drag", value_name = "PX", allow_hyphen_values = true)]
    pub drag: Option<f32>,

    /// Offscreen canvas width
    #[arg(long = "width", value_name = "PX", default_value_t = 960.0)]
    pub width: f32,

    /// Offscreen canvas height
    #[arg(long = "height", value_name = "PX", default_value_t = 540.0)]
    pub height: f32,

    /// Device pixel ratio of the offscreen canvas
    #[arg(long = "dpr", value_name = "RATIO", default_value_t = 1.0)]
    pub dpr: f32,

    /// Tick budget at ~60 Hz before giving up on settling
    #[arg(long = "ticks", value_name = "N", default_value_t = 600)]
    pub ticks: usize,

    /// Save the final canvas to this image file
    #[arg(short = 'o', long = "out", value_name = "PNG")]
    pub out: Option<PathBuf>,

    /// Enable logging to file (default: orbitview.log in the config dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}
