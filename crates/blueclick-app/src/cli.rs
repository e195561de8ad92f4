use std::path::PathBuf;

use blueclick_types::ScanMode;
use clap::Parser;

/// blueclick - find a target on screen and click it
#[derive(Parser, Debug, Default)]
#[command(name = "blueclick")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Script to load, a path or a name under the profile's scripts directory
    #[arg(long, value_name = "SCRIPT")]
    pub script: Option<String>,

    /// Exported runner blob; starts scanning immediately
    #[arg(long, value_name = "PATH", conflicts_with = "script")]
    pub blob: Option<PathBuf>,

    /// Initial mode: off, hotkey or auto
    #[arg(long, value_name = "MODE")]
    pub mode: Option<ScanMode>,

    /// Settings directory (default: the user config directory)
    #[arg(long, value_name = "DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Click the largest blue region once and exit
    #[arg(long)]
    pub detect_blue: bool,

    /// Similarity threshold between 0 and 1; overrides settings and script
    #[arg(long, value_name = "SCORE", value_parser = parse_threshold)]
    pub threshold: Option<f32>,
}

fn parse_threshold(arg: &str) -> Result<f32, String> {
    let value: f32 = arg.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is outside 0..=1"))
    }
}

impl Cli {
    /// Mode to enter once the runtime is up
    pub fn initial_mode(&self) -> ScanMode {
        match (self.mode, &self.blob) {
            (Some(mode), _) => mode,
            (None, Some(_)) => ScanMode::Auto,
            (None, None) => ScanMode::Hotkey,
        }
    }
}
