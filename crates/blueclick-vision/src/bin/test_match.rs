//! Match test - run with: cargo run -p blueclick-vision --bin test_match -- <template.png> [threshold]

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use blueclick_vision::{ColorSpace, Template, best_match, default_screen, detect_blue, find_matches};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let mut args = std::env::args().skip(1);
    let path = PathBuf::from(args.next().context("usage: test_match <template.png> [threshold]")?);
    let threshold: f32 = args.next().map(|t| t.parse()).transpose()?.unwrap_or(0.7);

    let template = Template::load(&path)?;
    tracing::info!("Template {}x{}", template.width(), template.height());

    let screen = default_screen()?;
    let start = Instant::now();
    let frame = screen.capture_full()?;
    tracing::info!(
        "Captured {}x{} at {} in {:?}",
        frame.width(),
        frame.height(),
        frame.origin,
        start.elapsed()
    );

    for space in [ColorSpace::Color, ColorSpace::Grayscale] {
        let start = Instant::now();
        let matches = find_matches(&frame, std::slice::from_ref(&template), threshold, space);
        tracing::info!("{:?}: {} matches in {:?}", space, matches.len(), start.elapsed());
        for m in matches.iter().take(10) {
            tracing::info!("   {} score {:.3}", m.pos, m.score);
        }
        if let Some(best) = best_match(&frame, &template, space) {
            tracing::info!("   best {} score {:.3}", best.pos, best.score);
        }
    }

    let blobs = detect_blue(&frame);
    tracing::info!("{} blue regions", blobs.len());
    for blob in blobs.iter().take(5) {
        tracing::info!("   {} area {}", blob.center, blob.area);
    }

    Ok(())
}
