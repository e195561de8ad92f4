use std::sync::Arc;

use anyhow::Context;
use blueclick_core::action::Trigger;
use blueclick_core::{Engine, EngineSettings, Session};
use blueclick_input::default_driver;
use blueclick_types::AppEvent;
use blueclick_vision::default_screen;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod controller;
mod embedded;
mod events;
mod io;
mod profile;
mod state;
mod status;

#[cfg(test)]
mod tests;

use self::cli::Cli;
use self::controller::AppController;
use self::embedded::load_blob;
use self::profile::{InstanceLock, ProfilePaths, load_settings, save_settings};
use self::state::AppState;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BLUECLICK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let paths = ProfilePaths::resolve(cli.profile_dir.as_deref())?;
    paths.ensure_dirs()?;
    let _lock = InstanceLock::acquire(&paths)?;
    tracing::info!("Profile directory: {}", paths.root().display());

    let config = load_settings(&paths).with_env_overrides();

    let screen = default_screen().context("screen capture unavailable")?;
    let driver = default_driver().context("input injection unavailable")?;

    let blob = match cli.blob.clone() {
        Some(path) => Some(tokio::task::spawn_blocking(move || load_blob(&path)).await??),
        None => None,
    };

    let mut session = Session::new(EngineSettings::from_config(
        &config,
        blob.as_ref().map(|(record, _)| record),
    ));
    if let Some((record, templates)) = blob {
        tracing::info!("Running embedded script '{}'", record.name);
        session.load_templates(templates);
    }

    // Blob runs carry their own script and do not reopen the last one
    let script = match (&cli.script, &cli.blob) {
        (Some(arg), _) => Some(paths.resolve_script(arg)),
        (None, None) => config.last_script.clone(),
        (None, Some(_)) => None,
    };

    let engine = Engine::new(session.shared(), screen, driver);
    let state = Arc::new(AppState::new(config, paths, engine));

    if cli.detect_blue {
        detect_blue_once(&state).await?;
        persist(&state).await;
        return Ok(());
    }

    let controller = AppController::new(state.clone());
    let mut tasks = controller.spawn_tasks();

    let tx = controller.sender();
    if let Some(path) = script {
        tx.send(AppEvent::LoadScript(path)).await?;
    }
    // After the script so it wins over the script's own threshold
    if let Some(threshold) = cli.threshold {
        tx.send(AppEvent::UpdateThreshold(threshold)).await?;
    }
    tx.send(AppEvent::SetMode(cli.initial_mode())).await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for ctrl+c: {}", e);
            }
            tracing::info!("Shutdown requested");
        }
        Some(result) = tasks.join_next() => {
            match result {
                Ok(Ok(())) => tracing::warn!("A task exited early"),
                Ok(Err(e)) => tracing::error!("Task failed: {e:#}"),
                Err(e) => tracing::error!("Task panicked: {e}"),
            }
        }
    }

    controller.shutdown();
    state.cancel_auto_loop();
    while let Some(result) = tasks.join_next().await {
        if let Ok(Err(e)) = result {
            tracing::debug!("Task ended with: {e:#}");
        }
    }

    persist(&state).await;
    Ok(())
}

async fn detect_blue_once(state: &AppState) -> anyhow::Result<()> {
    let engine = state.engine.clone();
    let outcome =
        tokio::task::spawn_blocking(move || engine.click_largest_blue(Trigger::Manual)).await??;

    match outcome {
        Some((blob, report)) => tracing::info!(
            "Clicked blue region at {} ({} px, {} clicks)",
            blob.center,
            blob.area,
            report.clicks
        ),
        None => tracing::info!("No blue region on screen"),
    }
    Ok(())
}

/// Fold this run's clicks into the lifetime counter and save settings
async fn persist(state: &AppState) {
    let clicks = state.engine.session().lock().await.stats.clicks;
    let mut config = state.config.write().await;
    config.total_clicks += clicks;
    tracing::info!(
        "{} clicks this run, {} in total",
        clicks,
        config.total_clicks
    );

    if let Err(e) = save_settings(&state.paths, &config) {
        tracing::warn!("{e:#}");
    }
}
