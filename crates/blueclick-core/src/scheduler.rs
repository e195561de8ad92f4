use std::time::Duration;

use blueclick_types::ScanMode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::action::Trigger;
use crate::engine::{Engine, PassReport};
use crate::state::EngineSettings;

/// Shortest sleep after a pass that found something
pub const MIN_HIT_DELAY: Duration = Duration::from_millis(50);

/// Why the auto loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// Mode is no longer `auto`
    ModeChanged,
    /// Auto-stop duration elapsed; mode was set to `off`
    AutoStopped,
}

#[derive(Debug, Clone)]
pub enum LoopEvent {
    Pass(PassReport),
    Failed(String),
    AutoStopped,
}

/// Sleep before the next background pass
pub fn next_delay(settings: &EngineSettings, hit: bool, idle_misses: u32) -> Duration {
    let interval = settings.scan_interval;
    if hit {
        return (interval / 2).max(MIN_HIT_DELAY);
    }

    let steps = idle_misses
        .checked_div(settings.idle_backoff_every)
        .unwrap_or(0);
    let factor = (1.0 + 0.5 * steps as f64).min(settings.idle_backoff_max_factor);
    interval.mul_f64(factor)
}

/// Background scan loop, runs until cancelled or the session leaves `auto`
///
/// Each pass runs on the blocking pool. Pass errors are reported through
/// `notify` and never end the loop.
pub async fn run_auto_loop<F>(engine: Engine, cancel: CancellationToken, mut notify: F) -> LoopExit
where
    F: FnMut(LoopEvent) + Send,
{
    info!("Auto scan loop started");
    let exit = loop {
        if cancel.is_cancelled() {
            break LoopExit::Cancelled;
        }

        let (settings, has_templates, idle_misses, auto_since) = {
            let session = engine.session().lock().await;
            if session.mode() != ScanMode::Auto {
                break LoopExit::ModeChanged;
            }
            (
                session.settings.clone(),
                !session.templates.is_empty(),
                session.scan.idle_misses,
                session.scan.auto_since,
            )
        };

        if let (Some(limit), Some(since)) = (settings.auto_stop, auto_since)
            && since.elapsed() >= limit
        {
            info!("Auto mode ran for {:?}, stopping", limit);
            engine.session().lock().await.set_mode(ScanMode::Off);
            notify(LoopEvent::AutoStopped);
            break LoopExit::AutoStopped;
        }

        let delay = if has_templates {
            match engine.run_pass_async(Trigger::Background).await {
                Ok(report) => {
                    let delay = next_delay(&settings, report.hit(), report.idle_misses);
                    notify(LoopEvent::Pass(report));
                    delay
                }
                Err(e) => {
                    warn!("Scan pass failed: {e}");
                    notify(LoopEvent::Failed(e.to_string()));
                    next_delay(&settings, false, idle_misses + 1)
                }
            }
        } else {
            settings.scan_interval
        };

        let cancelled = tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        };
        if cancelled {
            break LoopExit::Cancelled;
        }
    };

    info!("Auto scan loop stopped: {:?}", exit);
    exit
}
