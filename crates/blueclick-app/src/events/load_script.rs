use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use blueclick_config::ScriptRecord;
use blueclick_core::EngineSettings;
use blueclick_types::AppEvent;
use blueclick_vision::Template;
use kanal::AsyncSender;

use crate::state::AppState;

pub struct LoadedScript {
    pub path: PathBuf,
    pub record: ScriptRecord,
    pub templates: Vec<Template>,
}

/// Read a script file and every template it names
pub fn load_script_file(path: &Path) -> anyhow::Result<LoadedScript> {
    let record =
        ScriptRecord::load(path).with_context(|| format!("loading script {}", path.display()))?;
    let base = path.parent().unwrap_or(Path::new("."));
    let templates = Template::load_all(&record.resolved_templates(base));

    if templates.is_empty() && !record.templates.is_empty() {
        tracing::warn!(
            "Script '{}' names {} templates but none could be loaded",
            record.name,
            record.templates.len()
        );
    }

    Ok(LoadedScript {
        path: path.to_path_buf(),
        record,
        templates,
    })
}

pub async fn handle_load_script(
    state: &Arc<AppState>,
    path: PathBuf,
    status_tx: &AsyncSender<AppEvent>,
) -> anyhow::Result<()> {
    let loaded = tokio::task::spawn_blocking(move || load_script_file(&path)).await??;

    let settings = {
        let mut config = state.config.write().await;
        config.last_script = Some(loaded.path.clone());
        EngineSettings::from_config(&config, Some(&loaded.record))
    };

    let count = loaded.templates.len();
    {
        let mut session = state.engine.session().lock().await;
        session.apply_settings(settings);
        session.load_templates(loaded.templates);
    }

    status_tx
        .send(AppEvent::ScriptLoaded {
            name: loaded.record.name,
            templates: count,
        })
        .await?;
    Ok(())
}
