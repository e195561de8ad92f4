use std::path::Path;

use anyhow::Context;
use blueclick_config::blob::decode;
use blueclick_config::{EmbeddedScript, ScriptRecord};
use blueclick_vision::Template;

/// Script and templates carried by an exported runner blob
///
/// The embedded image comes first; any file templates the script names are
/// resolved against the blob's directory and appended.
pub fn load_blob(path: &Path) -> anyhow::Result<(ScriptRecord, Vec<Template>)> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut payload: EmbeddedScript =
        decode(&text).with_context(|| format!("decoding {}", path.display()))?;
    payload.script.migrate();

    let mut templates = Vec::new();
    if let Some(bytes) = payload.template_bytes()? {
        templates.push(Template::from_bytes(format!("{} (embedded)", payload.script.name), &bytes)?);
    }

    let base = path.parent().unwrap_or(Path::new("."));
    templates.extend(Template::load_all(&payload.script.resolved_templates(base)));

    if templates.is_empty() {
        anyhow::bail!("{} carries no usable template", path.display());
    }
    Ok((payload.script, templates))
}
