use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use blueclick_config::Config;

const APP_DIR: &str = "Blueclick";

/// Locations of everything blueclick keeps between runs
#[derive(Debug, Clone)]
pub struct ProfilePaths {
    root: PathBuf,
}

impl ProfilePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `--profile-dir` if given, else the user config directory
    pub fn resolve(override_dir: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(dir) = override_dir {
            return Ok(Self::new(dir));
        }
        let base = dirs::config_dir().context("no user config directory on this system")?;
        Ok(Self::new(base.join(APP_DIR)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join("blueclick.lock")
    }

    /// Turn a `--script` argument into a path
    ///
    /// Existing paths are used as-is; bare names are looked up in the
    /// scripts directory with a `.json` extension.
    pub fn resolve_script(&self, arg: &str) -> PathBuf {
        let direct = PathBuf::from(arg);
        if direct.exists() || direct.components().count() > 1 {
            return direct;
        }
        let mut candidate = self.scripts_dir().join(arg);
        if candidate.extension().is_none() {
            candidate.set_extension("json");
        }
        candidate
    }

    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        fs::create_dir_all(self.scripts_dir())
            .with_context(|| format!("creating {}", self.scripts_dir().display()))
    }
}

/// Load settings, falling back to defaults when the file is missing or broken
pub fn load_settings(paths: &ProfilePaths) -> Config {
    let file = paths.settings_file();
    if !file.exists() {
        tracing::info!("No settings at {}, using defaults", file.display());
        return Config::default();
    }

    match Config::load(&file) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring unreadable settings: {}", e);
            Config::default()
        }
    }
}

pub fn save_settings(paths: &ProfilePaths, config: &Config) -> anyhow::Result<()> {
    config
        .save(&paths.settings_file())
        .with_context(|| format!("saving {}", paths.settings_file().display()))?;
    tracing::debug!("Settings saved to {}", paths.settings_file().display());
    Ok(())
}

/// Held for the life of the process; a second instance fails to acquire it
///
/// The lock belongs to the open handle, so the OS drops it when the process
/// exits for any reason. The file itself stays behind and only records the
/// pid of the last holder.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: File,
}

impl InstanceLock {
    pub fn acquire(paths: &ProfilePaths) -> anyhow::Result<Self> {
        let path = paths.lock_file();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                anyhow::bail!("another instance is running (holding {})", path.display());
            }
            Err(TryLockError::Error(e)) => {
                return Err(e).with_context(|| format!("locking {}", path.display()));
            }
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        tracing::debug!("Instance lock held on {}", path.display());

        Ok(Self { path, file })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
