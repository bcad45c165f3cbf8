use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::events::NamedKey;

pub mod themes;

pub use themes::{Palette, ThemeName};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Notepad";
const APP_NAME: &str = "notepad";

pub const CONFIG_ENV: &str = "NOTEPAD_CONFIG";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load();
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load();
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_dirs.data_dir().join("state"));
        let log_dir = state_dir.join("logs");

        Ok(Self {
            config_dir,
            config_file,
            state_dir,
            log_dir,
        })
    }

    /// Lays every directory out under `root`.
    pub fn rooted(root: &Path) -> Self {
        let config_dir = root.join("config");
        let state_dir = root.join("state");
        Self {
            config_file: config_dir.join("config.toml"),
            config_dir,
            log_dir: state_dir.join("logs"),
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.state_dir, &self.log_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("notepad.log")
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub theme: ThemeName,
    /// Title used when the editor starts without a seed note.
    pub default_title: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "tick_rate_ms")]
    pub tick_rate: Duration,
    pub editor: EditorOptions,
    pub sync: SyncOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: ThemeName::Dark,
            default_title: "Notes".to_string(),
            tick_rate: Duration::from_millis(250),
            editor: EditorOptions::default(),
            sync: SyncOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self) {
        if self.editor.commit_key == self.editor.erase_key {
            tracing::warn!(
                key = %self.editor.commit_key,
                "commit and erase keys collide, restoring defaults"
            );
            let defaults = EditorOptions::default();
            self.editor.commit_key = defaults.commit_key;
            self.editor.erase_key = defaults.erase_key;
        }
        if self.tick_rate.is_zero() {
            self.tick_rate = AppConfig::default().tick_rate;
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorOptions {
    /// How long focus may be outside the editor before a save is queued.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "blur_debounce_ms")]
    pub blur_debounce: Duration,
    /// Delay between marking a deleted row and removing it.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "fade_ms")]
    pub fade_delay: Duration,
    pub commit_key: NamedKey,
    pub erase_key: NamedKey,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            blur_debounce: Duration::from_millis(150),
            fade_delay: Duration::from_millis(300),
            commit_key: NamedKey::Enter,
            erase_key: NamedKey::Backspace,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub endpoint: String,
    pub csrf_header: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    /// Budget for the save sent while the session is torn down.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "beacon_timeout_ms")]
    pub beacon_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/save-note".to_string(),
            csrf_header: "X-CSRFToken".to_string(),
            request_timeout: Duration::from_secs(10),
            beacon_timeout: Duration::from_secs(2),
        }
    }
}
