use crate::session::Settings;
use crate::studio::DEFAULT_STUDIO_URL;
use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_CONFIG_PATH: &str = "CADENCE_CONFIG_PATH";
const ENV_BACKEND_URL: &str = "CADENCE_BACKEND_URL";
const ENV_STUDIO_URL: &str = "CADENCE_STUDIO_URL";
const ENV_DEFAULT_DURATION: &str = "CADENCE_DEFAULT_DURATION";

/// Application configuration: backend and studio base addresses plus the
/// generation defaults a fresh session starts from. File values are
/// overridden by environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    backend_url: Option<String>,
    studio_url: String,
    default_duration_seconds: u8,
    default_tempo_bpm: u16,
    default_density: f32,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = Self::default_config_path() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create config directory {}", parent.display())
                })?;
            }
        }

        if let Some(path) = config_file_override()? {
            if path.exists() {
                let partial = read_partial(&path)?;
                config.apply_partial(partial);
            }
        } else {
            let path = Self::default_config_path()?;
            if path.exists() {
                let partial = read_partial(&path)?;
                config.apply_partial(partial);
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    pub fn backend_url(&self) -> Option<&str> {
        self.backend_url.as_deref()
    }

    pub fn studio_url(&self) -> &str {
        &self.studio_url
    }

    /// The settings a fresh session starts with. Configured defaults go
    /// through the clamping setters, so an out-of-range file value lands in
    /// range instead of poisoning the session.
    pub fn initial_settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.set_duration(self.default_duration_seconds);
        settings.set_tempo(self.default_tempo_bpm);
        settings.set_density(self.default_density);
        settings
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "Cadence", "Cadence")
            .ok_or_else(|| anyhow!("unable to determine config directory"))?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(url) = partial.backend_url {
            self.backend_url = Some(url);
        }
        if let Some(url) = partial.studio_url {
            self.studio_url = url;
        }
        if let Some(duration) = partial.default_duration_seconds {
            self.default_duration_seconds = duration;
        }
        if let Some(tempo) = partial.default_tempo_bpm {
            self.default_tempo_bpm = tempo;
        }
        if let Some(density) = partial.default_density {
            self.default_density = density;
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = env::var(ENV_BACKEND_URL) {
            if value.trim().is_empty() {
                self.backend_url = None;
            } else {
                self.backend_url = Some(value);
            }
        }
        if let Ok(value) = env::var(ENV_STUDIO_URL) {
            if !value.trim().is_empty() {
                self.studio_url = value;
            }
        }
        if let Ok(value) = env::var(ENV_DEFAULT_DURATION) {
            if !value.trim().is_empty() {
                let parsed = value
                    .parse::<u8>()
                    .context("CADENCE_DEFAULT_DURATION must be an integer between 5-60")?;
                self.default_duration_seconds = parsed;
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            studio_url: DEFAULT_STUDIO_URL.into(),
            default_duration_seconds: 15,
            default_tempo_bpm: 90,
            default_density: 0.5,
        }
    }
}

fn config_file_override() -> Result<Option<PathBuf>> {
    if let Some(value) = env::var_os(ENV_CONFIG_PATH) {
        if value.is_empty() {
            return Ok(None);
        }
        let path = PathBuf::from(value);
        if path.is_file() {
            return Ok(Some(path));
        }
        if path.ends_with(CONFIG_FILE_NAME) {
            return Ok(Some(path));
        }
        if path.is_dir() {
            return Ok(Some(path.join(CONFIG_FILE_NAME)));
        }
        return Ok(Some(path));
    }
    Ok(None)
}

fn read_partial(path: &Path) -> Result<PartialConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let partial: PartialConfig =
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(partial)
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PartialConfig {
    backend_url: Option<String>,
    studio_url: Option<String>,
    default_duration_seconds: Option<u8>,
    default_tempo_bpm: Option<u16>,
    default_density: Option<f32>,
}
