use crate::geometry::GeometryStrategy;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the per-instance geometry flags.
    #[serde(default)]
    pub args: Vec<String>,
    /// Process name used to find client windows when raising them.
    #[serde(default = "default_process_name")]
    pub process_name: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub lag_ms: u64,
}

// Logical points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_gap")]
    pub gap: u32,
    #[serde(default = "default_menubar_height")]
    pub menubar_height: u32,
    #[serde(default = "default_titlebar_height")]
    pub titlebar_height: u32,
    #[serde(default = "default_columns")]
    pub columns: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Fixed physical resolution; skips display probing when set.
    #[serde(default)]
    pub override_physical: Option<[u32; 2]>,
    /// Fixed logical resolution, only consulted with `override_physical`.
    #[serde(default)]
    pub override_logical: Option<[u32; 2]>,
    #[serde(default)]
    pub strategy: GeometryStrategy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_term_grace_ms")]
    pub term_grace_ms: u64,
}

fn default_program() -> String {
    "target/release/client".to_string()
}
fn default_process_name() -> String {
    "client".to_string()
}
fn default_window_width() -> u32 {
    1000
}
fn default_window_height() -> u32 {
    600
}
fn default_gap() -> u32 {
    20
}
fn default_menubar_height() -> u32 {
    25
}
fn default_titlebar_height() -> u32 {
    30
}
fn default_columns() -> u32 {
    2
}
fn default_stagger_ms() -> u64 {
    300
}
fn default_settle_ms() -> u64 {
    1000
}
fn default_term_grace_ms() -> u64 {
    500
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: vec![],
            process_name: default_process_name(),
            server: None,
            lag_ms: 0,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            gap: default_gap(),
            menubar_height: default_menubar_height(),
            titlebar_height: default_titlebar_height(),
            columns: default_columns(),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            override_physical: None,
            override_logical: None,
            strategy: GeometryStrategy::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stagger_ms: default_stagger_ms(),
            settle_ms: default_settle_ms(),
            term_grace_ms: default_term_grace_ms(),
        }
    }
}

impl TimingConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn term_grace(&self) -> Duration {
        Duration::from_millis(self.term_grace_ms)
    }
}

/// `$HOME/.config/tilelaunch/config.toml`, or a relative path if `HOME` is unset.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
        .join(".config")
        .join("tilelaunch")
        .join("config.toml")
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.layout.columns == 0 {
            anyhow::bail!("layout.columns must be at least 1");
        }
        if self.layout.window_width == 0 || self.layout.window_height == 0 {
            anyhow::bail!(
                "window size must be positive, got {}x{}",
                self.layout.window_width,
                self.layout.window_height
            );
        }
        if let GeometryStrategy::AssumedScale { factor } = self.geometry.strategy {
            if !(factor.is_finite() && factor > 0.0) {
                anyhow::bail!("assumed scale factor must be positive, got {}", factor);
            }
        }
        if self.client.program.trim().is_empty() {
            anyhow::bail!("client.program must not be empty");
        }
        Ok(())
    }
}
