pub mod toml_config;

use crate::utils::error::{PanelError, Result};
use crate::utils::validation::{validate_positive_millis, Validate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(1);

/// Delay before the first refresh tick and the period between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    pub initial_delay: Duration,
    pub period: Duration,
}

impl RefreshSettings {
    pub fn new(initial_delay: Duration, period: Duration) -> Self {
        Self {
            initial_delay,
            period,
        }
    }

    pub fn every(period: Duration) -> Self {
        Self::new(period, period)
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_DELAY, DEFAULT_REFRESH_PERIOD)
    }
}

impl Validate for RefreshSettings {
    fn validate(&self) -> Result<()> {
        let period_ms = u64::try_from(self.period.as_millis()).unwrap_or(u64::MAX);
        validate_positive_millis("refresh.period_ms", period_ms)
    }
}

/// When a panel's `on_open` hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenHookMode {
    /// Inside `open`, right after the surface is presented.
    #[default]
    Immediate,
    /// On the first open event the host delivers for the surface.
    OnOpenEvent,
}

/// Options for the bundled text render adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub color_escape: char,
    pub legacy_item_encoding: bool,
    pub known_materials: Option<Vec<String>>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            color_escape: '&',
            legacy_item_encoding: false,
            known_materials: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub refresh: RefreshSettings,
    pub open_hook: OpenHookMode,
    pub render: RenderSettings,
}

impl Validate for SessionConfig {
    fn validate(&self) -> Result<()> {
        self.refresh.validate()?;
        if self.render.color_escape.is_whitespace() {
            return Err(PanelError::InvalidConfigValueError {
                field: "render.color_escape".to_string(),
                value: format!("{:?}", self.render.color_escape),
                reason: "Color escape cannot be whitespace".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "grid-panels")]
#[command(about = "Open a demo grid panel, drive refresh ticks and clicks, print the surface")]
pub struct CliConfig {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// User identity the demo session is opened for
    #[arg(long, default_value = "demo-user")]
    pub user: String,

    /// Number of refresh ticks to drive before closing
    #[arg(long, default_value = "3")]
    pub ticks: u64,

    /// Override the refresh period (milliseconds)
    #[arg(long)]
    pub period_ms: Option<u64>,

    /// Slot to click after the ticks ran
    #[arg(long)]
    pub click: Option<usize>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}
