use crate::config::{OpenHookMode, RefreshSettings, RenderSettings, SessionConfig};
use crate::utils::error::{PanelError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_positive_millis, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub refresh: Option<RefreshConfig>,
    pub router: Option<RouterConfig>,
    pub render: Option<RenderConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub initial_delay_ms: Option<u64>,
    pub period_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub open_hook: Option<OpenHookMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub color_escape: Option<String>,
    pub legacy_item_encoding: Option<bool>,
    pub known_materials: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub json: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${PANEL_PERIOD_MS})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| PanelError::configuration(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        let defaults = RefreshSettings::default();
        let Some(refresh) = &self.refresh else {
            return defaults;
        };
        RefreshSettings {
            initial_delay: refresh
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            period: refresh
                .period_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.period),
        }
    }

    pub fn open_hook(&self) -> OpenHookMode {
        self.router
            .as_ref()
            .and_then(|router| router.open_hook)
            .unwrap_or_default()
    }

    pub fn render_settings(&self) -> Result<RenderSettings> {
        let defaults = RenderSettings::default();
        let Some(render) = &self.render else {
            return Ok(defaults);
        };

        let color_escape = match render.color_escape.as_deref() {
            None => defaults.color_escape,
            Some(raw) => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(escape), None) => escape,
                    _ => {
                        return Err(PanelError::InvalidConfigValueError {
                            field: "render.color_escape".to_string(),
                            value: raw.to_string(),
                            reason: "Color escape must be exactly one character".to_string(),
                        })
                    }
                }
            }
        };

        Ok(RenderSettings {
            color_escape,
            legacy_item_encoding: render
                .legacy_item_encoding
                .unwrap_or(defaults.legacy_item_encoding),
            known_materials: render.known_materials.clone(),
        })
    }

    pub fn log_json(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|logging| logging.json)
            .unwrap_or(false)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|logging| logging.level.as_deref())
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        let config = SessionConfig {
            refresh: self.refresh_settings(),
            open_hook: self.open_hook(),
            render: self.render_settings()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        if let Some(period) = self.refresh.as_ref().and_then(|r| r.period_ms) {
            validate_positive_millis("refresh.period_ms", period)?;
        }

        if let Some(materials) = self.render.as_ref().and_then(|r| r.known_materials.as_ref()) {
            for material in materials {
                validate_non_empty_string("render.known_materials", material)?;
            }
        }

        if let Some(level) = self.log_level() {
            let valid_levels = ["trace", "debug", "info", "warn", "error"];
            if !valid_levels.contains(&level) {
                return Err(PanelError::InvalidConfigValueError {
                    field: "logging.level".to_string(),
                    value: level.to_string(),
                    reason: format!("Valid levels: {}", valid_levels.join(", ")),
                });
            }
        }

        self.session_config().map(|_| ())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
