use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("A panel session is already open for user {user}")]
    AlreadyOpenError { user: String },

    #[error("Render error at slot {slot}: {message}")]
    RenderError { slot: usize, message: String },

    #[error("Callback {hook} failed: {message}")]
    CallbackError { hook: String, message: String },

    #[error("Host error: {message}")]
    HostError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Session,
    Render,
    Callback,
    Host,
    System,
}

impl PanelError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::TomlError(_) => ErrorCategory::Configuration,
            Self::AlreadyOpenError { .. } => ErrorCategory::Session,
            Self::RenderError { .. } => ErrorCategory::Render,
            Self::CallbackError { .. } => ErrorCategory::Callback,
            Self::HostError { .. } => ErrorCategory::Host,
            Self::IoError(_) => ErrorCategory::System,
        }
    }

    /// 給終端使用者看的簡短訊息
    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Invalid panel configuration: {}", self),
            ErrorCategory::Session => "That user already has a panel open".to_string(),
            ErrorCategory::Render => format!("Panel could not be drawn: {}", self),
            ErrorCategory::Callback => format!("A panel handler failed: {}", self),
            ErrorCategory::Host => format!("The host rejected the panel: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            PanelError::configuration("bad size").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            PanelError::AlreadyOpenError {
                user: "u1".to_string()
            }
            .category(),
            ErrorCategory::Session
        );
        assert_eq!(
            PanelError::RenderError {
                slot: 3,
                message: "unknown material".to_string()
            }
            .category(),
            ErrorCategory::Render
        );
    }

    #[test]
    fn test_render_error_message_names_slot() {
        let err = PanelError::RenderError {
            slot: 7,
            message: "unknown material token 'FOO'".to_string(),
        };
        assert!(err.to_string().contains("slot 7"));
        assert!(err.user_friendly_message().contains("FOO"));
    }
}
