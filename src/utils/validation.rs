use crate::utils::error::{PanelError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(PanelError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_multiple_of(field_name: &str, value: usize, step: usize) -> Result<()> {
    if step == 0 || value % step != 0 {
        return Err(PanelError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be a multiple of {}", step),
        });
    }
    Ok(())
}

pub fn validate_positive_millis(field_name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(PanelError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Duration must be greater than zero".to_string(),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PanelError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}
