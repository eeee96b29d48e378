//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays > 0, concurrency > 0)
//! - Check that remote endpoints are well-formed URLs
//! - Detect assets that would install over each other
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DaemonConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::fmt;
use url::Url;

use crate::config::schema::DaemonConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &DaemonConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.readiness.probe_host.trim().is_empty() {
        errors.push(ValidationError::new("readiness.probe_host", "must not be empty"));
    }
    if config.readiness.retry_delay_secs == 0 {
        errors.push(ValidationError::new("readiness.retry_delay_secs", "must be greater than zero"));
    }

    check_url(&mut errors, "assets.tag_api_base", &config.assets.tag_api_base);
    check_url(&mut errors, "assets.mirror_base", &config.assets.mirror_base);
    check_url(&mut errors, "updates.release_api_url", &config.updates.release_api_url);

    let mut local_names = HashSet::new();
    for asset in &config.assets.required {
        if asset.repo.is_empty() || asset.filename.is_empty() || asset.local_name.is_empty() {
            errors.push(ValidationError::new(
                "assets.required",
                format!("incomplete asset entry {:?}", asset.repo),
            ));
        }
        if !local_names.insert(asset.local_name.as_str()) {
            errors.push(ValidationError::new(
                "assets.required",
                format!("duplicate local name {}", asset.local_name),
            ));
        }
    }

    if config.updates.subscription_concurrency == 0 {
        errors.push(ValidationError::new("updates.subscription_concurrency", "must be greater than zero"));
    }
    if config.updates.version_check_period_hours == 0 {
        errors.push(ValidationError::new("updates.version_check_period_hours", "must be greater than zero"));
    }
    if config.engine.binary_path.is_empty() {
        errors.push(ValidationError::new("engine.binary_path", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if let Err(e) = Url::parse(value) {
        errors.push(ValidationError::new(field, format!("invalid URL {:?}: {}", value, e)));
    }
}
