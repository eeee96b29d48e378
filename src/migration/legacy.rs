//! Legacy JSON configuration files.

use std::path::Path;

use thiserror::Error;

use crate::store::Configure;

/// Why a legacy file could not be imported.
#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("cannot read legacy config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot decode legacy config: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("legacy config is invalid: {0}")]
    Invalid(String),
}

/// Read, decode and validate a legacy JSON configuration file.
pub fn read_legacy(path: &Path) -> Result<Configure, LegacyError> {
    let bytes = std::fs::read(path)?;
    let configure: Configure = serde_json::from_slice(&bytes)?;
    validate(&configure)?;
    Ok(configure)
}

/// Semantic checks serde cannot express.
pub fn validate(configure: &Configure) -> Result<(), LegacyError> {
    configure.setting.check_intervals().map_err(LegacyError::Invalid)?;

    if let Some(sub) = configure.subscriptions.iter().find(|s| s.address.trim().is_empty()) {
        return Err(LegacyError::Invalid(format!(
            "subscription {:?} has no address",
            sub.remarks
        )));
    }
    Ok(())
}
