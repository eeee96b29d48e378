//! Lenient decoding for legacy records.
//!
//! Legacy JSON written by older releases stores numbers as strings and
//! strings as numbers interchangeably; these helpers accept either.

use serde::{Deserialize, Deserializer};
use serde::de::Error;

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

/// Accept a string, number, boolean or null as a string.
pub fn as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        None => String::new(),
        Some(Scalar::Text(s)) => s,
        Some(Scalar::Number(n)) => n.to_string(),
        Some(Scalar::Flag(b)) => b.to_string(),
    })
}

/// Accept a number or numeric string as `u64`; null and "" become zero.
pub fn as_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Scalar::Text(s)) if s.trim().is_empty() => Ok(0),
        Some(Scalar::Text(s)) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expected a number, got {:?}", s))),
        Some(Scalar::Number(n)) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("expected an unsigned integer, got {}", n))),
        Some(Scalar::Flag(b)) => Err(D::Error::custom(format!("expected a number, got {}", b))),
    }
}

/// Accept a boolean, "true"/"false", or 0/1.
pub fn as_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Scalar::Flag(b)) => Ok(b),
        Some(Scalar::Text(s)) => Ok(matches!(s.trim(), "true" | "1")),
        Some(Scalar::Number(n)) => Ok(n.as_u64().unwrap_or(0) != 0),
    }
}
