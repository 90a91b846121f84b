//! Device URI parsing.
//!
//! Devices are addressed by a URI-like string rather than a vendor API:
//!
//! ```text
//! scheme://url?key=value&key2=value2
//! scheme:[key=value,key2=value2]//url
//! ```
//!
//! The `url` remainder is opaque to the registry and may itself be a complete
//! device URI (`convert:[fmt=RGB8]//file://frames/*.pgm`). A nested remainder
//! owns its own query string, so query parameters are only parsed when the
//! remainder is a plain resource. Bracket parameters always bind to the level
//! they are written on.

use crate::error::{HalError, HalResult};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A parsed device URI. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    /// Selects the factory or alias (case-sensitive)
    pub scheme: String,
    /// Everything after `//`, including any query text
    pub url: String,
    /// Bracket and query parameters; query values win on duplicate keys
    pub params: BTreeMap<String, String>,
    raw: String,
}

impl Uri {
    /// Parse a device string.
    ///
    /// # Errors
    /// Returns [`HalError::InvalidUri`] when the scheme or `//` separator is
    /// missing, or when a bracket parameter list is malformed.
    pub fn parse(input: &str) -> HalResult<Self> {
        let invalid = |reason: &str| HalError::InvalidUri {
            uri: input.to_string(),
            reason: reason.to_string(),
        };

        let colon = input.find(':').ok_or_else(|| invalid("missing scheme"))?;
        let scheme = &input[..colon];
        if scheme.is_empty() {
            return Err(invalid("missing scheme"));
        }
        if !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.'))
        {
            return Err(invalid("scheme contains invalid characters"));
        }

        let mut params = BTreeMap::new();
        let mut rest = &input[colon + 1..];

        if let Some(list) = rest.strip_prefix('[') {
            let close = list
                .find(']')
                .ok_or_else(|| invalid("unterminated parameter list"))?;
            for item in list[..close].split(',').map(str::trim) {
                if item.is_empty() {
                    continue;
                }
                let (key, value) = item
                    .split_once('=')
                    .ok_or_else(|| invalid("parameter without '='"))?;
                params.insert(key.trim().to_string(), value.trim().to_string());
            }
            rest = &list[close + 1..];
        }

        let url = rest
            .strip_prefix("//")
            .ok_or_else(|| invalid("expected '//' after scheme"))?;

        if !is_nested(url) {
            if let Some((_, query)) = url.split_once('?') {
                for pair in query.split('&').filter(|p| !p.is_empty()) {
                    match pair.split_once('=') {
                        Some((key, value)) => params.insert(key.to_string(), value.to_string()),
                        None => params.insert(pair.to_string(), "true".to_string()),
                    };
                }
            }
        }

        Ok(Self {
            scheme: scheme.to_string(),
            url: url.to_string(),
            params,
            raw: input.to_string(),
        })
    }

    /// The string this URI was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the remainder is itself a device URI.
    pub fn is_nested(&self) -> bool {
        is_nested(&self.url)
    }

    /// The remainder without its query string.
    ///
    /// Nested remainders are returned whole since their query belongs to the
    /// inner URI.
    pub fn resource(&self) -> &str {
        if self.is_nested() {
            return &self.url;
        }
        match self.url.split_once('?') {
            Some((resource, _)) => resource,
            None => &self.url,
        }
    }

    /// Raw parameter lookup.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Typed parameter lookup with a default for absent keys.
    ///
    /// # Errors
    /// Returns [`HalError::Construction`] if the value is present but does not parse.
    pub fn param_or<T>(&self, name: &str, default: T) -> HalResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.param(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| {
                HalError::construction(self, format!("invalid value '{value}' for '{name}': {e}"))
            }),
        }
    }

    /// Boolean parameter lookup accepting `1/0`, `true/false`, `yes/no`, `on/off`.
    ///
    /// # Errors
    /// Returns [`HalError::Construction`] for any other spelling.
    pub fn flag_or(&self, name: &str, default: bool) -> HalResult<bool> {
        match self.param(name).map(str::to_ascii_lowercase).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(HalError::construction(
                self,
                format!("invalid boolean '{other}' for '{name}'"),
            )),
        }
    }
}

fn is_nested(url: &str) -> bool {
    let head = url.split('?').next().unwrap_or(url);
    head.contains("://") || head.contains(":[")
}

impl FromStr for Uri {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
