//! Per-call locale/timezone/geolocation descriptor
//!
//! A fresh [`Context`] is produced for every `exec` and sent to the engine
//! as `{locale?, timezone?, coordinates?}`. Nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// (latitude, longitude)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(f64, f64)>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.coordinates = Some((latitude, longitude));
        self
    }

    /// Fields set in `overrides` win; unset ones fall back to `self`.
    pub fn merged_with(self, overrides: &Context) -> Self {
        Self {
            locale: overrides.locale.clone().or(self.locale),
            timezone: overrides.timezone.clone().or(self.timezone),
            coordinates: overrides.coordinates.or(self.coordinates),
        }
    }
}

/// Source of the per-call context. Implementations must be side-effect free.
pub trait ContextProvider: Send + Sync {
    fn context(&self) -> Context;
}

/// Always returns the same descriptor.
#[derive(Debug, Clone, Default)]
pub struct FixedContext(pub Context);

impl ContextProvider for FixedContext {
    fn context(&self) -> Context {
        self.0.clone()
    }
}

/// Reads locale and timezone from the process environment on every call,
/// then applies configured overrides.
///
/// Locale comes from the first non-empty of `LC_ALL`, `LC_MESSAGES`, `LANG`,
/// converted from POSIX form (`en_US.UTF-8`) to a language tag (`en-US`).
/// Timezone comes from `TZ`.
#[derive(Debug, Clone, Default)]
pub struct SystemContext {
    overrides: Context,
}

impl SystemContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: Context) -> Self {
        Self { overrides }
    }
}

impl ContextProvider for SystemContext {
    fn context(&self) -> Context {
        Context {
            locale: system_locale(),
            timezone: system_timezone(),
            coordinates: None,
        }
        .merged_with(&self.overrides)
    }
}

fn system_locale() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty())
        .and_then(|value| posix_to_language_tag(&value))
}

fn system_timezone() -> Option<String> {
    env::var("TZ")
        .ok()
        .map(|tz| tz.trim_start_matches(':').to_string())
        .filter(|tz| !tz.is_empty())
}

/// `en_US.UTF-8@euro` -> `en-US`. `C` and `POSIX` carry no locale.
fn posix_to_language_tag(value: &str) -> Option<String> {
    let base = value.split(['.', '@']).next().unwrap_or_default();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}
