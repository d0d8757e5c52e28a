//! User-facing request settings: unit system and response language
//!
//! The gateway owns the only mutable copy. Presentation code reads it through
//! [`crate::gateway::WeatherGateway::settings`], so the degree label it shows
//! always matches the units of the last request.

use crate::cache::{CacheStore, LANG_KEY, UNITS_KEY};
use crate::data::UnitGroup;

/// Language used when nothing else is configured
pub const DEFAULT_LANG: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    units: UnitGroup,
    lang: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(UnitGroup::default(), DEFAULT_LANG)
    }
}

impl Settings {
    pub fn new(units: UnitGroup, lang: impl Into<String>) -> Self {
        let lang = lang.into();
        let lang = if lang.trim().is_empty() {
            DEFAULT_LANG.to_string()
        } else {
            lang.trim().to_string()
        };
        Self { units, lang }
    }

    pub fn units(&self) -> UnitGroup {
        self.units
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Degree label for the current unit system
    pub fn degree_unit(&self) -> &'static str {
        self.units.degree_unit()
    }

    /// Changes the unit system and persists it when a cache is attached
    pub(crate) fn set_units(&mut self, units: UnitGroup, cache: Option<&dyn CacheStore>) {
        self.units = units;
        if let Some(cache) = cache {
            cache.put_string(UNITS_KEY, units.as_str());
        }
    }

    /// Changes the response language and persists it when a cache is attached
    ///
    /// Blank tags are ignored.
    pub(crate) fn set_lang(&mut self, lang: &str, cache: Option<&dyn CacheStore>) {
        let lang = lang.trim();
        if lang.is_empty() {
            tracing::warn!("Ignoring empty language tag");
            return;
        }
        self.lang = lang.to_string();
        if let Some(cache) = cache {
            cache.put_string(LANG_KEY, lang);
        }
    }

    /// Loads previously persisted values from the cache, keeping the current
    /// value for anything missing or unreadable
    pub(crate) fn restore(&mut self, cache: &dyn CacheStore) {
        if let Some(lang) = cache.get_string(LANG_KEY) {
            if !lang.trim().is_empty() {
                self.lang = lang.trim().to_string();
            }
        }
        if let Some(units) = cache.get_string(UNITS_KEY) {
            match units.parse() {
                Ok(units) => self.units = units,
                Err(e) => tracing::warn!("Ignoring persisted units: {}", e),
            }
        }
        tracing::debug!("Current settings: units={}, lang={}", self.units, self.lang);
    }
}
