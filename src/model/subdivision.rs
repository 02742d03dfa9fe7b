use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Countries whose ads may target individual subdivisions (states, provinces).
static SUBDIVISION_TARGETING_COUNTRIES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["US", "CA"]));

/// The user's choice in settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubdivisionSelection {
    /// Use the subdivision detected from the network.
    #[default]
    Auto,
    Disabled,
    /// Manually selected subdivision code, e.g. `US-CA`.
    Manual(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SubdivisionSettings {
    /// ISO 3166-1 country of the user's locale, e.g. `US`.
    pub country_code: String,
    #[serde(default)]
    pub auto_detected: Option<String>,
    #[serde(default)]
    pub selection: SubdivisionSelection,
}

impl SubdivisionSettings {
    pub fn is_supported_locale(&self) -> bool {
        SUBDIVISION_TARGETING_COUNTRIES.contains(self.country_code.as_str())
    }

    pub fn is_disabled(&self) -> bool {
        self.selection == SubdivisionSelection::Disabled
    }

    /// The subdivision code in effect, if any.
    pub fn effective_subdivision(&self) -> Option<&str> {
        match &self.selection {
            SubdivisionSelection::Auto => self.auto_detected.as_deref(),
            SubdivisionSelection::Disabled => None,
            SubdivisionSelection::Manual(code) => Some(code.as_str()),
        }
        .filter(|code| !code.is_empty())
    }
}

/// `US-CA` style codes target a subdivision; bare country codes do not.
pub fn is_subdivision_code(geo_target: &str) -> bool {
    geo_target.contains('-')
}

/// The country part of a subdivision code (`US` for `US-CA`).
pub fn country_code_of(subdivision: &str) -> &str {
    subdivision.split('-').next().unwrap_or(subdivision)
}
