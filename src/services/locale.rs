//! # Locale Prompt Tables
//!
//! Every spoken sentence comes from a per-locale prompt table loaded from
//! `<languages_dir>/<locale>.json`. A table maps each [`PromptKey`] to one or more
//! template variants; which variant is spoken is picked at use time.
//!
//! ## Lookup Order:
//! 1. Exact locale tag (`en-GB.json`)
//! 2. Base language (`en.json`)
//! 3. Nothing: the lookup fails and the caller decides what to do
//!
//! ## Validation:
//! Tables are checked when they are loaded. A table that misses a key, or has a key with
//! no variants, is rejected so that picking a prompt can never fail mid-request.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Placeholder replaced with the country name in stream templates.
pub const COUNTRY_PLACEHOLDER: &str = "{country}";

#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("no prompt table for locale {0}")]
    UnknownLocale(String),

    #[error("failed to read prompt table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt table {locale} is not valid JSON: {source}")]
    Json {
        locale: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("prompt table {locale} has no variants for {key:?}")]
    MissingPrompt { locale: String, key: PromptKey },

    #[error("fallback locale {0} is not among the loaded prompt tables")]
    MissingFallback(String),
}

/// Every prompt the skill can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptKey {
    DeviceNotSupported,
    EnableLocationPermissions,
    ErrorFetchingLocation,
    WelcomeMessage,
    WelcomeBackMessage,
    AddressNotAvailable,
    PlayCountryStream,
    PlayDefaultStream,
    CountryStreamAvailable,
    CountryStreamAvailableReprompt,
    Unhandled,
    About,
    AboutReprompt,
    Help,
    HelpReprompt,
    CancelStopMessage,
    Fallback,
    FallbackReprompt,
    Error,
    ErrorReprompt,
}

impl PromptKey {
    pub const ALL: [PromptKey; 20] = [
        PromptKey::DeviceNotSupported,
        PromptKey::EnableLocationPermissions,
        PromptKey::ErrorFetchingLocation,
        PromptKey::WelcomeMessage,
        PromptKey::WelcomeBackMessage,
        PromptKey::AddressNotAvailable,
        PromptKey::PlayCountryStream,
        PromptKey::PlayDefaultStream,
        PromptKey::CountryStreamAvailable,
        PromptKey::CountryStreamAvailableReprompt,
        PromptKey::Unhandled,
        PromptKey::About,
        PromptKey::AboutReprompt,
        PromptKey::Help,
        PromptKey::HelpReprompt,
        PromptKey::CancelStopMessage,
        PromptKey::Fallback,
        PromptKey::FallbackReprompt,
        PromptKey::Error,
        PromptKey::ErrorReprompt,
    ];
}

/// How a variant is chosen when a key has several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSelection {
    /// Uniformly random; the production default.
    #[default]
    Random,
    /// Always the first variant.
    First,
}

/// A single variant or a list of variants.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawVariants {
    One(String),
    Many(Vec<String>),
}

impl From<RawVariants> for Vec<String> {
    fn from(raw: RawVariants) -> Self {
        match raw {
            RawVariants::One(text) => vec![text],
            RawVariants::Many(texts) => texts,
        }
    }
}

/// Immutable prompt templates for one locale.
#[derive(Debug, Clone)]
pub struct PromptTable {
    locale: String,
    prompts: HashMap<PromptKey, Vec<String>>,
    selection: TemplateSelection,
}

impl PromptTable {
    /// Parse and validate a table from its JSON text.
    pub fn from_json(
        locale: &str,
        raw: &str,
        selection: TemplateSelection,
    ) -> Result<Self, LocaleError> {
        let parsed: HashMap<PromptKey, RawVariants> =
            serde_json::from_str(raw).map_err(|source| LocaleError::Json {
                locale: locale.to_string(),
                source,
            })?;
        let prompts: HashMap<PromptKey, Vec<String>> = parsed
            .into_iter()
            .map(|(key, raw)| {
                let variants: Vec<String> = raw.into();
                let variants = variants
                    .into_iter()
                    .filter(|text| !text.trim().is_empty())
                    .collect();
                (key, variants)
            })
            .collect();

        for key in PromptKey::ALL {
            if prompts.get(&key).map_or(true, |variants| variants.is_empty()) {
                return Err(LocaleError::MissingPrompt {
                    locale: locale.to_string(),
                    key,
                });
            }
        }

        Ok(Self {
            locale: locale.to_string(),
            prompts,
            selection,
        })
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Pick one variant for `key`.
    pub fn pick(&self, key: PromptKey) -> &str {
        // Every key is guaranteed non-empty by `from_json`.
        let variants = &self.prompts[&key];
        match self.selection {
            TemplateSelection::First => &variants[0],
            TemplateSelection::Random => variants
                .choose(&mut rand::thread_rng())
                .map(String::as_str)
                .unwrap_or(&variants[0]),
        }
    }

    /// Pick a variant and substitute the country name.
    pub fn pick_with_country(&self, key: PromptKey, country: &str) -> String {
        self.pick(key).replace(COUNTRY_PLACEHOLDER, country)
    }

    /// All variants for `key`, in file order.
    pub fn variants(&self, key: PromptKey) -> &[String] {
        &self.prompts[&key]
    }
}

/// Locale tag → prompt table, with base-language fallback.
#[derive(Debug, Clone)]
pub struct LocaleTextProvider {
    tables: HashMap<String, Arc<PromptTable>>,
    fallback: Arc<PromptTable>,
}

impl LocaleTextProvider {
    /// Load every `*.json` file in `dir`. The file stem is the locale tag.
    pub fn load_dir(
        dir: impl AsRef<Path>,
        fallback_locale: &str,
        selection: TemplateSelection,
    ) -> Result<Self, LocaleError> {
        let dir = dir.as_ref();
        let io_err = |source: std::io::Error| LocaleError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut tables = HashMap::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(locale) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path).map_err(|source| LocaleError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let table = PromptTable::from_json(locale, &raw, selection)?;
            debug!(locale = %locale, "Loaded prompt table");
            tables.insert(normalize(locale), table);
        }

        let provider = Self::from_tables(tables, fallback_locale)?;
        info!(
            locales = ?provider.locales(),
            fallback = %fallback_locale,
            "Prompt tables loaded"
        );
        Ok(provider)
    }

    pub fn from_tables(
        tables: HashMap<String, PromptTable>,
        fallback_locale: &str,
    ) -> Result<Self, LocaleError> {
        let tables: HashMap<String, Arc<PromptTable>> = tables
            .into_iter()
            .map(|(locale, table)| (normalize(&locale), Arc::new(table)))
            .collect();
        let fallback = tables
            .get(&normalize(fallback_locale))
            .cloned()
            .ok_or_else(|| LocaleError::MissingFallback(fallback_locale.to_string()))?;
        Ok(Self { tables, fallback })
    }

    /// Table for `locale`, trying the exact tag and then the base language.
    pub fn templates(&self, locale: &str) -> Result<Arc<PromptTable>, LocaleError> {
        let exact = normalize(locale);
        if let Some(table) = self.tables.get(&exact) {
            return Ok(table.clone());
        }
        let base = exact.split('-').next().unwrap_or_default();
        self.tables
            .get(base)
            .cloned()
            .ok_or_else(|| LocaleError::UnknownLocale(locale.to_string()))
    }

    /// Table used when the request locale cannot be resolved.
    pub fn fallback(&self) -> Arc<PromptTable> {
        self.fallback.clone()
    }

    pub fn locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self.tables.keys().cloned().collect();
        locales.sort();
        locales
    }
}

/// `en_US` and `EN-us` both become `en-us`.
fn normalize(locale: &str) -> String {
    locale.trim().replace('_', "-").to_lowercase()
}
