//! # Stream Catalog
//!
//! Maps ISO country codes to the live stream that should be played for listeners in that
//! country. The catalog is read once from a JSON document at startup and never changes
//! afterwards, so it can be shared between workers behind an `Arc` without locking.
//!
//! ## File Format:
//! ```json
//! {
//!   "default": {
//!     "country_name": "International",
//!     "stream_title": "Radio Global",
//!     "stream_subtitle": "Music from around the world",
//!     "stream_url": "https://streams.example.com/global/live.aac",
//!     "album_art": "https://static.example.com/art/global-512.png",
//!     "background_image": "https://static.example.com/bg/global-1024.png"
//!   },
//!   "FR": { "...": "..." }
//! }
//! ```
//!
//! The `"default"` entry is mandatory. Every field of every entry must be non-empty;
//! a catalog with a partial entry is rejected at load time instead of producing a
//! half-filled play directive later.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Key of the entry played when no localized stream applies.
pub const DEFAULT_ENTRY: &str = "default";

/// Errors raised while loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read stream catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stream catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stream catalog has no \"default\" entry")]
    MissingDefault,

    #[error("stream catalog entry {code} has an empty {field}")]
    IncompleteEntry { code: String, field: &'static str },
}

/// One playable stream and its display metadata.
///
/// Two descriptors are the same stream when their `stream_url` matches; the display
/// fields are not part of the identity. This is what lets a stored preference be
/// recognized as "still on the default stream" even if the catalog copy was edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDescriptor {
    #[serde(default)]
    pub country_code: String,
    pub country_name: String,
    #[serde(rename = "stream_title")]
    pub title: String,
    #[serde(rename = "stream_subtitle")]
    pub subtitle: String,
    pub stream_url: String,
    #[serde(rename = "album_art")]
    pub album_art_url: String,
    #[serde(rename = "background_image")]
    pub background_image_url: String,
}

impl PartialEq for StreamDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.stream_url == other.stream_url
    }
}

impl Eq for StreamDescriptor {}

impl StreamDescriptor {
    /// Name of the first empty field, if any.
    fn first_empty_field(&self) -> Option<&'static str> {
        [
            ("country_name", &self.country_name),
            ("stream_title", &self.title),
            ("stream_subtitle", &self.subtitle),
            ("stream_url", &self.stream_url),
            ("album_art", &self.album_art_url),
            ("background_image", &self.background_image_url),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

/// Country code → stream lookup with a guaranteed default entry.
#[derive(Debug, Clone)]
pub struct StreamCatalog {
    entries: HashMap<String, StreamDescriptor>,
    default: StreamDescriptor,
}

impl StreamCatalog {
    /// Load and validate the catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a catalog document.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let parsed: HashMap<String, StreamDescriptor> = serde_json::from_str(raw)?;
        Self::from_entries(parsed)
    }

    pub fn from_entries(
        entries: HashMap<String, StreamDescriptor>,
    ) -> Result<Self, CatalogError> {
        let mut normalized = HashMap::with_capacity(entries.len());
        for (code, mut descriptor) in entries {
            if let Some(field) = descriptor.first_empty_field() {
                return Err(CatalogError::IncompleteEntry { code, field });
            }
            let key = if code == DEFAULT_ENTRY {
                code
            } else {
                code.to_uppercase()
            };
            descriptor.country_code = key.clone();
            normalized.insert(key, descriptor);
        }

        let default = normalized
            .remove(DEFAULT_ENTRY)
            .ok_or(CatalogError::MissingDefault)?;

        Ok(Self {
            entries: normalized,
            default,
        })
    }

    /// Localized stream for a country, `None` when the country has no station.
    ///
    /// Looking up `"default"` returns the default entry.
    pub fn lookup(&self, country_code: &str) -> Option<&StreamDescriptor> {
        if country_code == DEFAULT_ENTRY {
            return Some(&self.default);
        }
        self.entries.get(&country_code.trim().to_uppercase())
    }

    pub fn default_stream(&self) -> &StreamDescriptor {
        &self.default
    }

    pub fn is_default(&self, descriptor: &StreamDescriptor) -> bool {
        *descriptor == self.default
    }

    /// Number of localized entries (the default entry is not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
