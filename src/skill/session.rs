//! # Listener Session State
//!
//! A listener's position in the audio protocol is never stored as such. It follows from
//! two pieces of data:
//! - the durable [`ListenerPreference`](crate::services::preferences::ListenerPreference),
//!   read from the preference store;
//! - the [`SessionAttributes`] bag that the platform echoes back on every request of the
//!   same spoken session, which carries a pending offer.
//!
//! Handlers report the state they moved the listener into so routing logs (and tests)
//! can follow the protocol.
//!
//! ## Transitions:
//! ```text
//! NoHistory ──SessionStart──▶ Playing
//! HasHistory_OnLocalized ──SessionStart──▶ Playing
//! HasHistory_OnDefault ──SessionStart──▶ OfferPending | Playing
//! OfferPending ──Affirm/Decline──▶ Playing
//! Playing ──Pause/PlaybackStopped──▶ Paused ──Resume──▶ Playing
//! any ──Stop──▶ Ended
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No stored preference.
    NoHistory,
    /// Stored preference is the default stream.
    HasHistoryOnDefault,
    /// Stored preference is a localized stream.
    HasHistoryOnLocalized,
    /// A localized stream was offered; waiting for yes or no.
    OfferPending,
    Playing,
    Paused,
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::NoHistory => "no_history",
            SessionState::HasHistoryOnDefault => "has_history_on_default",
            SessionState::HasHistoryOnLocalized => "has_history_on_localized",
            SessionState::OfferPending => "offer_pending",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-scoped attributes round-tripped through the platform.
///
/// `offer` names the candidate station between the offer prompt and the listener's
/// answer. Unknown attributes are preserved as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionOffer>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionAttributes {
    pub fn with_offer(country_code: impl Into<String>) -> Self {
        Self {
            offer: Some(SessionOffer {
                country_code: country_code.into(),
            }),
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.offer.is_none() && self.extra.is_empty()
    }
}

/// A station proposed to the listener, pending confirmation.
///
/// Only the catalog key travels through the platform. The descriptor is looked up
/// again when the listener says yes, so the attributes never decide what gets played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOffer {
    #[serde(default)]
    pub country_code: String,
}
