//! # Audio Session State Machine
//!
//! Decides which stream a listener hears, whether to offer a newly localized stream,
//! and which player directives go out for launch, yes/no answers, pause and resume.
//!
//! ## Collaborator Calls:
//! - Geolocation runs once per session start, bounded by `geolocation_timeout`.
//! - The preference store is read at most once and written at most once per event,
//!   each call bounded by `store_timeout`.
//! - A write only happens after every other step of the branch has succeeded.
//!
//! ## Failures:
//! Location problems are expected (permissions, devices without an address) and end
//! the session with a dedicated prompt. Store problems are not, so they surface as a
//! [`HandlerFault`] and the router answers with its generic apology.

use crate::services::catalog::{StreamCatalog, StreamDescriptor};
use crate::services::geolocation::{DeviceAddress, GeoError, Geolocator};
use crate::services::locale::{PromptKey, PromptTable};
use crate::services::preferences::{ListenerPreference, PreferenceStore, StoreError};
use crate::skill::event::Event;
use crate::skill::response::SkillResponse;
use crate::skill::session::{SessionAttributes, SessionState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Unexpected failure inside a handler. Caught by the router.
#[derive(Debug, Error)]
pub enum HandlerFault {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("affirmative answer without a pending offer")]
    NoPendingOffer,

    #[error("listener {0} has no stored stream")]
    NoStoredPreference(String),
}

/// A handler's answer plus the state it moved the listener into.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub response: SkillResponse,
    /// `None` when the event does not change the listener's state.
    pub state: Option<SessionState>,
}

impl Transition {
    pub fn to(state: SessionState, response: SkillResponse) -> Self {
        Self {
            response,
            state: Some(state),
        }
    }

    pub fn unchanged(response: SkillResponse) -> Self {
        Self {
            response,
            state: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub store_timeout: Duration,
    pub geolocation_timeout: Duration,
    pub location_permission: String,
}

/// Collaborators used by the stateful handlers.
#[derive(Clone)]
pub struct PlaybackMachine {
    catalog: Arc<StreamCatalog>,
    preferences: Arc<dyn PreferenceStore>,
    geolocator: Arc<dyn Geolocator>,
    settings: PlaybackSettings,
}

impl PlaybackMachine {
    pub fn new(
        catalog: Arc<StreamCatalog>,
        preferences: Arc<dyn PreferenceStore>,
        geolocator: Arc<dyn Geolocator>,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            catalog,
            preferences,
            geolocator,
            settings,
        }
    }

    pub fn catalog(&self) -> &StreamCatalog {
        &self.catalog
    }

    pub fn store_backend(&self) -> &'static str {
        self.preferences.backend()
    }

    /// Launch: locate the device, then start or offer a stream.
    pub async fn session_start(
        &self,
        event: &Event,
        prompts: &PromptTable,
    ) -> Result<Transition, HandlerFault> {
        let address = match self.locate(event).await {
            Ok(address) => address,
            Err(GeoError::PermissionDenied) => {
                info!(listener_id = %event.listener_id, "Address permission missing, asking for consent");
                return Ok(Transition::to(
                    SessionState::NoHistory,
                    SkillResponse::silent()
                        .speak(prompts.pick(PromptKey::EnableLocationPermissions))
                        .permission_card(self.settings.location_permission.clone())
                        .end_session(),
                ));
            }
            Err(err) => {
                warn!(listener_id = %event.listener_id, error = %err, "Device address lookup failed");
                return Ok(Transition::to(
                    SessionState::NoHistory,
                    SkillResponse::silent()
                        .speak(prompts.pick(PromptKey::ErrorFetchingLocation))
                        .end_session(),
                ));
            }
        };

        match self.load(&event.listener_id).await? {
            None => self.first_visit(event, prompts, &address).await,
            Some(preference) => Ok(self.returning_visit(prompts, &address, preference)),
        }
    }

    async fn first_visit(
        &self,
        event: &Event,
        prompts: &PromptTable,
        address: &DeviceAddress,
    ) -> Result<Transition, HandlerFault> {
        let default = self.catalog.default_stream();
        let (stream, detail) = match address.country() {
            None => (default, prompts.pick(PromptKey::AddressNotAvailable).to_string()),
            Some(code) => match self.catalog.lookup(code) {
                Some(stream) => (
                    stream,
                    prompts.pick_with_country(PromptKey::PlayCountryStream, &stream.country_name),
                ),
                None => {
                    debug!(country = %code, "No localized stream, using default");
                    (default, prompts.pick(PromptKey::PlayDefaultStream).to_string())
                }
            },
        };
        let speech = join_speech(prompts.pick(PromptKey::WelcomeMessage), &detail);

        self.save(&event.listener_id, stream).await?;
        info!(
            listener_id = %event.listener_id,
            country = %stream.country_code,
            "First stream selected"
        );

        Ok(Transition::to(
            SessionState::Playing,
            SkillResponse::silent().speak(speech).play(stream).end_session(),
        ))
    }

    fn returning_visit(
        &self,
        prompts: &PromptTable,
        address: &DeviceAddress,
        preference: ListenerPreference,
    ) -> Transition {
        let welcome = prompts.pick(PromptKey::WelcomeBackMessage);
        let history = if self.catalog.is_default(&preference.stream) {
            SessionState::HasHistoryOnDefault
        } else {
            SessionState::HasHistoryOnLocalized
        };
        debug!(listener_id = %preference.listener_id, state = %history, "Returning listener");

        if let Some(candidate) = self.localized_upgrade(address, &preference.stream) {
            let speech = join_speech(
                welcome,
                &prompts.pick_with_country(
                    PromptKey::CountryStreamAvailable,
                    &candidate.country_name,
                ),
            );
            info!(
                listener_id = %preference.listener_id,
                country = %candidate.country_code,
                "Offering localized stream"
            );
            return Transition::to(
                SessionState::OfferPending,
                SkillResponse::silent()
                    .speak(speech)
                    .ask(prompts.pick(PromptKey::CountryStreamAvailableReprompt))
                    .attributes(SessionAttributes::with_offer(candidate.country_code.clone())),
            );
        }

        Transition::to(
            SessionState::Playing,
            SkillResponse::silent()
                .speak(welcome)
                .play(&preference.stream)
                .end_session(),
        )
    }

    /// Localized stream worth offering to a listener still on the default stream.
    fn localized_upgrade(
        &self,
        address: &DeviceAddress,
        stored: &StreamDescriptor,
    ) -> Option<&StreamDescriptor> {
        if !self.catalog.is_default(stored) {
            return None;
        }
        let code = address.country()?;
        self.catalog
            .lookup(code)
            .filter(|candidate| !self.catalog.is_default(candidate))
    }

    /// "Yes" to an offer: the offered stream becomes the preference.
    ///
    /// The offer only names a catalog key. It has to resolve to a localized entry, and
    /// the listener must already have a stored stream, as offers are only made to
    /// returning listeners.
    pub async fn affirm(&self, event: &Event) -> Result<Transition, HandlerFault> {
        let code = event
            .attributes
            .offer
            .as_ref()
            .map(|offer| offer.country_code.as_str())
            .ok_or(HandlerFault::NoPendingOffer)?;
        let stream = self
            .catalog
            .lookup(code)
            .filter(|stream| !self.catalog.is_default(stream))
            .ok_or_else(|| {
                warn!(
                    listener_id = %event.listener_id,
                    country = %code,
                    "Offer does not name a localized stream"
                );
                HandlerFault::NoPendingOffer
            })?;

        if self.load(&event.listener_id).await?.is_none() {
            return Err(HandlerFault::NoStoredPreference(event.listener_id.clone()));
        }

        self.save(&event.listener_id, stream).await?;
        info!(
            listener_id = %event.listener_id,
            country = %stream.country_code,
            "Offer accepted"
        );

        Ok(Transition::to(
            SessionState::Playing,
            SkillResponse::silent().play(stream).end_session(),
        ))
    }

    /// "No" to an offer: keep the stored stream, discard the offer.
    pub async fn decline(&self, event: &Event) -> Result<Transition, HandlerFault> {
        if event.attributes.offer.is_some() {
            debug!(listener_id = %event.listener_id, "Offer declined");
        }
        self.replay_stored(event).await
    }

    pub async fn resume(&self, event: &Event) -> Result<Transition, HandlerFault> {
        self.replay_stored(event).await
    }

    /// Pause intent, controller pause, or a stopped player.
    pub fn pause(&self) -> Transition {
        Transition::to(
            SessionState::Paused,
            SkillResponse::silent().stop().end_session(),
        )
    }

    async fn replay_stored(&self, event: &Event) -> Result<Transition, HandlerFault> {
        let preference = self
            .load(&event.listener_id)
            .await?
            .ok_or_else(|| HandlerFault::NoStoredPreference(event.listener_id.clone()))?;

        Ok(Transition::to(
            SessionState::Playing,
            SkillResponse::silent()
                .play(&preference.stream)
                .end_session(),
        ))
    }

    async fn locate(&self, event: &Event) -> Result<DeviceAddress, GeoError> {
        let lookup = event.device_lookup();
        match tokio::time::timeout(
            self.settings.geolocation_timeout,
            self.geolocator.resolve(&lookup),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GeoError::LookupFailed(format!(
                "no answer within {} ms",
                self.settings.geolocation_timeout.as_millis()
            ))),
        }
    }

    async fn load(&self, listener_id: &str) -> Result<Option<ListenerPreference>, StoreError> {
        tokio::time::timeout(self.settings.store_timeout, self.preferences.get(listener_id))
            .await
            .map_err(|_| StoreError::Timeout(self.settings.store_timeout.as_millis() as u64))?
    }

    async fn save(&self, listener_id: &str, stream: &StreamDescriptor) -> Result<(), StoreError> {
        tokio::time::timeout(
            self.settings.store_timeout,
            self.preferences.put(listener_id, stream),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.settings.store_timeout.as_millis() as u64))?
    }
}

/// Two prompt fragments as one utterance.
fn join_speech(first: &str, second: &str) -> String {
    format!("{} {}", first.trim_end(), second.trim_start())
        .trim()
        .to_string()
}
