//! # Event Router
//!
//! Dispatches each inbound [`Event`] to the first registered handler whose predicate
//! matches. Registration order is the tie-break: a controller pause matches both
//! [`HandlerKind::PauseRequest`] and [`HandlerKind::PlaybackStopped`], and the one
//! registered first handles it.
//!
//! ## Dispatch Outcomes:
//! - **Handler**: a registered handler produced the response
//! - **Fallback**: no predicate matched; generic "didn't get that" reply
//! - **CatchAll**: a handler failed, or no prompts exist for the locale; apology with
//!   the session left open so the listener can retry
//!
//! Predicates are pure. All collaborator access happens inside the handlers.

use crate::services::locale::{LocaleTextProvider, PromptKey, PromptTable};
use crate::skill::event::{CommandSource, Event, EventKind};
use crate::skill::playback::{HandlerFault, PlaybackMachine, Transition};
use crate::skill::response::SkillResponse;
use crate::skill::session::SessionState;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    DeviceUnsupported,
    SessionStart,
    PauseRequest,
    ResumeRequest,
    AffirmResume,
    DeclineResume,
    UnsupportedMediaCommand,
    StopRequest,
    HelpRequest,
    InfoRequest,
    FallbackRequest,
    PlaybackStarted,
    PlaybackStopped,
    PlaybackFailed,
    SessionEnd,
    SystemException,
}

impl HandlerKind {
    /// Registration order used by [`EventRouter::new`].
    pub const DEFAULT_ORDER: [HandlerKind; 16] = [
        HandlerKind::DeviceUnsupported,
        HandlerKind::SessionStart,
        HandlerKind::PauseRequest,
        HandlerKind::ResumeRequest,
        HandlerKind::AffirmResume,
        HandlerKind::DeclineResume,
        HandlerKind::UnsupportedMediaCommand,
        HandlerKind::StopRequest,
        HandlerKind::HelpRequest,
        HandlerKind::InfoRequest,
        HandlerKind::FallbackRequest,
        HandlerKind::PlaybackStarted,
        HandlerKind::PlaybackStopped,
        HandlerKind::PlaybackFailed,
        HandlerKind::SessionEnd,
        HandlerKind::SystemException,
    ];

    pub fn matches(&self, event: &Event) -> bool {
        match self {
            HandlerKind::DeviceUnsupported => event.lacks_audio_player(),
            HandlerKind::SessionStart => event.kind == EventKind::SessionStart,
            HandlerKind::PauseRequest => matches!(event.kind, EventKind::PauseRequest(_)),
            HandlerKind::ResumeRequest => matches!(event.kind, EventKind::ResumeRequest(_)),
            HandlerKind::AffirmResume => event.kind == EventKind::AffirmResume,
            HandlerKind::DeclineResume => event.kind == EventKind::DeclineResume,
            HandlerKind::UnsupportedMediaCommand => {
                matches!(event.kind, EventKind::UnsupportedMediaCommand(_))
            }
            HandlerKind::StopRequest => event.kind == EventKind::StopRequest,
            HandlerKind::HelpRequest => event.kind == EventKind::HelpRequest,
            HandlerKind::InfoRequest => event.kind == EventKind::InfoRequest,
            HandlerKind::FallbackRequest => event.kind == EventKind::FallbackRequest,
            HandlerKind::PlaybackStarted => event.kind == EventKind::PlaybackStarted,
            // Player stop and controller pause both leave the stream paused.
            HandlerKind::PlaybackStopped => matches!(
                event.kind,
                EventKind::PlaybackStopped | EventKind::PauseRequest(CommandSource::Controller)
            ),
            HandlerKind::PlaybackFailed => matches!(event.kind, EventKind::PlaybackFailed { .. }),
            HandlerKind::SessionEnd => matches!(event.kind, EventKind::SessionEnd { .. }),
            HandlerKind::SystemException => {
                matches!(event.kind, EventKind::SystemException { .. })
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::DeviceUnsupported => "device_unsupported",
            HandlerKind::SessionStart => "session_start",
            HandlerKind::PauseRequest => "pause_request",
            HandlerKind::ResumeRequest => "resume_request",
            HandlerKind::AffirmResume => "affirm_resume",
            HandlerKind::DeclineResume => "decline_resume",
            HandlerKind::UnsupportedMediaCommand => "unsupported_media_command",
            HandlerKind::StopRequest => "stop_request",
            HandlerKind::HelpRequest => "help_request",
            HandlerKind::InfoRequest => "info_request",
            HandlerKind::FallbackRequest => "fallback_request",
            HandlerKind::PlaybackStarted => "playback_started",
            HandlerKind::PlaybackStopped => "playback_stopped",
            HandlerKind::PlaybackFailed => "playback_failed",
            HandlerKind::SessionEnd => "session_end",
            HandlerKind::SystemException => "system_exception",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Handler(HandlerKind),
    Fallback,
    CatchAll,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Handler(kind) => kind.as_str(),
            Route::Fallback => "fallback",
            Route::CatchAll => "catch_all",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub route: Route,
    pub state: Option<SessionState>,
    pub response: SkillResponse,
}

pub struct EventRouter {
    handlers: Vec<HandlerKind>,
    machine: PlaybackMachine,
    locales: Arc<LocaleTextProvider>,
}

impl EventRouter {
    pub fn new(machine: PlaybackMachine, locales: Arc<LocaleTextProvider>) -> Self {
        Self::with_handlers(HandlerKind::DEFAULT_ORDER.to_vec(), machine, locales)
    }

    /// Router with a custom registration order. Earlier entries win.
    pub fn with_handlers(
        handlers: Vec<HandlerKind>,
        machine: PlaybackMachine,
        locales: Arc<LocaleTextProvider>,
    ) -> Self {
        Self {
            handlers,
            machine,
            locales,
        }
    }

    pub fn handlers(&self) -> &[HandlerKind] {
        &self.handlers
    }

    pub fn machine(&self) -> &PlaybackMachine {
        &self.machine
    }

    pub fn locales(&self) -> &LocaleTextProvider {
        &self.locales
    }

    /// First registered handler whose predicate matches.
    pub fn select(&self, event: &Event) -> Option<HandlerKind> {
        self.handlers
            .iter()
            .copied()
            .find(|handler| handler.matches(event))
    }

    pub async fn route(&self, event: &Event) -> Dispatch {
        debug!(event = %event, listener_id = %event.listener_id, "Routing event");

        let mut dispatch = match self.locales.templates(&event.locale) {
            Ok(prompts) => self.dispatch(event, &prompts).await,
            Err(err) => {
                warn!(locale = %event.locale, error = %err, "No prompts for locale");
                catch_all(&self.locales.fallback())
            }
        };

        carry_session_attributes(event, &mut dispatch.response);

        debug!(
            route = dispatch.route.as_str(),
            state = ?dispatch.state,
            response = ?dispatch.response,
            "Event handled"
        );
        dispatch
    }

    async fn dispatch(&self, event: &Event, prompts: &PromptTable) -> Dispatch {
        let Some(handler) = self.select(event) else {
            info!(event = %event, "No handler matched");
            return Dispatch {
                route: Route::Fallback,
                state: None,
                response: SkillResponse::silent()
                    .speak(prompts.pick(PromptKey::Fallback))
                    .ask(prompts.pick(PromptKey::FallbackReprompt)),
            };
        };

        match self.handle(handler, event, prompts).await {
            Ok(transition) => Dispatch {
                route: Route::Handler(handler),
                state: transition.state,
                response: transition.response,
            },
            Err(fault) => {
                error!(handler = %handler, event = %event, error = %fault, "Handler failed");
                catch_all(prompts)
            }
        }
    }

    async fn handle(
        &self,
        handler: HandlerKind,
        event: &Event,
        prompts: &PromptTable,
    ) -> Result<Transition, HandlerFault> {
        let transition = match handler {
            HandlerKind::DeviceUnsupported => Transition::unchanged(
                SkillResponse::silent()
                    .speak(prompts.pick(PromptKey::DeviceNotSupported))
                    .end_session(),
            ),
            HandlerKind::SessionStart => self.machine.session_start(event, prompts).await?,
            HandlerKind::AffirmResume => self.machine.affirm(event).await?,
            HandlerKind::DeclineResume => self.machine.decline(event).await?,
            HandlerKind::ResumeRequest => self.machine.resume(event).await?,
            HandlerKind::PauseRequest | HandlerKind::PlaybackStopped => self.machine.pause(),
            HandlerKind::UnsupportedMediaCommand => Transition::unchanged(
                SkillResponse::silent()
                    .speak(prompts.pick(PromptKey::Unhandled))
                    .end_session(),
            ),
            HandlerKind::StopRequest => Transition::to(
                SessionState::Ended,
                SkillResponse::silent()
                    .speak(prompts.pick(PromptKey::CancelStopMessage))
                    .end_session(),
            ),
            HandlerKind::HelpRequest => Transition::unchanged(
                SkillResponse::silent()
                    .speak(prompts.pick(PromptKey::Help))
                    .ask(prompts.pick(PromptKey::HelpReprompt)),
            ),
            HandlerKind::InfoRequest => Transition::unchanged(
                SkillResponse::silent()
                    .speak(prompts.pick(PromptKey::About))
                    .ask(prompts.pick(PromptKey::AboutReprompt)),
            ),
            HandlerKind::FallbackRequest => Transition::unchanged(
                SkillResponse::silent()
                    .speak(prompts.pick(PromptKey::Fallback))
                    .ask(prompts.pick(PromptKey::FallbackReprompt)),
            ),
            HandlerKind::PlaybackStarted => {
                Transition::unchanged(SkillResponse::silent().clear_enqueued())
            }
            HandlerKind::PlaybackFailed => {
                if let EventKind::PlaybackFailed { error } = &event.kind {
                    warn!(
                        listener_id = %event.listener_id,
                        error = error.as_deref().unwrap_or("unknown"),
                        "Playback failed"
                    );
                }
                Transition::unchanged(SkillResponse::silent())
            }
            HandlerKind::SessionEnd => {
                if let EventKind::SessionEnd { reason } = &event.kind {
                    info!(reason = reason.as_deref().unwrap_or("unknown"), "Session ended");
                }
                Transition::to(SessionState::Ended, SkillResponse::silent())
            }
            HandlerKind::SystemException => {
                if let EventKind::SystemException { reason } = &event.kind {
                    warn!(
                        reason = reason.as_deref().unwrap_or("unknown"),
                        "Platform reported an exception"
                    );
                }
                Transition::unchanged(SkillResponse::silent())
            }
        };
        Ok(transition)
    }
}

fn catch_all(prompts: &PromptTable) -> Dispatch {
    Dispatch {
        route: Route::CatchAll,
        state: None,
        response: SkillResponse::silent()
            .speak(prompts.pick(PromptKey::Error))
            .ask(prompts.pick(PromptKey::ErrorReprompt)),
    }
}

/// Echo the request's session attributes while the session stays open.
fn carry_session_attributes(event: &Event, response: &mut SkillResponse) {
    if response.should_end_session != Some(false) {
        return;
    }
    let attributes = &mut response.session_attributes;
    if attributes.offer.is_none() {
        attributes.offer = event.attributes.offer.clone();
    }
    for (key, value) in &event.attributes.extra {
        attributes
            .extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::fixtures::{catalog, descriptor};
    use crate::services::locale::fixtures::provider;
    use crate::skill::event::fixtures::event;
    use crate::skill::event::MediaCommand;
    use crate::skill::playback::PlaybackSettings;
    use crate::skill::response::PlaybackInstruction;
    use crate::skill::session::SessionAttributes;
    use crate::skill::testing::{CountingStore, StaticGeolocator, LISTENER};
    use std::time::Duration;

    fn machine(geo: StaticGeolocator, store: Arc<CountingStore>) -> PlaybackMachine {
        PlaybackMachine::new(
            Arc::new(catalog()),
            store,
            Arc::new(geo),
            PlaybackSettings {
                store_timeout: Duration::from_millis(200),
                geolocation_timeout: Duration::from_millis(200),
                location_permission: "read::device:all:address".to_string(),
            },
        )
    }

    fn router_with(geo: StaticGeolocator, store: Arc<CountingStore>) -> EventRouter {
        EventRouter::new(machine(geo, store), Arc::new(provider()))
    }

    fn router() -> EventRouter {
        router_with(
            StaticGeolocator::country("US"),
            Arc::new(CountingStore::default()),
        )
    }

    #[test]
    fn test_default_order_selects_expected_handler() {
        let router = router();
        let cases = [
            (EventKind::SessionStart, HandlerKind::SessionStart),
            (EventKind::AffirmResume, HandlerKind::AffirmResume),
            (EventKind::DeclineResume, HandlerKind::DeclineResume),
            (
                EventKind::PauseRequest(CommandSource::Voice),
                HandlerKind::PauseRequest,
            ),
            (
                EventKind::ResumeRequest(CommandSource::Controller),
                HandlerKind::ResumeRequest,
            ),
            (
                EventKind::UnsupportedMediaCommand(MediaCommand::ShuffleOn),
                HandlerKind::UnsupportedMediaCommand,
            ),
            (EventKind::StopRequest, HandlerKind::StopRequest),
            (EventKind::HelpRequest, HandlerKind::HelpRequest),
            (EventKind::InfoRequest, HandlerKind::InfoRequest),
            (EventKind::FallbackRequest, HandlerKind::FallbackRequest),
            (EventKind::PlaybackStarted, HandlerKind::PlaybackStarted),
            (EventKind::PlaybackStopped, HandlerKind::PlaybackStopped),
            (
                EventKind::PlaybackFailed { error: None },
                HandlerKind::PlaybackFailed,
            ),
            (EventKind::SessionEnd { reason: None }, HandlerKind::SessionEnd),
            (
                EventKind::SystemException { reason: None },
                HandlerKind::SystemException,
            ),
        ];
        for (kind, expected) in cases {
            assert_eq!(router.select(&event(kind.clone())), Some(expected), "{:?}", kind);
        }
        assert_eq!(
            router.select(&event(EventKind::Unrecognized("Custom".into()))),
            None
        );
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        let controller_pause = event(EventKind::PauseRequest(CommandSource::Controller));
        assert!(HandlerKind::PauseRequest.matches(&controller_pause));
        assert!(HandlerKind::PlaybackStopped.matches(&controller_pause));

        assert_eq!(
            router().select(&controller_pause),
            Some(HandlerKind::PauseRequest)
        );

        let reversed = EventRouter::with_handlers(
            vec![HandlerKind::PlaybackStopped, HandlerKind::PauseRequest],
            machine(
                StaticGeolocator::country("US"),
                Arc::new(CountingStore::default()),
            ),
            Arc::new(provider()),
        );
        assert_eq!(
            reversed.select(&controller_pause),
            Some(HandlerKind::PlaybackStopped)
        );
    }

    #[tokio::test]
    async fn test_device_without_audio_player_short_circuits() {
        let store = Arc::new(CountingStore::default());
        let geo = StaticGeolocator::country("US");
        let router = router_with(geo.clone(), store.clone());

        for kind in [
            EventKind::SessionStart,
            EventKind::ResumeRequest(CommandSource::Voice),
            EventKind::HelpRequest,
        ] {
            let mut request = event(kind);
            request.device.as_mut().unwrap().audio_player = false;
            let dispatch = router.route(&request).await;

            assert_eq!(dispatch.route, Route::Handler(HandlerKind::DeviceUnsupported));
            assert_eq!(dispatch.response.speech.as_deref(), Some("DEVICE_NOT_SUPPORTED"));
            assert!(dispatch.response.playback.is_none());
            assert_eq!(dispatch.response.should_end_session, Some(true));
        }
        assert_eq!(geo.calls(), 0);
        assert_eq!(store.gets(), 0);
        assert_eq!(store.puts(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_event_goes_to_fallback() {
        let dispatch = router()
            .route(&event(EventKind::Unrecognized("AMAZON.NavigateHomeIntent".into())))
            .await;
        assert_eq!(dispatch.route, Route::Fallback);
        assert_eq!(dispatch.response.speech.as_deref(), Some("FALLBACK"));
        assert_eq!(dispatch.response.reprompt.as_deref(), Some("FALLBACK_REPROMPT"));
        assert_eq!(dispatch.response.should_end_session, Some(false));
    }

    #[tokio::test]
    async fn test_handler_fault_goes_to_catch_all() {
        let dispatch = router().route(&event(EventKind::AffirmResume)).await;
        assert_eq!(dispatch.route, Route::CatchAll);
        assert_eq!(dispatch.response.speech.as_deref(), Some("ERROR"));
        assert_eq!(dispatch.response.reprompt.as_deref(), Some("ERROR_REPROMPT"));
        assert_eq!(dispatch.response.should_end_session, Some(false));
    }

    #[tokio::test]
    async fn test_store_failure_goes_to_catch_all() {
        let router = router_with(
            StaticGeolocator::country("US"),
            Arc::new(CountingStore::failing()),
        );
        let dispatch = router.route(&event(EventKind::SessionStart)).await;
        assert_eq!(dispatch.route, Route::CatchAll);
        assert!(dispatch.response.playback.is_none());
    }

    #[tokio::test]
    async fn test_unknown_locale_uses_fallback_table() {
        let mut request = event(EventKind::HelpRequest);
        request.locale = "ja-JP".to_string();
        let dispatch = router().route(&request).await;
        assert_eq!(dispatch.route, Route::CatchAll);
        assert_eq!(dispatch.response.speech.as_deref(), Some("ERROR"));
    }

    #[tokio::test]
    async fn test_prompts_follow_request_locale() {
        let mut request = event(EventKind::HelpRequest);
        request.locale = "fr-FR".to_string();
        let dispatch = router().route(&request).await;
        assert_eq!(dispatch.response.speech.as_deref(), Some("fr:HELP"));
    }

    #[tokio::test]
    async fn test_conversational_handlers() {
        let router = router();
        let cases = [
            (EventKind::HelpRequest, "HELP", Some("HELP_REPROMPT")),
            (EventKind::InfoRequest, "ABOUT", Some("ABOUT_REPROMPT")),
            (EventKind::FallbackRequest, "FALLBACK", Some("FALLBACK_REPROMPT")),
            (EventKind::StopRequest, "CANCEL_STOP_MESSAGE", None),
            (
                EventKind::UnsupportedMediaCommand(MediaCommand::Repeat),
                "UNHANDLED",
                None,
            ),
        ];
        for (kind, speech, reprompt) in cases {
            let dispatch = router.route(&event(kind)).await;
            assert_eq!(dispatch.response.speech.as_deref(), Some(speech));
            assert_eq!(dispatch.response.reprompt.as_deref(), reprompt);
            assert_eq!(dispatch.response.should_end_session, Some(reprompt.is_none()));
            assert!(dispatch.response.playback.is_none());
        }
    }

    #[tokio::test]
    async fn test_player_events_are_silent() {
        let router = router();

        let started = router.route(&event(EventKind::PlaybackStarted)).await;
        assert_eq!(started.response.playback, Some(PlaybackInstruction::ClearEnqueued));
        assert!(started.response.speech.is_none());
        assert_eq!(started.state, None);

        let stopped = router.route(&event(EventKind::PlaybackStopped)).await;
        assert_eq!(stopped.response.playback, Some(PlaybackInstruction::Stop));
        assert_eq!(stopped.state, Some(SessionState::Paused));

        for kind in [
            EventKind::PlaybackFailed {
                error: Some("MEDIA_ERROR_UNKNOWN".into()),
            },
            EventKind::SessionEnd {
                reason: Some("USER_INITIATED".into()),
            },
            EventKind::SystemException { reason: None },
        ] {
            let dispatch = router.route(&event(kind)).await;
            assert_eq!(dispatch.response, SkillResponse::silent());
        }
    }

    #[tokio::test]
    async fn test_offer_then_accept_across_turns() {
        let store = Arc::new(CountingStore::default());
        store.seed(LISTENER, catalog().default_stream().clone()).await;
        let router = router_with(StaticGeolocator::country("FR"), store.clone());

        let launch = router.route(&event(EventKind::SessionStart)).await;
        assert_eq!(launch.state, Some(SessionState::OfferPending));

        // The platform echoes the attributes back on the next turn.
        let mut help = event(EventKind::HelpRequest);
        help.attributes = launch.response.session_attributes.clone();
        let help = router.route(&help).await;
        assert!(help.response.session_attributes.offer.is_some());

        let mut yes = event(EventKind::AffirmResume);
        yes.attributes = help.response.session_attributes.clone();
        let accepted = router.route(&yes).await;

        assert_eq!(accepted.route, Route::Handler(HandlerKind::AffirmResume));
        assert_eq!(
            accepted.response.played_stream(),
            Some(&descriptor("FR", "France"))
        );
        assert!(accepted.response.session_attributes.is_empty());
        assert_eq!(store.stored(LISTENER).await.unwrap(), descriptor("FR", "France"));
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn test_unknown_attributes_echoed_while_open() {
        let mut request = event(EventKind::HelpRequest);
        request.attributes = SessionAttributes::default();
        request
            .attributes
            .extra
            .insert("visits".to_string(), serde_json::json!(2));

        let dispatch = router().route(&request).await;
        assert_eq!(dispatch.response.session_attributes.extra["visits"], 2);

        let mut stop = event(EventKind::StopRequest);
        stop.attributes = request.attributes.clone();
        let dispatch = router().route(&stop).await;
        assert!(dispatch.response.session_attributes.is_empty());
    }
}
