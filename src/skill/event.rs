//! # Inbound Events
//!
//! The platform posts one JSON envelope per event. This module deserializes the parts of
//! the envelope the skill consumes and classifies the request into a closed set of
//! [`EventKind`]s. Intent recognition already happened upstream; classification here is
//! a plain lookup on the request type and intent name.
//!
//! ## Envelope Fields Consumed:
//! - `request.type`, `request.intent.name`, `request.locale`
//! - `request.reason`, `request.error` (session end and exception payloads)
//! - `context.System.device.deviceId`, `context.System.device.supportedInterfaces`
//! - `context.System.user.userId` (falls back to `session.user.userId`)
//! - `context.System.apiEndpoint`, `context.System.apiAccessToken`
//! - `session.attributes`

use crate::services::geolocation::DeviceLookup;
use crate::skill::session::SessionAttributes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope carries no user id")]
    MissingUser,
}

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub session: Option<SessionEnvelope>,
    pub context: ContextEnvelope,
    pub request: RequestBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnvelope {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub attributes: SessionAttributes,
    #[serde(default)]
    pub user: Option<UserEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEnvelope {
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextEnvelope {
    #[serde(rename = "System", default)]
    pub system: SystemEnvelope,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEnvelope {
    #[serde(default)]
    pub device: Option<DeviceEnvelope>,
    #[serde(default)]
    pub user: Option<UserEnvelope>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub api_access_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEnvelope {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub supported_interfaces: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub intent: Option<IntentEnvelope>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub error: Option<RequestErrorEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentEnvelope {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestErrorEnvelope {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Classified Event
// ============================================================================

/// Where a pause or resume came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    /// Spoken intent.
    Voice,
    /// Hardware button or on-screen control.
    Controller,
}

/// Media commands that make no sense for a single live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    LoopOn,
    LoopOff,
    ShuffleOn,
    ShuffleOff,
    Next,
    Previous,
    Repeat,
    StartOver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SessionStart,
    AffirmResume,
    DeclineResume,
    PauseRequest(CommandSource),
    ResumeRequest(CommandSource),
    UnsupportedMediaCommand(MediaCommand),
    InfoRequest,
    HelpRequest,
    StopRequest,
    FallbackRequest,
    PlaybackStarted,
    PlaybackStopped,
    PlaybackFailed { error: Option<String> },
    SessionEnd { reason: Option<String> },
    SystemException { reason: Option<String> },
    /// Request type or intent this skill does not know.
    Unrecognized(String),
}

impl EventKind {
    pub fn classify(request: &RequestBody) -> Self {
        let error_text = || {
            request.error.as_ref().map(|err| {
                match (err.error_type.as_deref(), err.message.as_deref()) {
                    (Some(kind), Some(message)) => format!("{}: {}", kind, message),
                    (Some(kind), None) => kind.to_string(),
                    (None, Some(message)) => message.to_string(),
                    (None, None) => String::new(),
                }
            })
        };

        match request.request_type.as_str() {
            "LaunchRequest" => EventKind::SessionStart,
            "IntentRequest" => match request.intent.as_ref() {
                Some(intent) => Self::classify_intent(&intent.name),
                None => EventKind::Unrecognized("IntentRequest".to_string()),
            },
            "PlaybackController.PauseCommandIssued" => {
                EventKind::PauseRequest(CommandSource::Controller)
            }
            "PlaybackController.PlayCommandIssued" => {
                EventKind::ResumeRequest(CommandSource::Controller)
            }
            "PlaybackController.NextCommandIssued" => {
                EventKind::UnsupportedMediaCommand(MediaCommand::Next)
            }
            "PlaybackController.PreviousCommandIssued" => {
                EventKind::UnsupportedMediaCommand(MediaCommand::Previous)
            }
            "AudioPlayer.PlaybackStarted" => EventKind::PlaybackStarted,
            "AudioPlayer.PlaybackStopped" => EventKind::PlaybackStopped,
            "AudioPlayer.PlaybackFailed" => EventKind::PlaybackFailed {
                error: error_text(),
            },
            "SessionEndedRequest" => EventKind::SessionEnd {
                reason: match (request.reason.clone(), error_text()) {
                    (Some(reason), Some(error)) => Some(format!("{} ({})", reason, error)),
                    (reason, error) => reason.or(error),
                },
            },
            "System.ExceptionEncountered" => EventKind::SystemException {
                reason: error_text().or_else(|| request.reason.clone()),
            },
            other => EventKind::Unrecognized(other.to_string()),
        }
    }

    fn classify_intent(name: &str) -> Self {
        match name {
            "AMAZON.YesIntent" => EventKind::AffirmResume,
            "AMAZON.NoIntent" => EventKind::DeclineResume,
            "AMAZON.PauseIntent" => EventKind::PauseRequest(CommandSource::Voice),
            "AMAZON.ResumeIntent" => EventKind::ResumeRequest(CommandSource::Voice),
            "AMAZON.LoopOnIntent" => EventKind::UnsupportedMediaCommand(MediaCommand::LoopOn),
            "AMAZON.LoopOffIntent" => EventKind::UnsupportedMediaCommand(MediaCommand::LoopOff),
            "AMAZON.ShuffleOnIntent" => {
                EventKind::UnsupportedMediaCommand(MediaCommand::ShuffleOn)
            }
            "AMAZON.ShuffleOffIntent" => {
                EventKind::UnsupportedMediaCommand(MediaCommand::ShuffleOff)
            }
            "AMAZON.NextIntent" => EventKind::UnsupportedMediaCommand(MediaCommand::Next),
            "AMAZON.PreviousIntent" => EventKind::UnsupportedMediaCommand(MediaCommand::Previous),
            "AMAZON.RepeatIntent" => EventKind::UnsupportedMediaCommand(MediaCommand::Repeat),
            "AMAZON.StartOverIntent" => {
                EventKind::UnsupportedMediaCommand(MediaCommand::StartOver)
            }
            "AboutIntent" => EventKind::InfoRequest,
            "AMAZON.HelpIntent" => EventKind::HelpRequest,
            "AMAZON.CancelIntent" | "AMAZON.StopIntent" => EventKind::StopRequest,
            "AMAZON.FallbackIntent" => EventKind::FallbackRequest,
            other => EventKind::Unrecognized(other.to_string()),
        }
    }
}

/// The requesting device as far as routing is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub audio_player: bool,
}

/// A classified inbound event with everything the handlers need.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    /// Raw `request.type`, kept for logs.
    pub request_type: String,
    pub locale: String,
    pub listener_id: String,
    /// `None` when the envelope has no device block.
    pub device: Option<DeviceInfo>,
    pub api_endpoint: Option<String>,
    pub api_access_token: Option<String>,
    pub attributes: SessionAttributes,
}

impl Event {
    pub fn from_envelope(envelope: RequestEnvelope) -> Result<Self, EnvelopeError> {
        let RequestEnvelope {
            session,
            context,
            request,
            ..
        } = envelope;
        let system = context.system;
        let session = session.unwrap_or_default();

        let listener_id = system
            .user
            .or(session.user)
            .map(|user| user.user_id)
            .filter(|id| !id.is_empty())
            .ok_or(EnvelopeError::MissingUser)?;

        let device = system.device.map(|device| DeviceInfo {
            audio_player: device.supported_interfaces.contains_key("AudioPlayer"),
            device_id: device.device_id,
        });

        Ok(Self {
            kind: EventKind::classify(&request),
            request_type: request.request_type,
            locale: request.locale.unwrap_or_default(),
            listener_id,
            device,
            api_endpoint: system.api_endpoint,
            api_access_token: system.api_access_token,
            attributes: session.attributes,
        })
    }

    /// True when the device is known and lacks the audio player interface.
    pub fn lacks_audio_player(&self) -> bool {
        self.device
            .as_ref()
            .map_or(false, |device| !device.audio_player)
    }

    pub fn device_lookup(&self) -> DeviceLookup {
        DeviceLookup {
            device_id: self
                .device
                .as_ref()
                .map(|device| device.device_id.clone())
                .unwrap_or_default(),
            api_endpoint: self.api_endpoint.clone(),
            api_access_token: self.api_access_token.clone(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} [{}] locale={}", self.kind, self.request_type, self.locale)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn classify(request_type: &str, intent: Option<&str>) -> EventKind {
        let envelope: RequestEnvelope =
            serde_json::from_value(envelope(request_type, intent, true)).unwrap();
        Event::from_envelope(envelope).unwrap().kind
    }

    #[test]
    fn test_request_types() {
        assert_eq!(classify("LaunchRequest", None), EventKind::SessionStart);
        assert_eq!(
            classify("PlaybackController.PauseCommandIssued", None),
            EventKind::PauseRequest(CommandSource::Controller)
        );
        assert_eq!(
            classify("PlaybackController.PlayCommandIssued", None),
            EventKind::ResumeRequest(CommandSource::Controller)
        );
        assert_eq!(classify("AudioPlayer.PlaybackStarted", None), EventKind::PlaybackStarted);
        assert_eq!(
            classify("AudioPlayer.PlaybackNearlyFinished", None),
            EventKind::Unrecognized("AudioPlayer.PlaybackNearlyFinished".to_string())
        );
    }

    #[test]
    fn test_intents() {
        assert_eq!(classify("IntentRequest", Some("AMAZON.YesIntent")), EventKind::AffirmResume);
        assert_eq!(classify("IntentRequest", Some("AMAZON.NoIntent")), EventKind::DeclineResume);
        assert_eq!(
            classify("IntentRequest", Some("AMAZON.ShuffleOnIntent")),
            EventKind::UnsupportedMediaCommand(MediaCommand::ShuffleOn)
        );
        assert_eq!(classify("IntentRequest", Some("AMAZON.CancelIntent")), EventKind::StopRequest);
        assert_eq!(classify("IntentRequest", Some("AboutIntent")), EventKind::InfoRequest);
        assert_eq!(
            classify("IntentRequest", Some("PlayMusicIntent")),
            EventKind::Unrecognized("PlayMusicIntent".to_string())
        );
    }

    #[test]
    fn test_session_end_reason() {
        let mut value = envelope("SessionEndedRequest", None, true);
        value["request"]["reason"] = serde_json::json!("ERROR");
        value["request"]["error"] =
            serde_json::json!({ "type": "INVALID_RESPONSE", "message": "bad directive" });
        let envelope: RequestEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(
            Event::from_envelope(envelope).unwrap().kind,
            EventKind::SessionEnd {
                reason: Some("ERROR (INVALID_RESPONSE: bad directive)".to_string())
            }
        );
    }

    #[test]
    fn test_device_capabilities() {
        let without_audio: RequestEnvelope =
            serde_json::from_value(envelope("LaunchRequest", None, false)).unwrap();
        assert!(Event::from_envelope(without_audio).unwrap().lacks_audio_player());

        let mut no_device = envelope("LaunchRequest", None, false);
        no_device["context"]["System"]
            .as_object_mut()
            .unwrap()
            .remove("device");
        let no_device: RequestEnvelope = serde_json::from_value(no_device).unwrap();
        let event = Event::from_envelope(no_device).unwrap();
        assert!(!event.lacks_audio_player());
        assert_eq!(event.device_lookup().device_id, "");
    }

    #[test]
    fn test_audio_player_event_without_session() {
        let mut value = envelope("AudioPlayer.PlaybackFailed", None, true);
        value.as_object_mut().unwrap().remove("session");
        let envelope: RequestEnvelope = serde_json::from_value(value).unwrap();
        let event = Event::from_envelope(envelope).unwrap();
        assert_eq!(event.listener_id, "amzn1.ask.account.listener");
        assert!(event.attributes.offer.is_none());
    }

    #[test]
    fn test_missing_user_rejected() {
        let mut value = envelope("LaunchRequest", None, true);
        value["context"]["System"].as_object_mut().unwrap().remove("user");
        value["session"].as_object_mut().unwrap().remove("user");
        let envelope: RequestEnvelope = serde_json::from_value(value).unwrap();
        assert!(matches!(
            Event::from_envelope(envelope),
            Err(EnvelopeError::MissingUser)
        ));
    }
}
