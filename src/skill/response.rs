//! # Response Assembly
//!
//! Handlers describe what to say and what the player should do with a
//! [`SkillResponse`]; [`SkillResponse::into_envelope`] turns that into the JSON the
//! platform expects.
//!
//! ## Directive Rules:
//! A response carries at most one [`PlaybackInstruction`], which expands to:
//! - `Play` → one `AudioPlayer.Play` (REPLACE_ALL, offset 0, constant token)
//! - `Stop` → `AudioPlayer.ClearQueue` (CLEAR_ALL) followed by `AudioPlayer.Stop`
//! - `ClearEnqueued` → one `AudioPlayer.ClearQueue` (CLEAR_ENQUEUED)
//!
//! Play and Stop can therefore never appear in the same response.
//!
//! ## Session Rules:
//! A reprompt is only emitted while the session stays open. Ending the session drops
//! any reprompt that was set earlier.

use crate::services::catalog::StreamDescriptor;
use crate::skill::session::SessionAttributes;
use serde::{Deserialize, Serialize};

/// Token attached to every play directive. Only one stream is ever queued.
pub const STREAM_TOKEN: &str = "token";

/// Permission requested when the device address is not readable.
pub const DEFAULT_LOCATION_PERMISSION: &str = "read::device:all:address";

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackInstruction {
    Play(StreamDescriptor),
    Stop,
    ClearEnqueued,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Card {
    #[serde(rename = "AskForPermissionsConsent")]
    AskForPermissionsConsent { permissions: Vec<String> },
}

/// What a handler decided to send back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillResponse {
    pub speech: Option<String>,
    pub reprompt: Option<String>,
    pub card: Option<Card>,
    pub playback: Option<PlaybackInstruction>,
    pub should_end_session: Option<bool>,
    pub session_attributes: SessionAttributes,
}

impl SkillResponse {
    /// Empty response: no speech, no directives, session flag unset.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn speak(mut self, text: impl Into<String>) -> Self {
        self.speech = Some(text.into());
        self
    }

    /// Set a reprompt and keep the session open.
    pub fn ask(mut self, reprompt: impl Into<String>) -> Self {
        self.reprompt = Some(reprompt.into());
        self.should_end_session = Some(false);
        self
    }

    pub fn end_session(mut self) -> Self {
        self.reprompt = None;
        self.should_end_session = Some(true);
        self
    }

    pub fn play(mut self, stream: &StreamDescriptor) -> Self {
        self.playback = Some(PlaybackInstruction::Play(stream.clone()));
        self
    }

    pub fn stop(mut self) -> Self {
        self.playback = Some(PlaybackInstruction::Stop);
        self
    }

    pub fn clear_enqueued(mut self) -> Self {
        self.playback = Some(PlaybackInstruction::ClearEnqueued);
        self
    }

    pub fn permission_card(mut self, permission: impl Into<String>) -> Self {
        self.card = Some(Card::AskForPermissionsConsent {
            permissions: vec![permission.into()],
        });
        self
    }

    pub fn attributes(mut self, attributes: SessionAttributes) -> Self {
        self.session_attributes = attributes;
        self
    }

    /// Stream this response starts playing, if any.
    pub fn played_stream(&self) -> Option<&StreamDescriptor> {
        match &self.playback {
            Some(PlaybackInstruction::Play(stream)) => Some(stream),
            _ => None,
        }
    }

    pub fn into_envelope(self) -> ResponseEnvelope {
        let directives = match self.playback {
            None => Vec::new(),
            Some(PlaybackInstruction::Play(stream)) => vec![Directive::play(&stream)],
            Some(PlaybackInstruction::Stop) => vec![
                Directive::ClearQueue {
                    clear_behavior: ClearBehavior::ClearAll,
                },
                Directive::Stop,
            ],
            Some(PlaybackInstruction::ClearEnqueued) => vec![Directive::ClearQueue {
                clear_behavior: ClearBehavior::ClearEnqueued,
            }],
        };
        let open = self.should_end_session != Some(true);

        ResponseEnvelope {
            version: "1.0".to_string(),
            session_attributes: self.session_attributes,
            response: ResponseBody {
                output_speech: self.speech.map(OutputSpeech::plain),
                reprompt: self.reprompt.filter(|_| open).map(|text| Reprompt {
                    output_speech: OutputSpeech::plain(text),
                }),
                card: self.card,
                directives,
                should_end_session: self.should_end_session,
            },
        }
    }
}

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub version: String,
    #[serde(default, skip_serializing_if = "SessionAttributes::is_empty")]
    pub session_attributes: SessionAttributes,
    pub response: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_speech: Option<OutputSpeech>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<Reprompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_end_session: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpeech {
    #[serde(rename = "type")]
    pub speech_type: String,
    pub text: String,
}

impl OutputSpeech {
    fn plain(text: String) -> Self {
        Self {
            speech_type: "PlainText".to_string(),
            text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reprompt {
    pub output_speech: OutputSpeech,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Directive {
    #[serde(rename = "AudioPlayer.Play", rename_all = "camelCase")]
    Play {
        play_behavior: PlayBehavior,
        audio_item: AudioItem,
    },
    #[serde(rename = "AudioPlayer.ClearQueue", rename_all = "camelCase")]
    ClearQueue { clear_behavior: ClearBehavior },
    #[serde(rename = "AudioPlayer.Stop")]
    Stop,
}

impl Directive {
    fn play(stream: &StreamDescriptor) -> Self {
        Directive::Play {
            play_behavior: PlayBehavior::ReplaceAll,
            audio_item: AudioItem {
                stream: Stream {
                    token: STREAM_TOKEN.to_string(),
                    url: stream.stream_url.clone(),
                    offset_in_milliseconds: 0,
                },
                metadata: AudioItemMetadata {
                    title: stream.title.clone(),
                    subtitle: stream.subtitle.clone(),
                    art: Image::single(&stream.album_art_url),
                    background_image: Image::single(&stream.background_image_url),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayBehavior {
    ReplaceAll,
    Enqueue,
    ReplaceEnqueued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearBehavior {
    ClearAll,
    ClearEnqueued,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioItem {
    pub stream: Stream,
    pub metadata: AudioItemMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub token: String,
    pub url: String,
    pub offset_in_milliseconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioItemMetadata {
    pub title: String,
    pub subtitle: String,
    pub art: Image,
    pub background_image: Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub sources: Vec<ImageSource>,
}

impl Image {
    fn single(url: &str) -> Self {
        Self {
            sources: vec![ImageSource {
                url: url.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::fixtures::descriptor;
    use serde_json::json;

    #[test]
    fn test_play_directive_shape() {
        let envelope = SkillResponse::silent()
            .speak("Playing the France stream.")
            .play(&descriptor("FR", "France"))
            .end_session()
            .into_envelope();
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value["response"]["directives"],
            json!([{
                "type": "AudioPlayer.Play",
                "playBehavior": "REPLACE_ALL",
                "audioItem": {
                    "stream": {
                        "token": "token",
                        "url": "https://streams.test/fr/live.aac",
                        "offsetInMilliseconds": 0
                    },
                    "metadata": {
                        "title": "Radio Global France",
                        "subtitle": "Live from France",
                        "art": { "sources": [{ "url": "https://static.test/art/fr.png" }] },
                        "backgroundImage": { "sources": [{ "url": "https://static.test/bg/fr.png" }] }
                    }
                }
            }])
        );
        assert_eq!(value["response"]["shouldEndSession"], json!(true));
        assert_eq!(
            value["response"]["outputSpeech"],
            json!({ "type": "PlainText", "text": "Playing the France stream." })
        );
        assert!(value.get("sessionAttributes").is_none());
    }

    #[test]
    fn test_stop_expands_to_clear_then_stop() {
        let envelope = SkillResponse::silent().stop().end_session().into_envelope();
        assert_eq!(
            envelope.response.directives,
            vec![
                Directive::ClearQueue {
                    clear_behavior: ClearBehavior::ClearAll
                },
                Directive::Stop
            ]
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["response"]["directives"][1], json!({ "type": "AudioPlayer.Stop" }));
    }

    #[test]
    fn test_clear_enqueued_alone() {
        let envelope = SkillResponse::silent().clear_enqueued().into_envelope();
        assert_eq!(envelope.response.directives.len(), 1);
        assert!(envelope.response.should_end_session.is_none());
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value["response"]["directives"][0]["clearBehavior"],
            json!("CLEAR_ENQUEUED")
        );
    }

    #[test]
    fn test_reprompt_dropped_when_session_ends() {
        let response = SkillResponse::silent().speak("Hi").ask("Still there?").end_session();
        assert!(response.into_envelope().response.reprompt.is_none());

        let open = SkillResponse::silent().speak("Hi").ask("Still there?").into_envelope();
        assert_eq!(open.response.should_end_session, Some(false));
        assert_eq!(open.response.reprompt.unwrap().output_speech.text, "Still there?");
    }

    #[test]
    fn test_permission_card() {
        let value = serde_json::to_value(
            SkillResponse::silent()
                .speak("Please grant permission.")
                .permission_card(DEFAULT_LOCATION_PERMISSION)
                .end_session()
                .into_envelope(),
        )
        .unwrap();
        assert_eq!(
            value["response"]["card"],
            json!({
                "type": "AskForPermissionsConsent",
                "permissions": ["read::device:all:address"]
            })
        );
    }

    #[test]
    fn test_silent_response_is_empty() {
        let value = serde_json::to_value(SkillResponse::silent().into_envelope()).unwrap();
        assert_eq!(value, json!({ "version": "1.0", "response": {} }));
    }
}
