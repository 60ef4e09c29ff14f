//! # Radio Skill
//!
//! Turns voice-assistant events into spoken prompts and audio player directives.
//!
//! ## Flow:
//! 1. `event` parses the platform envelope into a classified [`event::Event`]
//! 2. `router` picks the first matching handler in registration order
//! 3. `playback` runs the stateful handlers against the collaborators
//! 4. `response` renders the handler's answer in the platform's wire format

pub mod event;
pub mod playback;
pub mod response;
pub mod router;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use event::{Event, RequestEnvelope};
pub use playback::{PlaybackMachine, PlaybackSettings};
pub use router::EventRouter;
