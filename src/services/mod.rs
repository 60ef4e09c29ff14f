//! # Skill Collaborators
//!
//! The leaf services the skill consults while handling an event. Each one sits behind a
//! small interface so the router can be composed with real backends in `main` and with
//! fakes in tests.
//!
//! - **catalog**: country code → live stream descriptor
//! - **locale**: locale tag → prompt templates
//! - **preferences**: listener id → last selected stream
//! - **geolocation**: device → registered country

pub mod catalog;
pub mod geolocation;
pub mod locale;
pub mod preferences;
