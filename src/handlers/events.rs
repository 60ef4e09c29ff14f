//! # Skill Event Endpoint
//!
//! `POST /api/v1/events` takes the platform's request envelope and answers with its
//! response envelope.
//!
//! Only malformed input gets a non-200 answer. Everything that goes wrong after an
//! [`Event`] exists is turned into speech by the router, because the platform reads
//! any other status as "skill unavailable".

use crate::error::AppResult;
use crate::skill::{Event, RequestEnvelope};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tracing::debug;

pub async fn handle_event(state: web::Data<AppState>, body: web::Bytes) -> AppResult<HttpResponse> {
    let envelope: RequestEnvelope = serde_json::from_slice(&body)?;
    let event = Event::from_envelope(envelope)?;

    let dispatch = state.router.route(&event).await;
    state.record_dispatch(dispatch.route);
    debug!(route = dispatch.route.as_str(), state = ?dispatch.state, "Responding");

    Ok(HttpResponse::Ok().json(dispatch.response.into_envelope()))
}
