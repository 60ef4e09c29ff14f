pub mod config;
pub mod events;

pub use self::config::*;
pub use events::*;

use crate::error::{AppError, AppResult};
use actix_web::{HttpRequest, HttpResponse};

/// Default service: JSON 404 instead of an empty body.
pub async fn not_found(req: HttpRequest) -> AppResult<HttpResponse> {
    Err(AppError::NotFound(format!("{} {}", req.method(), req.path())))
}
