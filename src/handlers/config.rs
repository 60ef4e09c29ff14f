use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Effective configuration. Nothing in it is secret; tokens arrive per request.
pub async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": state.get_config()
    }))
}
