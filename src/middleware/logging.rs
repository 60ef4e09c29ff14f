use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{debug, error, info, warn};

/// Health checks arrive every few seconds and would drown the event log.
fn is_health_check(path: &str) -> bool {
    path == "/health" || path == "/api/v1/health"
}

pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let health_check = is_health_check(&path);
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        if health_check {
            debug!(method = %method, path = %path, "Health check");
        } else {
            info!(method = %method, path = %path, remote_addr = %remote_addr, "Request started");
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis();

            match &result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() {
                        error!(method = %method, path = %path, status = status.as_u16(), duration_ms = %duration_ms, "Request completed");
                    } else if status.is_client_error() {
                        warn!(method = %method, path = %path, status = status.as_u16(), duration_ms = %duration_ms, "Request rejected");
                    } else if !health_check {
                        info!(method = %method, path = %path, status = status.as_u16(), duration_ms = %duration_ms, "Request completed");
                    }
                }
                Err(err) => {
                    error!(
                        method = %method,
                        path = %path,
                        remote_addr = %remote_addr,
                        duration_ms = %duration_ms,
                        error = %err,
                        "Request failed"
                    );
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    #[actix_web::test]
    async fn test_health_check_paths() {
        assert!(is_health_check("/health"));
        assert!(is_health_check("/api/v1/health"));
        assert!(!is_health_check("/api/v1/events"));
    }

    #[actix_web::test]
    async fn test_passes_responses_through() {
        let app = test::init_service(
            App::new()
                .wrap(RequestLogging)
                .route("/teapot", web::get().to(|| async { HttpResponse::ImATeapot().finish() })),
        )
        .await;

        let req = test::TestRequest::get().uri("/teapot").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 418);
    }
}
