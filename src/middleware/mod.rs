//! Request logging and per-endpoint metrics, wrapped around every route in `main`.

pub mod logging;
pub mod metrics;

pub use logging::RequestLogging;
pub use metrics::MetricsMiddleware;
