//! Axum dashboard service for the informe pipeline.
//!
//! Exposes the report API (start, status, SSE stream, PDF download), the
//! health endpoints and the embedded dashboard page.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;
