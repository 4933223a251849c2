//! HTTP and WebSocket surface for the tubeline download engine.

pub mod api;
pub mod metrics;
pub mod state;
