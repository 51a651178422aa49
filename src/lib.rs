//! PPE monitor - adaptive real-time PPE compliance detection
//!
//! This library captures camera frames, sends them to a remote detection
//! backend over a persistent WebSocket, paces requests by observed latency,
//! and turns responses into compliance state, alerts and a persisted history.

pub mod alert;
pub mod api;
pub mod capture;
pub mod cli;
pub mod config;
pub mod connection;
pub mod dashboard;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod ppe;
pub mod protocol;
pub mod reconciler;
pub mod scheduler;
pub mod settings;
