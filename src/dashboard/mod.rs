//! Dashboard data endpoints
//!
//! Serves what an operator console needs beyond pipeline control:
//! - Detection history (list and irreversible clear)
//! - User settings (read and live update)
//! - Live pipeline updates over WebSocket

pub mod handler;
pub mod websocket;

pub use handler::{
    clear_history_handler, history_handler, settings_handler, update_settings_handler,
};
pub use websocket::websocket_handler;
