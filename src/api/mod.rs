//! HTTP API: render function, transcription route, forwarding route

pub mod handlers;
pub mod models;
pub mod server;

pub use server::{start_http_server, AppState};
