//! HTTP surface: routers, handlers, and the error envelope.

pub mod cache;
pub mod chat;
pub mod crawl;
pub mod detect;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod routes;
pub mod simulate;

pub use error::ApiError;
pub use routes::{create_app, AppState};
