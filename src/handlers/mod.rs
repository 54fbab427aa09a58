//! HTTP and socket request handlers.

mod admin;
mod auth;
mod health;
mod version;
mod ws;

pub use admin::shutdown;
pub use health::{livez, readyz};
pub use version::version;
pub use ws::ws_connect;
