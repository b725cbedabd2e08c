//! Roomly: room listings and roommate search.
//!
//! Users register, log in, publish room listings with up to four photos and
//! browse everyone else's. Users live in a JSON document store with their
//! listings embedded; photos go to local disk or a remote image host.

pub mod auth;
pub mod config;
pub mod core;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod posts;
pub mod state;
pub mod static_server;
pub mod templates;
pub mod uploads;
pub mod users;

pub use config::Config;
pub use handlers::configure;
pub use middleware::SessionAuth;
pub use state::AppState;
