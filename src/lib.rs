pub mod caption;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod server;
pub mod usage;

pub use caption::{CaptionProvider, ModelClient, OpenRouterClient};
pub use config::Config;
pub use error::ApiError;
pub use server::{create_app, Server};
pub use usage::{Plan, Remaining, UsageTracker};
