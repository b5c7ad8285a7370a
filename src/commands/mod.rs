mod chat;
mod config;
mod models;

pub use chat::*;
pub use config::*;
pub use models::*;
