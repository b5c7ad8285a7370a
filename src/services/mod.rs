pub mod controller;
pub mod ollama;
pub mod registry;
pub mod session;
pub mod settings_service;
pub mod store;
pub mod title;
