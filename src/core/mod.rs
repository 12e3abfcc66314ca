pub mod error;
pub mod models;
pub mod notifications;
pub mod retry;
pub mod settings;
pub mod store;
