pub mod config;
pub mod error;
pub mod identity;
pub mod server;
pub mod store;
pub mod users;
