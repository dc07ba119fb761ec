pub mod config;
pub mod connection;
pub mod credentials;
pub mod dedup;
pub mod handlers;
pub mod sender;
pub mod server;
pub mod transport;
