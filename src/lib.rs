pub mod config;
pub mod deadman;
pub mod driver;
pub mod link;
pub mod messages;
pub mod motor;
pub mod runtime;
