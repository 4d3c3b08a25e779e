pub mod config;
pub mod listener;
pub mod protocol;
