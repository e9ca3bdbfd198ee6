pub mod api;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod models;
pub mod render;
