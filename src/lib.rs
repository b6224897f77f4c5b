pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod seed;
pub mod store;
pub mod util;
