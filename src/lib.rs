pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod delay;
pub mod fetch;
pub mod fmt;
pub mod logging;
pub mod pagination;
pub mod state;
pub mod storage;
pub mod streaming;
pub mod surfaces;
pub mod tmdb;
pub mod utils;
