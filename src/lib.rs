// Library surface for the binary, headless tests and reuse.
pub mod app;
pub mod app_dirs;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod form;
pub mod geolocation;
pub mod logging;
pub mod map;
pub mod runtime;
pub mod storage;
pub mod store;
pub mod summary;
pub mod ui;
pub mod workout;
