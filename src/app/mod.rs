pub mod adb;
pub mod camera;
pub mod companion;
pub mod config;
pub mod deeplink;
pub mod dev_options;
pub mod device;
pub mod error;
pub mod gfx;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod state;
pub mod threads;
