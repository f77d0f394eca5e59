//! Brick Console - request/response exchanges over a game server console.

pub mod config;
pub mod console;
pub mod display;
pub mod engine;
pub mod queries;
