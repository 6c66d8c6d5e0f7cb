pub mod app;
pub mod commands;
pub mod config;
pub mod info;
pub mod output;
pub mod runtime;
pub mod simulate;
