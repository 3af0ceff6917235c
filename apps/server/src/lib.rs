pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod main_lib;
pub mod scheduler;
pub mod tools;
