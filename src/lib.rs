pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod records;
pub mod state;
pub mod store;
pub mod users;
pub mod validation;
