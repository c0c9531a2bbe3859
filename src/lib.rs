pub mod analytics;
pub mod auth;
pub mod compiler;
pub mod config;
pub mod dashboard;
pub mod site;
