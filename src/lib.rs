pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod rates;
pub mod repo;
pub mod telemetry;
