//! IMS: a small bilingual inventory-management web application built around
//! an append-only stock-movement ledger.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod i18n;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use app::{create_router, AppState};
