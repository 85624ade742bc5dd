//! Polacquire - human-assisted carrier portal acquisition.
//!
//! Scrapes policy records from carrier web portals through a remote browser
//! the operator has already logged into. The human handles authentication;
//! the pipeline handles pagination, extraction, and durable persistence.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod repository;
pub mod scrape;
pub mod server;
pub mod services;
pub mod worker;
