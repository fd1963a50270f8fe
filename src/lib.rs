//! Demand Forecasting & Anomaly Detection Engine
//!
//! Turns per-scope historical demand into N-day-ahead forecasts with confidence
//! bounds, seasonal multipliers, accuracy scoring, anomaly findings, surge periods
//! and staffing recommendations. Storage sits behind [`repositories::SeriesRepository`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod metrics;
pub mod migrator;
pub mod ml;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::EngineConfig;
pub use errors::ServiceError;
pub use repositories::{InMemorySeriesRepository, SeaOrmSeriesRepository, SeriesRepository};
pub use services::{BatchOutcome, ForecastBundle, ForecastRequest, ForecastService};
