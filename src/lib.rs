//! Newsletter analytics for Beehiiv publications.
//!
//! Raw API records are fetched into a [`cache::Snapshot`], normalized into
//! [`models`] entities, and derived into overview rollups, per-period metrics,
//! daily trends, acquisition-source growth, goal projections, unit economics
//! and headline format performance.

pub mod aggregate;
pub mod cache;
pub mod client;
pub mod config;
pub mod content;
pub mod db;
pub mod economics;
pub mod error;
pub mod export;
pub mod lenient;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod period;
pub mod pipeline;
pub mod projection;
pub mod rates;
pub mod raw;
pub mod report;
pub mod sources;
pub mod trends;

pub use error::{AnalyticsError, Result};
