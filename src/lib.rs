//! Check which Google Cloud / Google API services accept an API key.
//!
//! - [`catalog`] - The fixed set of services and their probe requests
//! - [`probe`] - Probe transport and response classification
//! - [`report`] - Ordered results with text and JSON renderings
//! - [`config`] - Optional user configuration

pub mod catalog;
pub mod config;
pub mod probe;
pub mod report;
