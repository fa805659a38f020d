//! Service catalog
//!
//! The fixed set of Google services the prober knows how to reach. Service
//! definitions are loaded from JSON files at compile time, so a new probe
//! target only needs a new catalog entry.
//!
//! # Catalog files
//!
//! Services are defined in JSON files under `src/services/`:
//! - `maps.json` - Maps Platform endpoints (geocoding, places, roads, ...)
//! - `ai.json` - Cloud AI endpoints (vision, language, speech, Gemini)
//! - `web.json` - YouTube, search and other web APIs
//!
//! Catalog order is file order, then entry order within each file. Every
//! listing preserves it.
//!
//! # Example
//!
//! ```
//! use gcp_keyprobe::catalog::{list_services, Category};
//!
//! let paid = list_services(Some(Category::Paid));
//! assert!(paid.iter().all(|s| s.category == Category::Paid));
//! ```

mod registry;

pub use registry::*;
