//! Service Registry - Load probe targets from JSON
//!
//! This module loads all service definitions from embedded JSON files
//! and provides lookup functions for the rest of the application.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Embedded service JSON files (compiled into the binary)
const SERVICE_FILES: &[&str] = &[
    include_str!("../services/maps.json"),
    include_str!("../services/ai.json"),
    include_str!("../services/web.json"),
];

/// Billing category of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Paid,
    Free,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Free => "free",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method used by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    #[default]
    Get,
    Post,
}

impl ProbeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// What a successful response body looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// JSON document; a non-JSON body means something went wrong
    #[default]
    Json,
    /// Images and other raw payloads
    Binary,
}

fn default_key_param() -> String {
    "key".to_string()
}

/// Service definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique slug, used for `--service` selection
    pub key: String,
    /// Unique display name
    pub name: String,
    pub category: Category,
    /// Endpoint URL without query string
    pub url: String,
    #[serde(default)]
    pub method: ProbeMethod,
    /// Static query parameters sent with every probe
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// JSON body for POST probes
    #[serde(default)]
    pub body: Option<Value>,
    /// Query parameter carrying the API key
    #[serde(default = "default_key_param")]
    pub key_param: String,
    #[serde(default)]
    pub response: ResponseKind,
    pub cost_info: String,
}

impl ServiceDescriptor {
    pub fn expects_json(&self) -> bool {
        self.response == ResponseKind::Json
    }
}

/// Root structure of services/*.json
#[derive(Debug, Clone, Deserialize)]
struct ServiceFile {
    services: Vec<ServiceDescriptor>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<Vec<ServiceDescriptor>> = OnceLock::new();

/// Get the full catalog in catalog order (loads from embedded JSON on first access)
pub fn get_registry() -> &'static [ServiceDescriptor] {
    REGISTRY.get_or_init(|| {
        let mut services = Vec::new();

        for content in SERVICE_FILES {
            let partial: ServiceFile = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded service JSON: {}", e));
            services.extend(partial.services);
        }

        services
    })
}

/// List catalog entries matching the category filter (`None` = all), in catalog order
pub fn list_services(filter: Option<Category>) -> Vec<&'static ServiceDescriptor> {
    get_registry()
        .iter()
        .filter(|s| filter.map_or(true, |c| s.category == c))
        .collect()
}

/// Get a service definition by key
pub fn get_service(key: &str) -> Option<&'static ServiceDescriptor> {
    get_registry().iter().find(|s| s.key == key)
}

/// Get all service keys (for `--service` help and errors)
pub fn get_all_service_keys() -> Vec<&'static str> {
    get_registry().iter().map(|s| s.key.as_str()).collect()
}
