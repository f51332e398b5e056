//! Configuration for the analyzer, loaded from TOML

use crate::aggregate::TableMode;
use crate::error::ConfigError;
use crate::parser::schema::SchemaChoice;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_TOP_N: usize = 20;

// arcgis rest urls: .../rest/services/<folder>/<service>/MapServer/...
pub const DEFAULT_SERVICE_PATTERN: &str = r"/services/([^/]+/[^/?\s]+)";

// main config structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    // size of top clients / top urls tables
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    // "application", "classic" or a full [schema] table
    #[serde(default)]
    pub schema: SchemaChoice,

    #[serde(default)]
    pub table: TableMode,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    // services published on the map server, used to report idle ones
    #[serde(default)]
    pub known_services: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            schema: SchemaChoice::default(),
            table: TableMode::default(),
            classifier: ClassifierConfig::default(),
            known_services: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    // replaces "/" inside a captured service name
    #[serde(default = "default_separator")]
    pub separator: String,

    #[serde(default = "default_rules")]
    pub rules: Vec<PathRuleConfig>,

    #[serde(default = "default_special")]
    pub special: Vec<SpecialEndpoint>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            rules: default_rules(),
            special: default_special(),
        }
    }
}

// A path rule, capture group 1 becomes the service name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRuleConfig {
    pub name: String,
    pub pattern: String,
}

// A fixed endpoint mapped to a fixed label, compared case-insensitively
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialEndpoint {
    pub url: String,
    pub service: String,

    #[serde(default, rename = "match")]
    pub matching: EndpointMatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointMatch {
    Exact,
    #[default]
    Prefix,
}

// defualt value helpers for serde
fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_separator() -> String {
    ".".to_string()
}

fn default_rules() -> Vec<PathRuleConfig> {
    vec![PathRuleConfig {
        name: "arcgis-services".to_string(),
        pattern: DEFAULT_SERVICE_PATTERN.to_string(),
    }]
}

fn default_special() -> Vec<SpecialEndpoint> {
    vec![SpecialEndpoint {
        url: "https://geobank.bymoslo.no:443/Geocortex/Essentials/REST/viewers/geobank.geobank"
            .to_string(),
        service: "Geobank".to_string(),
        matching: EndpointMatch::Prefix,
    }]
}

impl AnalyzerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AnalyzerConfig = toml::from_str(content)?;
        // fail early on a bad custom layout
        config.schema.resolve()?;
        Ok(config)
    }
}

// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AnalyzerConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    AnalyzerConfig::from_toml(&content)
}
