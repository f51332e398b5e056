// Field layouts for access log lines.
//
// `Application` matches what application load balancers write today:
// connection type, timestamp, load balancer name, then the client.
// `Classic` is the older layout these logs were first read with, one
// position to the left from the client on. Its exact source format is not
// confirmed and it does not line up with raw classic ELB output (which
// starts with the timestamp), so treat it as a legacy layout and use a
// custom `[schema]` for anything else. The request sits at index 12 in both.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Minimum number of fields for any access log line
pub const MIN_FIELDS: usize = 12;

/// Named built-in layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVariant {
    Classic,
    #[default]
    Application,
}

impl SchemaVariant {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "classic" | "elb" => Some(Self::Classic),
            "application" | "alb" => Some(Self::Application),
            _ => None,
        }
    }

    pub fn schema(self) -> Schema {
        match self {
            SchemaVariant::Classic => Schema {
                name: "classic".to_string(),
                min_fields: MIN_FIELDS,
                timestamp: 1,
                client: Some(2),
                processing: [4, 5, 6],
                elb_status: 7,
                backend_status: 8,
                received_bytes: 9,
                sent_bytes: 10,
                request: 12,
            },
            SchemaVariant::Application => Schema {
                name: "application".to_string(),
                min_fields: MIN_FIELDS,
                timestamp: 1,
                client: Some(3),
                processing: [5, 6, 7],
                elb_status: 8,
                backend_status: 9,
                received_bytes: 10,
                sent_bytes: 11,
                request: 12,
            },
        }
    }
}

/// Positional mapping from token index to record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,

    #[serde(default = "default_min_fields")]
    pub min_fields: usize,

    pub timestamp: usize,

    // layouts without a client column leave this out
    #[serde(default)]
    pub client: Option<usize>,

    // request, backend, response processing time
    pub processing: [usize; 3],

    pub elb_status: usize,
    pub backend_status: usize,
    pub received_bytes: usize,
    pub sent_bytes: usize,
    pub request: usize,
}

fn default_min_fields() -> usize {
    MIN_FIELDS
}

impl Default for Schema {
    fn default() -> Self {
        SchemaVariant::default().schema()
    }
}

impl Schema {
    /// Largest token index this layout reads, except the request which may
    /// be missing on short lines
    pub fn max_required_index(&self) -> usize {
        let mut max = self
            .processing
            .iter()
            .copied()
            .chain([
                self.timestamp,
                self.elb_status,
                self.backend_status,
                self.received_bytes,
                self.sent_bytes,
            ])
            .max()
            .unwrap_or(0);
        if let Some(client) = self.client {
            max = max.max(client);
        }
        max
    }

    /// check a user supplied layout
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_fields < MIN_FIELDS {
            return Err(ConfigError::InvalidSchema {
                name: self.name.clone(),
                reason: format!("min_fields must be at least {}", MIN_FIELDS),
            });
        }
        if self.max_required_index() >= self.min_fields {
            return Err(ConfigError::InvalidSchema {
                name: self.name.clone(),
                reason: format!(
                    "field index {} is beyond min_fields {}",
                    self.max_required_index(),
                    self.min_fields
                ),
            });
        }
        Ok(())
    }
}

/// Schema selection as written in config: a variant name or a full layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaChoice {
    Named(String),
    Custom(Schema),
}

impl Default for SchemaChoice {
    fn default() -> Self {
        SchemaChoice::Named("application".to_string())
    }
}

impl SchemaChoice {
    pub fn resolve(&self) -> Result<Schema, ConfigError> {
        match self {
            SchemaChoice::Named(name) => SchemaVariant::from_name(name)
                .map(SchemaVariant::schema)
                .ok_or_else(|| ConfigError::UnknownSchema(name.clone())),
            SchemaChoice::Custom(schema) => {
                schema.validate()?;
                Ok(schema.clone())
            }
        }
    }
}
