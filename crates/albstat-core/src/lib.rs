//! Core of the load balancer access log analyzer.
//! this crate parses ALB/ELB access log lines, classifies the target service
//! and folds records into a mergeable summary.
pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod source;

pub use aggregate::report::{RankedEntry, Report, ReportAssembler, ServiceCatalog};
pub use aggregate::{RunningAggregate, SkipCounts, TableMode};
pub use classifier::ServiceClassifier;
pub use config::{load_config, AnalyzerConfig};
pub use error::{ConfigError, SourceError};
pub use parser::{LineParser, SkipReason};
pub use pipeline::{AnalysisOutcome, Analyzer, CancelFlag, FileFailure};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// PROCESSING TIMES //

/// The three timing columns of an access log line, in seconds.
/// A component is `None` when the column was missing, unparsable or negative
/// (the load balancer writes `-1` when it could not reach a target).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimes {
    pub request: Option<f64>,
    pub backend: Option<f64>,
    pub response: Option<f64>,
}

impl ProcessingTimes {
    /// Sum of the present components, missing ones count as zero
    pub fn total(&self) -> f64 {
        self.components().flatten().sum()
    }

    /// true when at least one component was present
    pub fn has_any(&self) -> bool {
        self.components().any(|c| c.is_some())
    }

    fn components(&self) -> impl Iterator<Item = Option<f64>> {
        [self.request, self.backend, self.response].into_iter()
    }
}

// LOG RECORD //

/// One access log line after tokenizing, positional mapping and classification.
///
/// Fields degrade individually (empty text, `None`, zero) instead of failing
/// the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String, // raw timestamp text, not validated

    pub client: String, // client ip, usually with port, empty if schema has no client

    pub processing: ProcessingTimes,

    pub elb_status: String, // may be "-" when no response was sent

    pub backend_status: String,

    pub received_bytes: u64,

    pub sent_bytes: u64,

    pub request: String, // "METHOD url PROTOCOL"

    pub url: String, // url extracted from request, may be empty

    pub service: String, // classified service, empty when unmatched
}

impl LogRecord {
    /// Interpret the timestamp as RFC 3339 (the format both load balancer
    /// generations write). Returns `None` for anything else.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Client ip with the port stripped
    pub fn client_ip(&self) -> &str {
        client_ip(&self.client)
    }
}

/// strip the `:port` suffix of an `ip:port` pair.
/// bracketed IPv6 (`[::1]:443`) keeps the address inside the brackets
pub fn client_ip(client: &str) -> &str {
    if let Some(rest) = client.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match client.rsplit_once(':') {
        Some((ip, port)) if !ip.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => ip,
        _ => client,
    }
}
