// Final, immutable summary of a run

use super::{RunningAggregate, SkipCounts};
use crate::config::AnalyzerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub key: String,
    pub count: u64,
}

/// Services published on the map server. Passed in explicitly so the
/// report can list the ones that received no traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    names: Vec<String>,
}

impl ServiceCatalog {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // keep catalog order, drop duplicates
        let mut seen = HashSet::new();
        let names = names
            .into_iter()
            .map(Into::into)
            .filter(|n: &String| seen.insert(n.clone()))
            .collect();
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub total_requests: u64,
    pub total_received_bytes: u64,
    pub total_sent_bytes: u64,
    pub status_counts: BTreeMap<String, u64>,
    pub top_clients: Vec<RankedEntry>,
    pub top_urls: Vec<RankedEntry>,
    pub services: Vec<RankedEntry>,

    // catalog entries with zero requests, in catalog order
    pub idle_services: Vec<String>,

    // seconds, None when no record carried timing
    pub mean_latency: Option<f64>,

    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub skipped: SkipCounts,

    // top clients/urls come from space-saving counters
    pub approximate: bool,
}

impl Report {
    /// Status buckets ordered by count, largest first
    pub fn status_by_count(&self) -> Vec<RankedEntry> {
        let mut rows: Vec<RankedEntry> = self
            .status_counts
            .iter()
            .map(|(k, v)| RankedEntry {
                key: k.clone(),
                count: *v,
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        rows
    }
}

pub struct ReportAssembler {
    top_n: usize,
    catalog: ServiceCatalog,
}

impl ReportAssembler {
    pub fn new(top_n: usize, catalog: ServiceCatalog) -> Self {
        Self { top_n, catalog }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(config.top_n, ServiceCatalog::new(config.known_services.iter().cloned()))
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Snapshot a (merged) aggregate into a report. Pure; calling it twice
    /// on the same state gives equal reports.
    pub fn finalize(&self, agg: &RunningAggregate) -> Report {
        let ranked = |rows: Vec<(String, u64)>| -> Vec<RankedEntry> {
            rows.into_iter()
                .map(|(key, count)| RankedEntry { key, count })
                .collect()
        };

        let services = agg.services();
        let idle_services = self
            .catalog
            .names()
            .iter()
            .filter(|name| services.get(name).is_none())
            .cloned()
            .collect();

        let (first_seen, last_seen) = agg.time_span();

        Report {
            total_requests: agg.total(),
            total_received_bytes: agg.received_bytes(),
            total_sent_bytes: agg.sent_bytes(),
            status_counts: agg.status_counts().clone(),
            top_clients: ranked(agg.clients().top(self.top_n)),
            top_urls: ranked(agg.urls().top(self.top_n)),
            services: ranked(services.top(services.len())),
            idle_services,
            mean_latency: agg.mean_latency(),
            first_seen,
            last_seen,
            skipped: *agg.skipped(),
            approximate: agg.clients().is_approximate(),
        }
    }
}
