//! Streaming aggregation of access log records
//!
//! A `RunningAggregate` is owned by one worker, fed with `fold`, and combined
//! with other workers' aggregates through `merge` once they are complete.

pub mod frequency;
pub mod report;

pub use frequency::FrequencyTable;

use crate::parser::SkipReason;
use crate::LogRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status bucket used when neither status column has any text
pub const UNKNOWN_STATUS: &str = "unknown";

// latency is summed in whole nanoseconds so merging is exact
const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// How client and url tables count keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TableMode {
    #[default]
    Exact,
    // bounded, approximate counts for very large inputs
    SpaceSaving { capacity: usize },
}

impl TableMode {
    fn table(self) -> FrequencyTable {
        match self {
            TableMode::Exact => FrequencyTable::exact(),
            TableMode::SpaceSaving { capacity } => FrequencyTable::bounded(capacity),
        }
    }
}

/// Lines that produced no record, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub blank: u64,
    pub comment: u64,
    pub unbalanced: u64,
    pub too_few_fields: u64,
}

impl SkipCounts {
    pub fn total(&self) -> u64 {
        self.blank + self.comment + self.unbalanced + self.too_few_fields
    }

    fn add(&mut self, other: &SkipCounts) {
        self.blank += other.blank;
        self.comment += other.comment;
        self.unbalanced += other.unbalanced;
        self.too_few_fields += other.too_few_fields;
    }
}

/// Normalize a status pair into a histogram bucket.
///
/// The elb status is tried first, then the backend status: a numeric value
/// becomes `<first digit>xx`. If neither is numeric the bucket is the literal
/// status text (elb first), or `unknown` when both are empty.
pub fn status_bucket(elb: &str, backend: &str) -> String {
    let numeric = [elb, backend]
        .into_iter()
        .find_map(|s| s.trim().parse::<u32>().ok());
    if let Some(code) = numeric {
        return format!("{}xx", code / 100);
    }
    [elb, backend]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_STATUS)
        .to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunningAggregate {
    mode: TableMode,
    total: u64,
    status: BTreeMap<String, u64>,
    clients: FrequencyTable,
    urls: FrequencyTable,
    services: FrequencyTable,
    received_bytes: u64,
    sent_bytes: u64,
    latency_nanos: u128,
    latency_count: u64,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    skipped: SkipCounts,
}

impl Default for RunningAggregate {
    fn default() -> Self {
        Self::new(TableMode::Exact)
    }
}

impl RunningAggregate {
    pub fn new(mode: TableMode) -> Self {
        Self {
            mode,
            total: 0,
            status: BTreeMap::new(),
            clients: mode.table(),
            urls: mode.table(),
            // services are a short, known list, always exact
            services: FrequencyTable::exact(),
            received_bytes: 0,
            sent_bytes: 0,
            latency_nanos: 0,
            latency_count: 0,
            first_seen: None,
            last_seen: None,
            skipped: SkipCounts::default(),
        }
    }

    /// Fold one record into the running state
    pub fn fold(&mut self, record: &LogRecord) {
        let ordinal = self.total;
        self.total += 1;

        *self
            .status
            .entry(status_bucket(&record.elb_status, &record.backend_status))
            .or_insert(0) += 1;

        let ip = record.client_ip();
        if !ip.is_empty() {
            self.clients.observe(ip, ordinal);
        }
        if !record.url.is_empty() {
            self.urls.observe(&record.url, ordinal);
        }
        if !record.service.is_empty() {
            self.services.observe(&record.service, ordinal);
        }

        // byte totals stick at u64::MAX instead of overflowing
        self.received_bytes = self.received_bytes.saturating_add(record.received_bytes);
        self.sent_bytes = self.sent_bytes.saturating_add(record.sent_bytes);

        if record.processing.has_any() {
            let nanos = (record.processing.total() * NANOS_PER_SECOND).round() as u128;
            self.latency_nanos = self.latency_nanos.saturating_add(nanos);
            self.latency_count += 1;
        }

        if let Some(ts) = record.parsed_timestamp() {
            self.first_seen = Some(self.first_seen.map_or(ts, |f| f.min(ts)));
            self.last_seen = Some(self.last_seen.map_or(ts, |l| l.max(ts)));
        }
    }

    pub fn note_skipped(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Blank => self.skipped.blank += 1,
            SkipReason::Comment => self.skipped.comment += 1,
            SkipReason::Unbalanced => self.skipped.unbalanced += 1,
            SkipReason::TooFewFields(_) => self.skipped.too_few_fields += 1,
        }
    }

    /// Combine a complete aggregate into this one. `other` counts as
    /// observed after everything already folded here, which only matters
    /// for tie-breaking in top-N tables.
    pub fn merge(&mut self, other: RunningAggregate) {
        let offset = self.total;
        self.total += other.total;

        for (bucket, count) in other.status {
            *self.status.entry(bucket).or_insert(0) += count;
        }
        self.clients.merge(other.clients, offset);
        self.urls.merge(other.urls, offset);
        self.services.merge(other.services, offset);

        self.received_bytes = self.received_bytes.saturating_add(other.received_bytes);
        self.sent_bytes = self.sent_bytes.saturating_add(other.sent_bytes);
        self.latency_nanos = self.latency_nanos.saturating_add(other.latency_nanos);
        self.latency_count += other.latency_count;

        self.first_seen = match (self.first_seen, other.first_seen) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_seen = match (self.last_seen, other.last_seen) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.skipped.add(&other.skipped);
    }

    /// Shorthand for `ReportAssembler::new(top_n, empty catalog).finalize(self)`
    pub fn finalize(&self, top_n: usize) -> report::Report {
        report::ReportAssembler::new(top_n, report::ServiceCatalog::default()).finalize(self)
    }

    pub fn mode(&self) -> TableMode {
        self.mode
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn status_counts(&self) -> &BTreeMap<String, u64> {
        &self.status
    }

    pub fn clients(&self) -> &FrequencyTable {
        &self.clients
    }

    pub fn urls(&self) -> &FrequencyTable {
        &self.urls
    }

    pub fn services(&self) -> &FrequencyTable {
        &self.services
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }

    pub fn latency_count(&self) -> u64 {
        self.latency_count
    }

    /// Mean processing time in seconds over records with any timing
    pub fn mean_latency(&self) -> Option<f64> {
        if self.latency_count == 0 {
            return None;
        }
        Some(self.latency_nanos as f64 / self.latency_count as f64 / NANOS_PER_SECOND)
    }

    pub fn time_span(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (self.first_seen, self.last_seen)
    }

    pub fn skipped(&self) -> &SkipCounts {
        &self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProcessingTimes;

    fn record(client: &str, status: &str, url: &str) -> LogRecord {
        LogRecord {
            timestamp: "2026-02-01T19:40:27.217624Z".to_string(),
            client: client.to_string(),
            processing: ProcessingTimes::default(),
            elb_status: status.to_string(),
            backend_status: status.to_string(),
            received_bytes: 10,
            sent_bytes: 100,
            request: format!("GET {} HTTP/1.1", url),
            url: url.to_string(),
            service: String::new(),
        }
    }

    #[test]
    fn test_status_bucket() {
        assert_eq!(status_bucket("200", "200"), "2xx");
        assert_eq!(status_bucket("504", "-"), "5xx");
        assert_eq!(status_bucket("301", ""), "3xx");
        assert_eq!(status_bucket("-", "404"), "4xx");
        assert_eq!(status_bucket("-", "-"), "-");
        assert_eq!(status_bucket("", ""), UNKNOWN_STATUS);
    }

    #[test]
    fn test_histogram_sums_to_total() {
        let mut agg = RunningAggregate::default();
        for status in ["200", "200", "502", "-", "abc", "301"] {
            agg.fold(&record("1.1.1.1:1", status, "https://x/"));
        }
        let sum: u64 = agg.status_counts().values().sum();
        assert_eq!(sum, agg.total());
        assert_eq!(agg.status_counts().get("2xx"), Some(&2));
        assert_eq!(agg.status_counts().get("-"), Some(&1));
        assert_eq!(agg.status_counts().get("abc"), Some(&1));
    }

    #[test]
    fn test_clients_counted_without_port() {
        let mut agg = RunningAggregate::default();
        agg.fold(&record("10.0.0.1:1000", "200", "https://x/"));
        agg.fold(&record("10.0.0.1:2000", "200", "https://x/"));
        assert_eq!(agg.clients().get("10.0.0.1").map(|c| c.count), Some(2));
    }

    #[test]
    fn test_mean_latency() {
        let mut agg = RunningAggregate::default();
        agg.fold(&record("a:1", "200", ""));
        assert_eq!(agg.mean_latency(), None);

        let mut timed = record("a:1", "200", "");
        timed.processing = ProcessingTimes {
            request: Some(0.001),
            backend: Some(0.029),
            response: None,
        };
        agg.fold(&timed);
        timed.processing.response = Some(0.010);
        agg.fold(&timed);

        assert_eq!(agg.latency_count(), 2);
        let mean = agg.mean_latency().unwrap();
        assert!((mean - 0.035).abs() < 1e-9, "mean was {}", mean);
    }

    #[test]
    fn test_huge_values_saturate() {
        let mut agg = RunningAggregate::default();
        let mut big = record("a:1", "200", "");
        big.received_bytes = u64::MAX;
        big.sent_bytes = u64::MAX;
        big.processing.request = Some(1e13);
        agg.fold(&big);
        agg.fold(&big);

        let mut other = RunningAggregate::default();
        other.fold(&big);
        agg.merge(other);

        assert_eq!(agg.total(), 3);
        assert_eq!(agg.received_bytes(), u64::MAX);
        assert_eq!(agg.sent_bytes(), u64::MAX);
        let mean = agg.mean_latency().unwrap();
        assert!((mean - 1e13).abs() < 1.0, "mean was {}", mean);
    }

    #[test]
    fn test_sub_microsecond_latency_kept() {
        let mut agg = RunningAggregate::default();
        let mut fast = record("a:1", "200", "");
        fast.processing.request = Some(0.0000004);
        agg.fold(&fast);
        let mean = agg.mean_latency().unwrap();
        assert!((mean - 4e-7).abs() < 1e-15, "mean was {}", mean);
    }

    #[test]
    fn test_skip_counts() {
        let mut agg = RunningAggregate::default();
        agg.note_skipped(SkipReason::Blank);
        agg.note_skipped(SkipReason::TooFewFields(3));
        agg.note_skipped(SkipReason::TooFewFields(5));
        assert_eq!(agg.skipped().too_few_fields, 2);
        assert_eq!(agg.skipped().total(), 3);
        assert_eq!(agg.total(), 0);
    }
}
