use albstat_core::source::find_local_log_files;
use albstat_core::{
    load_config, Analyzer, AnalyzerConfig, CancelFlag, ReportAssembler, SourceError, TableMode,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

fn alb_line(second: u32, client: u8, service: &str, status: &str) -> String {
    format!(
        r#"h2 2026-02-01T19:40:{:02}.000000Z app/alb-new-gis-prod/51fa1287639c83c0 88.89.241.{}:54514 10.2.64.202:6443 0.029 0.001 0.000 {} {} 57 4186 "GET https://geodata.bymoslo.no:443/arcgis/rest/services/{}/MapServer/3?f=json HTTP/2.0" "Mozilla/5.0""#,
        second, client, status, status, service
    )
}

fn sample_lines() -> Vec<String> {
    vec![
        "#comment".to_string(),
        alb_line(1, 1, "geodata/Parkering", "200"),
        alb_line(2, 2, "geodata/Parkering", "200"),
        alb_line(3, 1, "basis/Bydeler", "504"),
        String::new(),
        "garbage line".to_string(),
        alb_line(4, 3, "geodata/Parkering", "301"),
    ]
}

fn write_plain(path: &Path, lines: &[String]) {
    let mut file = File::create(path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}

fn write_gz(path: &Path, lines: &[String]) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    for line in lines {
        writeln!(encoder, "{}", line).unwrap();
    }
    encoder.finish().unwrap();
}

fn analyzer() -> Analyzer {
    Analyzer::from_config(&AnalyzerConfig::default()).unwrap()
}

#[test]
fn test_gzip_and_plain_give_same_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("a.log");
    let gz = dir.path().join("a.log.gz");
    write_plain(&plain, &sample_lines());
    write_gz(&gz, &sample_lines());

    let analyzer = analyzer();
    let from_plain = analyzer.analyze_file(&plain).unwrap();
    let from_gz = analyzer.analyze_file(&gz).unwrap();

    assert_eq!(from_plain, from_gz);
    assert_eq!(from_plain.total(), 4);
    assert_eq!(from_plain.skipped().total(), 3);
}

#[test]
fn test_analyze_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(&dir.path().join("01.log.gz"), &sample_lines());
    write_plain(&dir.path().join("02.log"), &sample_lines());
    write_plain(&dir.path().join("readme.md"), &sample_lines());

    let files = find_local_log_files(dir.path());
    assert_eq!(files.len(), 2);

    let seen = AtomicUsize::new(0);
    let outcome = analyzer().analyze_files(&files, |_| {
        seen.fetch_add(1, Ordering::Relaxed);
    });

    assert_eq!(seen.load(Ordering::Relaxed), 2);
    assert_eq!(outcome.files_processed, 2);
    assert!(outcome.failures.is_empty());

    let config = AnalyzerConfig {
        known_services: vec!["geodata.Parkering".to_string(), "basis.Veier".to_string()],
        ..AnalyzerConfig::default()
    };
    let report = ReportAssembler::from_config(&config).finalize(&outcome.aggregate);

    println!("Report: {:#?}", report);

    assert_eq!(report.total_requests, 8);
    assert_eq!(report.total_received_bytes, 8 * 57);
    assert_eq!(report.total_sent_bytes, 8 * 4186);
    assert_eq!(report.status_counts.get("2xx"), Some(&4));
    assert_eq!(report.status_counts.get("5xx"), Some(&2));
    assert_eq!(report.status_counts.get("3xx"), Some(&2));
    assert_eq!(report.top_clients[0].key, "88.89.241.1");
    assert_eq!(report.top_clients[0].count, 4);
    assert_eq!(report.services[0].key, "geodata.Parkering");
    assert_eq!(report.services[0].count, 6);
    assert_eq!(report.idle_services, vec!["basis.Veier"]);
    assert_eq!(report.skipped.comment, 2);
    assert_eq!(report.skipped.too_few_fields, 2);
    assert!((report.mean_latency.unwrap() - 0.030).abs() < 1e-9);
}

#[test]
fn test_failed_file_does_not_abort_run() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.log");
    write_plain(&good, &sample_lines());
    let missing = dir.path().join("missing.log");
    // not gzip despite the name, fails while reading
    let corrupt = dir.path().join("corrupt.log.gz");
    write_plain(&corrupt, &sample_lines());

    let files: Vec<PathBuf> = vec![missing.clone(), good, corrupt.clone()];
    let outcome = analyzer().analyze_files(&files, |_| {});

    assert_eq!(outcome.files_processed, 1);
    assert_eq!(outcome.aggregate.total(), 4);
    assert_eq!(outcome.failures.len(), 2);
    assert_eq!(outcome.failures[0].path, missing);
    assert!(matches!(outcome.failures[0].error, SourceError::Open { .. }));
    assert_eq!(outcome.failures[1].path, corrupt);
    assert!(matches!(outcome.failures[1].error, SourceError::Read { .. }));
}

#[test]
fn test_cancelled_run_discards_in_flight_files() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.log");
    let second = dir.path().join("second.log");
    write_plain(&first, &sample_lines());
    write_plain(&second, &sample_lines());

    let flag = CancelFlag::new();
    let analyzer = analyzer().with_cancel(flag.clone());

    // one file finished before the cancel
    let mut merged = analyzer.analyze_file(&first).unwrap();
    flag.cancel();

    let outcome = analyzer.analyze_files(&[second.clone()], |_| {});
    assert_eq!(outcome.files_processed, 0);
    assert!(matches!(outcome.failures[0].error, SourceError::Cancelled(ref p) if p == &second));

    merged.merge(outcome.aggregate);
    assert_eq!(merged.total(), 4);
}

#[test]
fn test_merge_order_follows_file_list() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.log");
    let b = dir.path().join("b.log");
    // one request each from different clients: a tie decided by file order
    write_plain(&a, &[alb_line(1, 7, "geodata/Parkering", "200")]);
    write_plain(&b, &[alb_line(1, 9, "geodata/Parkering", "200")]);

    let analyzer = analyzer();
    for _ in 0..5 {
        let ab = analyzer.analyze_files(&[a.clone(), b.clone()], |_| {}).aggregate.finalize(1);
        assert_eq!(ab.top_clients[0].key, "88.89.241.7");
        let ba = analyzer.analyze_files(&[b.clone(), a.clone()], |_| {}).aggregate.finalize(1);
        assert_eq!(ba.top_clients[0].key, "88.89.241.9");
    }
}

#[test]
fn test_shipped_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/albstat.toml");
    let config = load_config(&path).unwrap();

    assert_eq!(config.top_n, 20);
    assert_eq!(config.table, TableMode::Exact);
    assert_eq!(config.known_services.len(), 3);

    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("a.log");
    write_plain(&log, &sample_lines());

    let analyzer = Analyzer::from_config(&config).unwrap();
    let outcome = analyzer.analyze_files(&[log], |_| {});
    let report = ReportAssembler::from_config(&config).finalize(&outcome.aggregate);
    assert_eq!(report.idle_services, vec!["Geobank"]);
}
