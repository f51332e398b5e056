// albstat CLI - load balancer access log statistics

use albstat_core::parser::SchemaVariant;
use albstat_core::source::find_local_log_files;
use albstat_core::{
    load_config, AnalyzerConfig, Analyzer, CancelFlag, RankedEntry, Report, ReportAssembler,
    ServiceClassifier,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_DIR: &str = "elb_logs";

#[derive(Parser)]
#[command(name = "albstat")]
#[command(version = "0.1.0")]
#[command(about = "Access log statistics for load balancers", long_about = None)]
struct Cli {
    /// Config file (TOML). Built-in defaults when omitted
    #[arg(short, long, env = "ALBSTAT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze log files or directories of log files
    Analyze {
        /// Files or directories (.log, .gz, .txt)
        #[arg(env = "ALBSTAT_LOG_DIR", default_value = DEFAULT_LOG_DIR)]
        paths: Vec<PathBuf>,

        /// Size of the top clients / top urls tables
        #[arg(short, long)]
        top: Option<usize>,

        /// Log layout: application or classic
        #[arg(short, long)]
        schema: Option<String>,

        /// Print the report as JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Show which service a request or url is classified as
    Classify {
        /// Request ("GET <url> HTTP/1.1") or bare url
        request: String,
    },

    /// List the built-in log layouts
    Schemas,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logs go to stderr so --json output stays clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AnalyzerConfig::default(),
    };

    match cli.command {
        Commands::Analyze {
            paths,
            top,
            schema,
            json,
        } => {
            if let Some(top) = top {
                config.top_n = top;
            }
            if let Some(schema) = schema {
                config.schema = albstat_core::parser::SchemaChoice::Named(schema);
            }
            analyze(&config, &paths, json)?;
        }
        Commands::Classify { request } => {
            classify(&config, &request)?;
        }
        Commands::Schemas => {
            show_schemas();
        }
    }

    Ok(())
}

// expand directories into their log files, keep explicit files as given
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(find_local_log_files(path));
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn analyze(
    config: &AnalyzerConfig,
    paths: &[PathBuf],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = collect_files(paths);
    if files.is_empty() {
        println!("{}", "No log files to analyze.".yellow());
        return Ok(());
    }

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupted, discarding unfinished files");
        handler_flag.cancel();
    })?;

    let analyzer = Analyzer::from_config(config)?.with_cancel(cancel);

    let pb = indicatif::ProgressBar::new(files.len() as u64);
    pb.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")?
            .progress_chars("#>-"),
    );
    if json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let outcome = analyzer.analyze_files(&files, |_: &Path| pb.inc(1));
    pb.finish_and_clear();

    let report = ReportAssembler::from_config(config).finalize(&outcome.aggregate);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !outcome.failures.is_empty() {
        eprintln!("\n{}", "Files that could not be read:".red().bold());
        for failure in &outcome.failures {
            eprintln!("  {} {}", "✗".red(), failure.error);
        }
    }

    Ok(())
}

fn print_report(report: &Report) {
    println!("\n{}", "Summary".cyan().bold());
    println!("{}", "─".repeat(50).dimmed());
    println!("  {} {}", "Total requests:".dimmed(), report.total_requests.to_string().green());
    println!("  {} {}", "Received bytes:".dimmed(), report.total_received_bytes);
    println!("  {} {}", "Sent bytes:".dimmed(), report.total_sent_bytes);
    match report.mean_latency {
        Some(mean) => println!("  {} {:.1} ms", "Mean processing time:".dimmed(), mean * 1000.0),
        None => println!("  {} {}", "Mean processing time:".dimmed(), "N/A".yellow()),
    }
    if let (Some(first), Some(last)) = (report.first_seen, report.last_seen) {
        println!(
            "  {} {} → {}",
            "Period:".dimmed(),
            first.format("%Y-%m-%d %H:%M:%S"),
            last.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if report.skipped.total() > 0 {
        println!("  {} {}", "Skipped lines:".dimmed(), report.skipped.total().to_string().yellow());
    }
    if report.approximate {
        println!("  {}", "Top tables are approximate (space-saving counters)".yellow());
    }

    print_table("Status Codes", &["Status", "Count"], &report.status_by_count(), 0);
    print_table("Top Clients", &["Client IP", "Requests"], &report.top_clients, 0);
    print_table("Top URLs", &["URL", "Requests"], &report.top_urls, 80);
    print_table("Services", &["Service", "Requests"], &report.services, 0);

    if !report.idle_services.is_empty() {
        println!("\n{}", "Services without traffic".cyan().bold());
        for name in &report.idle_services {
            println!("  {}", name.dimmed());
        }
    }
    println!();
}

// max_width 0 means no truncation
fn print_table(title: &str, header: &[&str], rows: &[RankedEntry], max_width: usize) {
    if rows.is_empty() {
        return;
    }
    println!("\n{}", title.cyan().bold());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header.to_vec());
    for row in rows {
        table.add_row(vec![truncate(&row.key, max_width), row.count.to_string()]);
    }
    println!("{table}");
}

fn truncate(text: &str, max_width: usize) -> String {
    if max_width == 0 || text.chars().count() <= max_width {
        return text.to_string();
    }
    let head: String = text.chars().take(max_width.saturating_sub(3)).collect();
    format!("{}...", head)
}

fn classify(config: &AnalyzerConfig, request: &str) -> Result<(), Box<dyn std::error::Error>> {
    let classifier = ServiceClassifier::from_config(&config.classifier)?;

    // accept a bare url as well as a full request
    let url = match ServiceClassifier::extract_url(request) {
        "" => request.trim(),
        url => url,
    };
    let service = classifier.classify_url(url);

    println!("  {} {}", "URL:".dimmed(), url);
    if service.is_empty() {
        println!("  {} {}", "Service:".dimmed(), "unclassified".yellow());
    } else {
        println!("  {} {}", "Service:".dimmed(), service.green().bold());
    }
    println!(
        "  {} {}",
        "Rules:".dimmed(),
        classifier.rule_names().collect::<Vec<_>>().join(", ")
    );
    Ok(())
}

fn show_schemas() {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Schema", "Timestamp", "Client", "Timings", "ELB/Backend", "Bytes", "Request",
    ]);

    for variant in [SchemaVariant::Application, SchemaVariant::Classic] {
        let s = variant.schema();
        table.add_row(vec![
            s.name.clone(),
            s.timestamp.to_string(),
            s.client.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            format!("{}-{}", s.processing[0], s.processing[2]),
            format!("{}, {}", s.elb_status, s.backend_status),
            format!("{}, {}", s.received_bytes, s.sent_bytes),
            s.request.to_string(),
        ]);
    }
    println!("{table}");
}
