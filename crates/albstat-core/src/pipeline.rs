//! Parse-classify-aggregate over lines and files
//!
//! Files are independent: each one is folded into its own aggregate by a
//! rayon worker, and whole aggregates are merged afterwards in the order the
//! paths were given, so tie-breaking in top-N tables is reproducible.

use crate::aggregate::{RunningAggregate, TableMode};
use crate::classifier::ServiceClassifier;
use crate::config::AnalyzerConfig;
use crate::error::{ConfigError, SourceError};
use crate::parser::LineParser;
use crate::source::{open_log, LossyLines};
use crate::LogRecord;
use rayon::prelude::*;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared stop signal. Raising it makes in-flight files stop and get
/// discarded; files already folded are kept.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: SourceError,
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub aggregate: RunningAggregate,
    pub files_processed: usize,
    pub failures: Vec<FileFailure>,
}

pub struct Analyzer {
    parser: LineParser,
    mode: TableMode,
    cancel: Option<CancelFlag>,
}

impl Analyzer {
    pub fn new(parser: LineParser, mode: TableMode) -> Self {
        Self {
            parser,
            mode,
            cancel: None,
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, ConfigError> {
        let schema = config.schema.resolve()?;
        let classifier = ServiceClassifier::from_config(&config.classifier)?;
        Ok(Self::new(LineParser::new(schema, classifier), config.table))
    }

    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn parser(&self) -> &LineParser {
        &self.parser
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Fold already-read lines into a fresh aggregate
    pub fn fold_lines<I, S>(&self, lines: I) -> RunningAggregate
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut agg = RunningAggregate::new(self.mode);
        for line in lines {
            self.fold_line(&mut agg, line.as_ref());
        }
        agg
    }

    fn fold_line(&self, agg: &mut RunningAggregate, line: &str) {
        match self.parser.parse_line(line) {
            Ok(record) => agg.fold(&record),
            Err(reason) => {
                debug!(%reason, "Skipped line");
                agg.note_skipped(reason);
            }
        }
    }

    /// Lazily parse a reader into records, skipping lines that give none.
    /// For callers that need every record rather than the aggregate.
    pub fn records<'a, R: BufRead + 'a>(
        &'a self,
        reader: R,
    ) -> impl Iterator<Item = std::io::Result<LogRecord>> + 'a {
        LossyLines::new(reader).filter_map(move |line| match line {
            Ok(line) => self.parser.parse_line(&line).ok().map(Ok),
            Err(e) => Some(Err(e)),
        })
    }

    /// Fold one file. Any read error fails the whole file.
    pub fn analyze_file(&self, path: &Path) -> Result<RunningAggregate, SourceError> {
        let reader = open_log(path)?;
        let mut agg = RunningAggregate::new(self.mode);
        for line in LossyLines::new(reader) {
            if self.cancelled() {
                return Err(SourceError::Cancelled(path.to_path_buf()));
            }
            let line = line.map_err(|source| SourceError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            self.fold_line(&mut agg, &line);
        }
        debug!(path = %path.display(), records = agg.total(), "File analyzed");
        Ok(agg)
    }

    /// Fold many files in parallel and merge them in path order.
    /// `progress` is called from worker threads after each file.
    pub fn analyze_files<F>(&self, paths: &[PathBuf], progress: F) -> AnalysisOutcome
    where
        F: Fn(&Path) + Sync,
    {
        let results: Vec<Result<RunningAggregate, SourceError>> = paths
            .par_iter()
            .map(|path| {
                let result = self.analyze_file(path);
                progress(path);
                result
            })
            .collect();

        let mut aggregate = RunningAggregate::new(self.mode);
        let mut failures = Vec::new();
        let mut files_processed = 0;
        for (path, result) in paths.iter().zip(results) {
            match result {
                Ok(partial) => {
                    aggregate.merge(partial);
                    files_processed += 1;
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "Skipping file");
                    failures.push(FileFailure {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            files = files_processed,
            failed = failures.len(),
            records = aggregate.total(),
            skipped = aggregate.skipped().total(),
            "Analysis complete"
        );

        AnalysisOutcome {
            aggregate,
            files_processed,
            failures,
        }
    }
}
