//! Sequential batch driver: discover files, run every model on every file,
//! score against the truth model, write the outputs.

use crate::compare::{compare_results, ComparisonReport};
use crate::config::Config;
use crate::db::Db;
use crate::discovery::{file_key, list_pdf_files};
use crate::error::Result;
use crate::inference::{extract_document, InferenceBackend};
use crate::report;
use crate::types::{ExtractionResult, ResultsTable};
use std::time::Duration;

/// Spacing applied between consecutive remote calls.
pub trait Pacer {
    fn pause(&self);
}

/// Sleeps a fixed interval.
pub struct FixedDelay(pub Duration);

impl Pacer for FixedDelay {
    fn pause(&self) {
        if !self.0.is_zero() {
            std::thread::sleep(self.0);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    DiscoveringFiles,
    Invoking,
    Aggregating,
    Reporting,
    Done,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub results: ResultsTable,
    pub comparison: ComparisonReport,
    pub markdown: String,
    /// Remote calls actually made (resumed pairs are not counted).
    pub calls_made: usize,
}

pub struct BatchRunner<'a> {
    config: &'a Config,
    backend: &'a dyn InferenceBackend,
    pacer: &'a dyn Pacer,
    history: Option<Db>,
    phase: RunPhase,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a Config, backend: &'a dyn InferenceBackend, pacer: &'a dyn Pacer) -> Self {
        Self {
            config,
            backend,
            pacer,
            history: None,
            phase: RunPhase::Idle,
        }
    }

    pub fn with_history(mut self, db: Db) -> Self {
        self.history = Some(db);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::debug!("batch phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    pub fn run(&mut self) -> Result<RunOutcome> {
        self.enter(RunPhase::DiscoveringFiles);
        let files = list_pdf_files(&self.config.input_dir);
        tracing::info!("Found {} PDF file(s) in {}", files.len(), self.config.input_dir.display());

        let mut results = ResultsTable::new();
        let mut calls_made = 0;

        if !files.is_empty() {
            self.enter(RunPhase::Invoking);
            let total = files.len() * self.config.models.len();
            let mut step = 0;
            for path in &files {
                let file = file_key(path);
                results.ensure_file(&file);
                for model in &self.config.models {
                    step += 1;
                    if let Some(previous) = self.resumed(&file, model) {
                        tracing::info!("[{}/{}] Skipping {} -> {} (already extracted)", step, total, file, model);
                        results.record(&file, model, previous);
                        continue;
                    }
                    if calls_made > 0 {
                        self.pacer.pause();
                    }
                    tracing::info!("[{}/{}] {} -> {}", step, total, file, model);
                    let result = extract_document(self.backend, path, model, &self.config.profile.prompt);
                    calls_made += 1;
                    if let Some(e) = result.error() {
                        tracing::warn!("✗ {} / {}: {}", file, model, e.error);
                    }
                    self.log_history(&file, model, &result);
                    results.record(&file, model, result);
                }
            }
        } else {
            tracing::warn!("No PDF files to process; writing an empty report");
        }

        self.enter(RunPhase::Aggregating);
        let comparison = compare_results(
            &results,
            &self.config.truth_model,
            &self.config.models,
            &self.config.profile,
        );

        self.enter(RunPhase::Reporting);
        let markdown = report::render_markdown(&comparison, &chrono::Utc::now().to_rfc3339());
        report::write_results(&self.config.results_path(), &results)?;
        report::write_comparison(&self.config.comparison_path(), &comparison)?;
        report::write_markdown(&self.config.report_path(), &markdown)?;
        tracing::info!("Results saved to {}", self.config.output_dir.display());

        self.enter(RunPhase::Done);
        Ok(RunOutcome {
            results,
            comparison,
            markdown,
            calls_made,
        })
    }

    fn resumed(&self, file: &str, model: &str) -> Option<ExtractionResult> {
        if !self.config.resume {
            return None;
        }
        let db = self.history.as_ref()?;
        match db.latest_success(file, model, self.config.profile.kind) {
            Ok(v) => v.map(ExtractionResult::Parsed),
            Err(e) => {
                tracing::warn!("History lookup failed for {} / {}: {}", file, model, e);
                None
            }
        }
    }

    fn log_history(&self, file: &str, model: &str, result: &ExtractionResult) {
        if let Some(db) = &self.history {
            if let Err(e) = db.add_extraction(file, model, self.config.profile.kind, result) {
                tracing::warn!("Could not record history for {} / {}: {}", file, model, e);
            }
        }
    }
}

/// Re-scores an existing results file and rewrites the comparison and report.
pub fn rescore(config: &Config) -> Result<(ComparisonReport, String)> {
    let results = report::read_results(&config.results_path())?;
    let comparison = compare_results(&results, &config.truth_model, &config.models, &config.profile);
    let markdown = report::render_markdown(&comparison, &chrono::Utc::now().to_rfc3339());
    report::write_comparison(&config.comparison_path(), &comparison)?;
    report::write_markdown(&config.report_path(), &markdown)?;
    Ok((comparison, markdown))
}
