use crate::compare::{ComparisonReport, ModelOutcome};
use crate::error::Result;
use crate::normalize::{value_text, Strictness};
use crate::types::ResultsTable;
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;

/// Differences listed per model per file before the rest are summarized.
const MAX_LISTED_DIFFERENCES: usize = 10;

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn write_results(path: &Path, table: &ResultsTable) -> Result<()> {
    write_json(path, table)
}

pub fn read_results(path: &Path) -> Result<ResultsTable> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

pub fn write_comparison(path: &Path, report: &ComparisonReport) -> Result<()> {
    write_json(path, report)
}

pub fn write_markdown(path: &Path, markdown: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, markdown)?;
    Ok(())
}

fn percent(v: f64) -> String {
    format!("{:.2}%", v)
}

fn short(text: &str) -> String {
    const MAX: usize = 60;
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() > MAX {
        let cut: String = single_line.chars().take(MAX).collect();
        format!("{}…", cut)
    } else {
        single_line
    }
}

/// Human-readable summary of a comparison.
pub fn render_markdown(report: &ComparisonReport, generated_at: &str) -> String {
    let mut md = String::new();
    // Writing into a String cannot fail.
    let _ = write_markdown_into(&mut md, report, generated_at);
    md
}

fn write_markdown_into(md: &mut String, report: &ComparisonReport, generated_at: &str) -> fmt::Result {
    writeln!(md, "# Invoice Extraction Accuracy Report\n")?;
    writeln!(md, "- Generated: {}", generated_at)?;
    writeln!(md, "- Truth model: `{}`", report.truth_model)?;
    let strictness = match report.strictness {
        Strictness::Basic => "basic",
        Strictness::Strict => "strict",
    };
    writeln!(md, "- Profile: {} ({} normalization)", report.profile, strictness)?;
    if report.excluded_paths.is_empty() {
        writeln!(md, "- Excluded fields: none")?;
    } else {
        let excluded: Vec<String> = report.excluded_paths.iter().map(|p| format!("`{}`", p)).collect();
        writeln!(md, "- Excluded fields: {}", excluded.join(", "))?;
    }
    writeln!(md, "- Files: {}\n", report.files.len())?;

    if report.files.is_empty() {
        writeln!(md, "No PDF documents were found, nothing was compared.")?;
        return Ok(());
    }

    writeln!(md, "## Model accuracy\n")?;
    writeln!(md, "| Model | Average accuracy | Files compared | Errors |")?;
    writeln!(md, "|---|---|---|---|")?;
    let truth = &report.summary.truth;
    writeln!(
        md,
        "| {} (truth) | reference | {} | {} |",
        truth.model, truth.success_count, truth.error_count
    )?;
    for m in &report.summary.models {
        let avg = m.average_accuracy.map(percent).unwrap_or_else(|| "n/a".to_string());
        writeln!(md, "| {} | {} | {} | {} |", m.model, avg, m.files_compared, m.error_count)?;
    }
    md.push('\n');

    if !report.summary.skipped_files.is_empty() {
        writeln!(md, "## Skipped files\n")?;
        for s in &report.summary.skipped_files {
            writeln!(md, "- `{}`: {}", s.file, s.note)?;
        }
        md.push('\n');
    }

    writeln!(md, "## Differences by file\n")?;
    for (file, cmp) in &report.files {
        if cmp.skipped.is_some() {
            continue;
        }
        writeln!(md, "### {}\n", file)?;
        for (model, outcome) in &cmp.models {
            match outcome {
                ModelOutcome::Failed { error } => {
                    writeln!(md, "- **{}**: failed ({})", model, short(error))?;
                }
                ModelOutcome::Compared(c) => {
                    writeln!(
                        md,
                        "- **{}**: {} ({}/{} fields)",
                        model,
                        percent(c.accuracy),
                        c.matching_fields,
                        c.total_fields
                    )?;
                    if !c.missing_fields.is_empty() {
                        let missing: Vec<String> = c
                            .missing_fields
                            .iter()
                            .take(MAX_LISTED_DIFFERENCES)
                            .map(|f| format!("`{}`", f))
                            .collect();
                        let more = c.missing_fields.len().saturating_sub(MAX_LISTED_DIFFERENCES);
                        let suffix = if more > 0 { format!(" and {} more", more) } else { String::new() };
                        writeln!(md, "  - missing: {}{}", missing.join(", "), suffix)?;
                    }
                    for d in c.differing_fields.iter().take(MAX_LISTED_DIFFERENCES) {
                        writeln!(
                            md,
                            "  - `{}`: model \"{}\" vs truth \"{}\"",
                            d.field,
                            short(&value_text(&d.model_value)),
                            short(&value_text(&d.truth_value))
                        )?;
                    }
                    if c.differing_fields.len() > MAX_LISTED_DIFFERENCES {
                        writeln!(
                            md,
                            "  - … {} more differing fields",
                            c.differing_fields.len() - MAX_LISTED_DIFFERENCES
                        )?;
                    }
                }
            }
        }
        md.push('\n');
    }
    Ok(())
}
