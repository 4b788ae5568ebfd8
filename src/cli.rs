//! One-shot CLI commands.
//!
//! Each command builds [`Services`] from configuration, runs against the
//! same orchestrator and search engine the HTTP server uses, and prints to
//! stdout. Failures print `Error: <message>` to stderr and exit with
//! status 1.

use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;

use reqtrace_core::models::{AnalysisResult, FileNames, JobFiles, Phase, SearchableItem};
use reqtrace_core::search::SearchScope;

use crate::app::Services;
use crate::config::Config;

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn read_upload(path: &Path) -> Result<(String, String)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((name, base64::engine::general_purpose::STANDARD.encode(bytes)))
}

/// Submit the files, drive the job to completion, and print its result.
pub async fn run_analyze(
    config: &Config,
    base: &Path,
    tests: &Path,
    updated: Option<&Path>,
    json: bool,
) -> Result<()> {
    let services = Services::from_config(config).await?;

    let (base_name, base_data) = read_upload(base)?;
    let (tests_name, tests_data) = read_upload(tests)?;
    let updated = updated.map(read_upload).transpose()?;

    let names = FileNames {
        base_name,
        updated_name: updated.as_ref().map(|(name, _)| name.clone()),
        tests_name,
    };
    let files = JobFiles {
        base: base_data,
        updated: updated.map(|(_, data)| data),
        tests: tests_data,
    };

    let orchestrator = &services.orchestrator;
    let job_id = match orchestrator.submit(files, names).await {
        Ok(id) => id,
        Err(e) => fail(e),
    };
    let status = orchestrator.advance(&job_id).await?;
    if status.phase == Phase::Error {
        fail(status.message);
    }

    let result = orchestrator.take_result(&job_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&job_id, &result);
    }
    Ok(())
}

fn print_summary(job_id: &str, result: &AnalysisResult) {
    let m = &result.coverage_metrics;

    println!("Job:            {}", job_id);
    println!("Outcome:        {}", result.status.as_str());
    println!();
    println!("Requirements:   {}", m.total_requirements);
    println!("  covered:      {}", m.covered_requirements);
    println!("  partial:      {}", m.partially_covered_requirements);
    println!("  uncovered:    {}", m.uncovered_requirements);
    println!("Coverage:       {:.1}%", m.coverage_percentage);
    println!(
        "Uncovered risk: high {} / medium {} / low {}",
        m.high_risk_uncovered, m.medium_risk_uncovered, m.low_risk_uncovered
    );
    println!("Test cases:     {}", result.testcases.len());
    println!("Links:          {}", result.links.len());

    if !result.recommendations.is_empty() {
        println!();
        println!("--- Recommendations ({}) ---", result.recommendations.len());
        for rec in &result.recommendations {
            println!(
                "[{}] {}: {}",
                rec.priority.as_str(),
                rec.requirement_id,
                rec.suggestion
            );
        }
    }
}

/// Print a job's current status.
pub async fn run_status(config: &Config, job_id: &str) -> Result<()> {
    let services = Services::from_config(config).await?;
    let status = match services.orchestrator.status(job_id).await {
        Ok(s) => s,
        Err(e) => fail(e),
    };
    println!("phase:    {}", status.phase.as_str());
    println!("message:  {}", status.message);
    println!("progress: {}", status.progress);
    Ok(())
}

/// Search indexed test-case rows, optionally restricted to some jobs.
pub async fn run_search(config: &Config, query: &str, jobs: &[String]) -> Result<()> {
    let services = Services::from_config(config).await?;
    let scope = match jobs {
        [] => SearchScope::All,
        [one] => SearchScope::Job(one.clone()),
        many => SearchScope::Jobs(many.to_vec()),
    };
    let hits = match services.search.search(&scope, query).await {
        Ok(h) => h,
        Err(e) => fail(e),
    };

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &SearchableItem) {
    println!(
        "{}. [{:.0}] {} ({})",
        rank, hit.confidence, hit.test_case_id, hit.test_case_source
    );
    println!("    {}", hit.test_case_text);
}
