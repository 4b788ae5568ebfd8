//! Merging per-chunk analyses into one classified result.
//!
//! Chunk outputs must arrive in chunk index order: requirement dedup keeps
//! the first occurrence, so the order of the input slice decides which copy
//! of a repeated requirement survives.
//!
//! Coverage is computed per deduplicated requirement. A requirement is
//! covered when any of its links is `exact`, partially covered when its best
//! link is `partial`, and uncovered otherwise, so the three counts always sum
//! to the total. Links attach to a requirement only through a non-empty
//! `requirementId` equal to the requirement's `id`.

use std::collections::HashSet;

use crate::models::{
    AnalysisResult, CoverageMetrics, Level, Link, MatchType, OutcomeStatus, Recommendation,
    Requirement,
};
use crate::response::ChunkAnalysis;

/// Merge chunk outputs and classify the outcome against the test table.
///
/// `test_rows` is the parsed table including its header row; it only feeds
/// the malformed-table check.
pub fn merge_chunks(chunks: &[ChunkAnalysis], test_rows: &[Vec<String>]) -> AnalysisResult {
    let requirements = dedup_requirements(chunks.iter().flat_map(|c| c.requirements.iter()));
    let testcases = chunks
        .first()
        .map(|c| c.testcases.clone())
        .unwrap_or_default();
    let links = number_links(chunks.iter().flat_map(|c| c.links.iter().cloned()).collect());

    let status = classify(&requirements, &links, test_rows);
    let coverage_metrics = match status {
        OutcomeStatus::Ok => coverage_metrics(&requirements, &links),
        _ => unlinked_metrics(&requirements),
    };
    let recommendations = recommendations(&requirements, &links);

    AnalysisResult {
        requirements,
        testcases,
        links,
        coverage_metrics,
        recommendations,
        status,
    }
}

/// Keep the first requirement per dedup key, in iteration order.
pub fn dedup_requirements<'a>(reqs: impl IntoIterator<Item = &'a Requirement>) -> Vec<Requirement> {
    let mut seen = HashSet::new();
    reqs.into_iter()
        .filter(|r| seen.insert(r.dedup_key().to_string()))
        .cloned()
        .collect()
}

/// Give positional ids (`L1`, `L2`, …) to links the model left unnamed.
fn number_links(mut links: Vec<Link>) -> Vec<Link> {
    for (i, link) in links.iter_mut().enumerate() {
        if link.id.is_empty() {
            link.id = format!("L{}", i + 1);
        }
    }
    links
}

fn best_match(req: &Requirement, links: &[Link]) -> MatchType {
    if req.id.is_empty() {
        return MatchType::None;
    }
    let mut best = MatchType::None;
    for link in links.iter().filter(|l| l.requirement_id == req.id) {
        match link.match_type {
            MatchType::Exact => return MatchType::Exact,
            MatchType::Partial => best = MatchType::Partial,
            MatchType::None => {}
        }
    }
    best
}

/// Link-derived coverage metrics for an `ok` outcome.
pub fn coverage_metrics(requirements: &[Requirement], links: &[Link]) -> CoverageMetrics {
    let mut metrics = CoverageMetrics {
        total_requirements: requirements.len(),
        ..Default::default()
    };

    for req in requirements {
        match best_match(req, links) {
            MatchType::Exact => metrics.covered_requirements += 1,
            MatchType::Partial => metrics.partially_covered_requirements += 1,
            MatchType::None => match req.risk {
                Level::High => metrics.high_risk_uncovered += 1,
                Level::Medium => metrics.medium_risk_uncovered += 1,
                Level::Low => metrics.low_risk_uncovered += 1,
            },
        }
    }

    metrics.uncovered_requirements = metrics
        .total_requirements
        .saturating_sub(metrics.covered_requirements)
        .saturating_sub(metrics.partially_covered_requirements);
    metrics.coverage_percentage = percentage(
        metrics.covered_requirements,
        metrics.partially_covered_requirements,
        metrics.total_requirements,
    );
    metrics
}

/// Metrics for a non-`ok` outcome: links are ignored and every requirement
/// counts as uncovered.
pub fn unlinked_metrics(requirements: &[Requirement]) -> CoverageMetrics {
    let count = |level: Level| requirements.iter().filter(|r| r.risk == level).count();
    CoverageMetrics {
        total_requirements: requirements.len(),
        covered_requirements: 0,
        partially_covered_requirements: 0,
        uncovered_requirements: requirements.len(),
        coverage_percentage: 0.0,
        high_risk_uncovered: count(Level::High),
        medium_risk_uncovered: count(Level::Medium),
        low_risk_uncovered: count(Level::Low),
    }
}

fn percentage(covered: usize, partial: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let score = (covered as f64 + 0.5 * partial as f64) / total as f64 * 100.0;
    score.min(100.0)
}

/// One recommendation per requirement with no `exact` or `partial` link.
pub fn recommendations(requirements: &[Requirement], links: &[Link]) -> Vec<Recommendation> {
    requirements
        .iter()
        .filter(|req| best_match(req, links) == MatchType::None)
        .map(|req| Recommendation {
            requirement_id: req.id.clone(),
            priority: req.priority,
            suggestion: format!("Add test cases to cover {}", req.text),
            impact: format!(
                "Improves coverage of {} requirement with {} risk",
                req.kind.as_str(),
                req.risk.as_str()
            ),
        })
        .collect()
}

/// A table is malformed when it has no data row or its header is empty.
pub fn tests_malformed(test_rows: &[Vec<String>]) -> bool {
    test_rows.len() < 2 || test_rows[0].is_empty()
}

pub fn classify(
    requirements: &[Requirement],
    links: &[Link],
    test_rows: &[Vec<String>],
) -> OutcomeStatus {
    if requirements.is_empty() {
        OutcomeStatus::IrrelevantDocs
    } else if !links.iter().any(Link::is_match) || tests_malformed(test_rows) {
        OutcomeStatus::MismatchedTests
    } else {
        OutcomeStatus::Ok
    }
}
