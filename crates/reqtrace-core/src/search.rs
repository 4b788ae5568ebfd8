//! Keyword search over persisted test-case rows.
//!
//! # Scoring
//!
//! 1. Lowercase the query and split it on whitespace into base tokens.
//! 2. Expand every unique base token with up to N LLM synonyms (memoized).
//! 3. The deduplicated union of base tokens and synonyms is the vocabulary.
//! 4. Skip items that carry a `requirementId`; only test-case rows are searched.
//! 5. `score = matched / |vocabulary|`, where a token matches when it is a
//!    substring of the item's lowercased `testCaseText`. Score 0 is dropped.
//! 6. Sort by score (desc), then `testCaseId` (asc).
//! 7. Keep the first item per `(testCaseId, testCaseSource)`.
//!
//! The returned items carry their score in `confidence`.

use std::collections::HashSet;

use futures::future::join_all;

use crate::error::{PipelineError, Result};
use crate::models::SearchableItem;
use crate::repo::JobRepository;
use crate::synonyms::SynonymExpander;

/// Which jobs a search reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    Job(String),
    Jobs(Vec<String>),
    All,
}

impl SearchScope {
    /// Resolve the HTTP-style selectors: a non-empty `jobIds` list wins, then
    /// a `jobId` other than `all`, else every job.
    pub fn from_params(job_id: Option<&str>, job_ids: Option<&str>) -> Self {
        if let Some(list) = job_ids {
            let ids: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !ids.is_empty() {
                return SearchScope::Jobs(ids);
            }
        }
        match job_id.map(str::trim) {
            Some(id) if !id.is_empty() && !id.eq_ignore_ascii_case("all") => {
                SearchScope::Job(id.to_string())
            }
            _ => SearchScope::All,
        }
    }
}

/// Unique lowercase whitespace tokens, in first-seen order.
pub fn tokenize(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Score, order and deduplicate `items` against a fixed vocabulary.
pub fn rank_items(items: Vec<SearchableItem>, vocabulary: &[String]) -> Vec<SearchableItem> {
    if vocabulary.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<SearchableItem> = items
        .into_iter()
        .filter(|item| item.requirement_id.trim().is_empty())
        .filter_map(|mut item| {
            let text = item.test_case_text.to_lowercase();
            let matched = vocabulary
                .iter()
                .filter(|tok| text.contains(tok.as_str()))
                .count();
            if matched == 0 {
                return None;
            }
            item.confidence = matched as f64 / vocabulary.len() as f64;
            Some(item)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.test_case_id.cmp(&b.test_case_id))
    });

    let mut seen = HashSet::new();
    scored.retain(|item| seen.insert((item.test_case_id.clone(), item.test_case_source.clone())));
    scored
}

#[derive(Clone)]
pub struct SearchEngine {
    repo: JobRepository,
    expander: SynonymExpander,
}

impl SearchEngine {
    pub fn new(repo: JobRepository, expander: SynonymExpander) -> Self {
        Self { repo, expander }
    }

    /// Base tokens plus their synonyms, deduplicated, base tokens first.
    pub async fn vocabulary(&self, query: &str) -> Vec<String> {
        let base = tokenize(query);
        let expansions = join_all(base.iter().map(|t| self.expander.synonyms(t))).await;

        let mut seen = HashSet::new();
        base.into_iter()
            .chain(expansions.into_iter().flatten())
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect()
    }

    async fn load(&self, scope: &SearchScope) -> Result<Vec<SearchableItem>> {
        match scope {
            SearchScope::Job(id) => Ok(self.repo.searchable(id).await?.unwrap_or_default()),
            SearchScope::Jobs(ids) => {
                let mut items = Vec::new();
                for id in ids {
                    items.extend(self.repo.searchable(id).await?.unwrap_or_default());
                }
                Ok(items)
            }
            SearchScope::All => self.repo.all_searchable().await,
        }
    }

    pub async fn search(&self, scope: &SearchScope, query: &str) -> Result<Vec<SearchableItem>> {
        if query.trim().is_empty() {
            return Err(PipelineError::Validation(
                "search query is required".to_string(),
            ));
        }

        let items = self.load(scope).await?;
        if items.is_empty() {
            tracing::info!(?scope, "no searchable items in scope");
            return Ok(Vec::new());
        }

        let vocabulary = self.vocabulary(query).await;
        let candidates = items.len();
        let results = rank_items(items, &vocabulary);
        tracing::info!(
            ?scope,
            vocabulary = vocabulary.len(),
            candidates,
            results = results.len(),
            "search complete"
        );
        Ok(results)
    }
}
