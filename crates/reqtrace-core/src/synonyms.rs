//! Synonym expansion for search queries.
//!
//! Each query token is expanded with related terms from the LLM. Lookups are
//! memoized in a [`SynonymCache`] that is bounded both in size (LRU
//! eviction) and in age (entries older than the TTL are refetched). The
//! cache is owned by whoever builds the search engine; there is no global
//! state.
//!
//! Expansion never fails: a missing credential, transport error or empty
//! reply degrades to an empty list, which is cached like any other answer
//! so a failing backend is not hammered once per query.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::llm::{LlmClient, LlmRequest};

/// Maximum number of related terms requested per token.
pub const DEFAULT_SYNONYM_LIMIT: usize = 10;

/// Bounded, expiring token → synonyms memo.
pub struct SynonymCache {
    entries: Mutex<LruCache<String, (Instant, Vec<String>)>>,
    ttl: Duration,
}

impl SynonymCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Cached synonyms for `token`, if present and fresh.
    pub fn get(&self, token: &str) -> Option<Vec<String>> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let lookup = entries
            .get(token)
            .map(|(stored, list)| (stored.elapsed() < self.ttl, list.clone()));
        match lookup {
            Some((true, list)) => Some(list),
            Some((false, _)) => {
                entries.pop(token);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, token: &str, synonyms: Vec<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.put(token.to_string(), (Instant::now(), synonyms));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The instruction sent for one token.
pub fn synonym_prompt(token: &str, limit: usize) -> String {
    format!(
        "You are a domain vocabulary assistant.\n\
         Strictly ONLY return a comma-separated list (no numbering, no explanations, no other text) \
         of up to {} words or short phrases that are valid synonyms, abbreviations, or highly related \
         terms for the word \"{}\".\n\
         Respond ONLY with the list.",
        limit, token
    )
}

/// Split a reply on commas and newlines, trim quotes and whitespace, and
/// lowercase. Empty and repeated terms are dropped; at most `limit` remain.
pub fn parse_synonym_list(raw: &str, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for term in raw.split([',', '\n']) {
        let term = term
            .trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
            .to_lowercase();
        if term.is_empty() || out.contains(&term) {
            continue;
        }
        out.push(term);
        if out.len() == limit {
            break;
        }
    }
    out
}

/// Fetches and memoizes synonyms through an LLM.
#[derive(Clone)]
pub struct SynonymExpander {
    llm: Arc<dyn LlmClient>,
    cache: Arc<SynonymCache>,
    limit: usize,
}

impl SynonymExpander {
    pub fn new(llm: Arc<dyn LlmClient>, cache: Arc<SynonymCache>) -> Self {
        Self {
            llm,
            cache,
            limit: DEFAULT_SYNONYM_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Related terms for one token; empty on any failure.
    pub async fn synonyms(&self, token: &str) -> Vec<String> {
        if let Some(hit) = self.cache.get(token) {
            return hit;
        }
        if self.limit == 0 {
            return Vec::new();
        }

        let request = LlmRequest::new(synonym_prompt(token, self.limit));
        let list = match self.llm.complete(&request).await {
            Ok(raw) => parse_synonym_list(&raw, self.limit),
            Err(e) => {
                tracing::warn!(token, error = %e, "synonym expansion unavailable");
                Vec::new()
            }
        };
        self.cache.insert(token, list.clone());
        list
    }
}
