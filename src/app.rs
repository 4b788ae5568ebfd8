//! Service wiring shared by the CLI and the HTTP server.
//!
//! [`Services::from_config`] picks the store backend and LLM provider from
//! configuration; [`Services::new`] takes them explicitly so tests can pass
//! an in-memory store and a scripted LLM.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use reqtrace_core::analyze::Analyzer;
use reqtrace_core::cache::AnalysisCache;
use reqtrace_core::llm::LlmClient;
use reqtrace_core::repo::JobRepository;
use reqtrace_core::search::SearchEngine;
use reqtrace_core::store::memory::InMemoryKv;
use reqtrace_core::store::KvStore;
use reqtrace_core::synonyms::{SynonymCache, SynonymExpander};

use crate::config::Config;
use crate::extract::{DocumentParser, FileParser};
use crate::llm::create_client;
use crate::orchestrator::Orchestrator;
use crate::sqlite_kv::SqliteKv;

/// Everything a request handler or CLI command needs.
#[derive(Clone)]
pub struct Services {
    pub orchestrator: Orchestrator,
    pub search: SearchEngine,
}

impl Services {
    pub fn new(
        config: &Config,
        kv: Arc<dyn KvStore>,
        llm: Arc<dyn LlmClient>,
        parser: Arc<dyn DocumentParser>,
    ) -> Result<Self> {
        let repo = JobRepository::new(kv);

        let analyzer = Analyzer::new(llm.clone()).with_chunk_size(config.analysis.chunk_size);
        let chunk_size = analyzer.chunk_size();
        let cache = AnalysisCache::new(repo.kv().clone(), analyzer)
            .with_version(config.analysis.version.clone())
            .with_ttl(config.analysis.cache_ttl());
        tracing::debug!(chunk_size, version = cache.version(), "analysis configured");
        let orchestrator = Orchestrator::new(
            repo.clone(),
            parser,
            cache,
            config.analysis.stage_timeout(),
        );

        let capacity = NonZeroUsize::new(config.search.synonym_cache_capacity)
            .context("search.synonym_cache_capacity must be > 0")?;
        let synonyms = Arc::new(SynonymCache::new(
            capacity,
            Duration::from_secs(config.search.synonym_cache_ttl_secs),
        ));
        let expander =
            SynonymExpander::new(llm, synonyms).with_limit(config.search.synonym_limit);
        let search = SearchEngine::new(repo, expander);

        Ok(Self {
            orchestrator,
            search,
        })
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let kv: Arc<dyn KvStore> = match config.store.backend.as_str() {
            "sqlite" => Arc::new(SqliteKv::open(config).await?),
            "memory" => Arc::new(InMemoryKv::new()),
            other => bail!("Unknown store backend: {}", other),
        };
        let llm = create_client(&config.llm)?;
        tracing::info!(
            backend = %config.store.backend,
            provider = %config.llm.provider,
            model = llm.model_name(),
            "services ready"
        );
        Self::new(config, kv, llm, Arc::new(FileParser))
    }
}
