//! End-to-end pipeline tests against the in-memory store and a scripted LLM.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;

use reqtrace::app::Services;
use reqtrace::config::Config;
use reqtrace::extract::FileParser;
use reqtrace_core::error::{PipelineError, Result};
use reqtrace_core::llm::{LlmClient, LlmRequest};
use reqtrace_core::models::{FileNames, JobFiles, OutcomeStatus, Phase};
use reqtrace_core::search::SearchScope;
use reqtrace_core::store::memory::InMemoryKv;
use reqtrace_core::store::KvStore;

const ANALYSIS_REPLY: &str = r#"Here you go:
```json
{
  "requirements": [
    {"id": "REQ-1", "text": "The system must validate input", "type": "functional",
     "status": "new", "priority": "high", "risk": "high"}
  ],
  "testcases": [
    {"id": "TC-1", "text": "validates malformed input", "type": "negative", "complexity": "simple"}
  ],
  "links": [
    {"id": "L1", "requirementId": "REQ-1", "testcaseId": "TC-1", "matchType": "exact",
     "confidence": 0.9, "explanation": "direct", "coverageAreas": ["input"], "gaps": []}
  ]
}
```"#;

/// Answers analysis prompts (which carry a system instruction) with a fixed
/// reply and synonym prompts with a fixed list.
struct ScriptedLlm {
    analysis: String,
    synonyms: String,
    delay: Duration,
    analysis_calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(analysis: &str) -> Self {
        Self {
            analysis: analysis.to_string(),
            synonyms: "check, verify".to_string(),
            delay: Duration::ZERO,
            analysis_calls: AtomicUsize::new(0),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        if request.system.is_none() {
            return Ok(self.synonyms.clone());
        }
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.analysis.clone())
    }
}

fn b64(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text)
}

fn services(config: &Config, llm: Arc<ScriptedLlm>) -> Services {
    Services::new(
        config,
        Arc::new(InMemoryKv::new()),
        llm,
        Arc::new(FileParser),
    )
    .unwrap()
}

/// In-memory store that sleeps on every read and write, so concurrent
/// callers interleave at each store access.
struct SlowKv {
    inner: InMemoryKv,
    delay: Duration,
}

#[async_trait]
impl KvStore for SlowKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.exists(key).await
    }

    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        self.inner.keys(pattern).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        self.inner.expire(key, ttl).await
    }
}

fn job(base: &str, tests: &str) -> (JobFiles, FileNames) {
    (
        JobFiles {
            base: b64(base),
            updated: None,
            tests: b64(tests),
        },
        FileNames {
            base_name: "requirements.txt".into(),
            updated_name: None,
            tests_name: "tests.csv".into(),
        },
    )
}

const BASE: &str = "REQ-1: The system must validate input";
const TESTS: &str = "id,description\nTC-1,validates malformed input\nTC-2,exports report as pdf\n";

#[tokio::test]
async fn submitted_job_runs_to_complete_and_is_searchable() {
    let llm = Arc::new(ScriptedLlm::new(ANALYSIS_REPLY));
    let services = services(&Config::minimal(), llm.clone());
    let orchestrator = &services.orchestrator;

    let (files, names) = job(BASE, TESTS);
    let job_id = orchestrator.submit(files, names).await.unwrap();
    let status = orchestrator.status(&job_id).await.unwrap();
    assert_eq!(status.phase, Phase::Extracting);
    assert_eq!(status.progress, 0);

    let status = orchestrator.advance(&job_id).await.unwrap();
    assert_eq!(status.phase, Phase::Complete);
    assert_eq!(status.progress, 100);

    // a second trigger does not re-run the job
    let again = orchestrator.advance(&job_id).await.unwrap();
    assert_eq!(again.phase, Phase::Complete);
    assert_eq!(llm.analysis_calls.load(Ordering::SeqCst), 1);

    let result = orchestrator.take_result(&job_id).await.unwrap();
    assert_eq!(result.status, OutcomeStatus::Ok);
    assert_eq!(result.coverage_metrics.total_requirements, 1);
    assert_eq!(result.coverage_metrics.covered_requirements, 1);
    assert_eq!(result.coverage_metrics.coverage_percentage, 100.0);
    assert!(result.recommendations.is_empty());

    // result consumption removes job state
    assert!(matches!(
        orchestrator.status(&job_id).await,
        Err(PipelineError::NotFound(_))
    ));
    assert!(matches!(
        orchestrator.take_result(&job_id).await,
        Err(PipelineError::NotFound(_))
    ));

    // searchable rows outlive the result
    let hits = services
        .search
        .search(&SearchScope::Job(job_id.clone()), "Malformed")
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].test_case_id, "TC-1");
    assert_eq!(hits[0].test_case_source, "tests.csv");
    assert!(hits[0].confidence > 0.0 && hits[0].confidence <= 1.0);

    let none = services
        .search
        .search(&SearchScope::Job("other".into()), "malformed")
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn identical_inputs_reuse_the_cached_analysis() {
    let llm = Arc::new(ScriptedLlm::new(ANALYSIS_REPLY));
    let services = services(&Config::minimal(), llm.clone());

    for _ in 0..2 {
        let (files, names) = job(BASE, TESTS);
        let id = services.orchestrator.submit(files, names).await.unwrap();
        let status = services.orchestrator.advance(&id).await.unwrap();
        assert_eq!(status.phase, Phase::Complete);
    }
    assert_eq!(llm.analysis_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unusable_llm_output_fails_the_job() {
    let llm = Arc::new(ScriptedLlm::new("I cannot help with that."));
    let services = services(&Config::minimal(), llm);

    let (files, names) = job(BASE, TESTS);
    let id = services.orchestrator.submit(files, names).await.unwrap();
    let status = services.orchestrator.advance(&id).await.unwrap();

    assert_eq!(status.phase, Phase::Error);
    assert!(!status.message.is_empty());
    assert_eq!(
        services.orchestrator.status(&id).await.unwrap().phase,
        Phase::Error
    );
    assert!(matches!(
        services.orchestrator.take_result(&id).await,
        Err(PipelineError::NotFound(_))
    ));
}

#[tokio::test]
async fn slow_analysis_times_out() {
    let mut config = Config::minimal();
    config.analysis.stage_timeout_secs = 1;
    let llm = Arc::new(ScriptedLlm::new(ANALYSIS_REPLY).slow(Duration::from_secs(3)));
    let services = services(&config, llm);

    let (files, names) = job(BASE, TESTS);
    let id = services.orchestrator.submit(files, names).await.unwrap();
    let status = services.orchestrator.advance(&id).await.unwrap();

    assert_eq!(status.phase, Phase::Error);
    assert_eq!(status.message, "Analysis timed out");
}

#[tokio::test]
async fn header_only_table_is_mismatched() {
    let llm = Arc::new(ScriptedLlm::new(ANALYSIS_REPLY));
    let services = services(&Config::minimal(), llm);

    let (files, names) = job(BASE, "id,description\n");
    let id = services.orchestrator.submit(files, names).await.unwrap();
    let status = services.orchestrator.advance(&id).await.unwrap();
    assert_eq!(status.phase, Phase::Complete);

    let result = services.orchestrator.take_result(&id).await.unwrap();
    assert_eq!(result.status, OutcomeStatus::MismatchedTests);
    assert_eq!(result.coverage_metrics.total_requirements, 1);
    assert_eq!(result.coverage_metrics.covered_requirements, 0);
    assert_eq!(result.coverage_metrics.uncovered_requirements, 1);
}

#[tokio::test]
async fn empty_table_fails_parsing() {
    let llm = Arc::new(ScriptedLlm::new(ANALYSIS_REPLY));
    let services = services(&Config::minimal(), llm);

    let (files, names) = job(BASE, "\n\n");
    let id = services.orchestrator.submit(files, names).await.unwrap();
    let status = services.orchestrator.advance(&id).await.unwrap();
    assert_eq!(status.phase, Phase::Error);
}

#[tokio::test]
async fn submit_requires_base_and_tests() {
    let services = services(
        &Config::minimal(),
        Arc::new(ScriptedLlm::new(ANALYSIS_REPLY)),
    );
    let (mut files, names) = job(BASE, TESTS);
    files.tests = String::new();
    assert!(matches!(
        services.orchestrator.submit(files, names).await,
        Err(PipelineError::Validation(_))
    ));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let services = services(
        &Config::minimal(),
        Arc::new(ScriptedLlm::new(ANALYSIS_REPLY)),
    );
    assert!(matches!(
        services.orchestrator.advance("missing").await,
        Err(PipelineError::NotFound(_))
    ));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let services = services(
        &Config::minimal(),
        Arc::new(ScriptedLlm::new(ANALYSIS_REPLY)),
    );
    assert!(matches!(
        services.search.search(&SearchScope::All, "   ").await,
        Err(PipelineError::Validation(_))
    ));
}

#[tokio::test]
async fn concurrent_triggers_run_the_job_once() {
    let llm = Arc::new(ScriptedLlm::new(ANALYSIS_REPLY));
    let kv = Arc::new(SlowKv {
        inner: InMemoryKv::new(),
        delay: Duration::from_millis(5),
    });
    let services = Services::new(&Config::minimal(), kv, llm.clone(), Arc::new(FileParser)).unwrap();

    let (files, names) = job(BASE, TESTS);
    let id = services.orchestrator.submit(files, names).await.unwrap();

    let first = {
        let orchestrator = services.orchestrator.clone();
        let id = id.clone();
        tokio::spawn(async move { orchestrator.advance(&id).await })
    };
    let second = {
        let orchestrator = services.orchestrator.clone();
        let id = id.clone();
        tokio::spawn(async move { orchestrator.advance(&id).await })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_ne!(first.phase, Phase::Error);
    assert_ne!(second.phase, Phase::Error);
    assert_eq!(llm.analysis_calls.load(Ordering::SeqCst), 1);

    services.orchestrator.take_result(&id).await.unwrap();

    // a late trigger after the destructive read must not bring the job back
    assert!(matches!(
        services.orchestrator.advance(&id).await,
        Err(PipelineError::NotFound(_))
    ));
    assert!(matches!(
        services.orchestrator.status(&id).await,
        Err(PipelineError::NotFound(_))
    ));
    assert!(matches!(
        services.orchestrator.take_result(&id).await,
        Err(PipelineError::NotFound(_))
    ));
    assert_eq!(llm.analysis_calls.load(Ordering::SeqCst), 1);
}
