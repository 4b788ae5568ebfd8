//! HTTP API tests: the router is served on an ephemeral port and driven with
//! `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use reqtrace::app::Services;
use reqtrace::config::Config;
use reqtrace::extract::FileParser;
use reqtrace::server::router;
use reqtrace_core::error::Result;
use reqtrace_core::llm::{LlmClient, LlmRequest};
use reqtrace_core::store::memory::InMemoryKv;

const ANALYSIS_REPLY: &str = r#"{
  "requirements": [
    {"id": "REQ-1", "text": "The system must validate input", "type": "functional",
     "status": "new", "priority": "high", "risk": "high"},
    {"id": "REQ-2", "text": "Reports can be exported", "type": "functional",
     "status": "new", "priority": "low", "risk": "low"}
  ],
  "testcases": [
    {"id": "TC-1", "text": "validates malformed input", "type": "negative", "complexity": "simple"}
  ],
  "links": [
    {"requirementId": "REQ-1", "testcaseId": "TC-1", "matchType": "exact",
     "confidence": 0.9, "explanation": "direct", "coverageAreas": [], "gaps": []}
  ]
}"#;

struct FixedLlm;

#[async_trait]
impl LlmClient for FixedLlm {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        if request.system.is_some() {
            Ok(ANALYSIS_REPLY.to_string())
        } else {
            Ok("\"check\", verify\nCHECK".to_string())
        }
    }
}

async fn start_server() -> String {
    let services = Services::new(
        &Config::minimal(),
        Arc::new(InMemoryKv::new()),
        Arc::new(FixedLlm),
        Arc::new(FileParser),
    )
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(services)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn upload_form(tests: &'static str) -> Form {
    Form::new()
        .part(
            "baseDoc",
            Part::bytes(b"REQ-1: validate input\nREQ-2: export reports".to_vec())
                .file_name("requirements.txt"),
        )
        .part(
            "testsTable",
            Part::bytes(tests.as_bytes().to_vec()).file_name("tests.csv"),
        )
}

async fn wait_for_phase(client: &reqwest::Client, base: &str, job_id: &str) -> Value {
    for _ in 0..100 {
        let status: Value = client
            .get(format!("{}/status", base))
            .query(&[("jobId", job_id)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let phase = status["phase"].as_str().unwrap_or_default().to_string();
        if phase == "complete" || phase == "error" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {} did not finish", job_id);
}

#[tokio::test]
async fn submit_status_result_search_flow() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/submit", base))
        .multipart(upload_form(
            "id,description\nTC-1,validates malformed input\nTC-2,exports report as pdf\n",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let status = wait_for_phase(&client, &base, &job_id).await;
    assert_eq!(status["phase"], "complete");
    assert_eq!(status["progress"], 100);

    // triggering a finished job reports its status without re-running it
    let resp = client
        .post(format!("{}/process", base))
        .json(&serde_json::json!({ "jobId": job_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"]["phase"], "complete");

    let result: Value = client
        .get(format!("{}/result", base))
        .query(&[("jobId", job_id.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["status"], "ok");
    let metrics = &result["coverageMetrics"];
    assert_eq!(metrics["totalRequirements"], 2);
    assert_eq!(metrics["coveredRequirements"], 1);
    assert_eq!(metrics["uncoveredRequirements"], 1);
    assert_eq!(metrics["coveragePercentage"], 50.0);
    assert_eq!(metrics["lowRiskUncovered"], 1);
    assert_eq!(result["links"][0]["id"], "L1");
    let recs = result["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0]["requirementId"], "REQ-2");
    assert_eq!(recs[0]["priority"], "low");

    // the result is consumed
    let resp = client
        .get(format!("{}/result", base))
        .query(&[("jobId", job_id.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "not_found");

    let hits: Value = client
        .get(format!("{}/search", base))
        .query(&[("query", "export"), ("jobId", job_id.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["testCaseId"], "TC-2");
    assert_eq!(hits[0]["testCaseSource"], "tests.csv");
    assert_eq!(hits[0]["fields"]["description"], "exports report as pdf");
}

#[tokio::test]
async fn submit_without_tests_is_bad_request() {
    let base = start_server().await;
    let form = Form::new().part(
        "baseDoc",
        Part::bytes(b"REQ-1".to_vec()).file_name("requirements.txt"),
    );
    let resp = reqwest::Client::new()
        .post(format!("{}/submit", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "bad_request");
}

#[tokio::test]
async fn empty_table_ends_in_error_phase() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{}/submit", base))
        .multipart(upload_form("\n \n"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let status = wait_for_phase(&client, &base, &job_id).await;
    assert_eq!(status["phase"], "error");
}

#[tokio::test]
async fn status_errors() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/status", base)).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("{}/status", base))
        .query(&[("jobId", "missing")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/process", base))
        .json(&serde_json::json!({ "jobId": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn search_requires_query() {
    let base = start_server().await;
    let resp = reqwest::Client::new()
        .get(format!("{}/search", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "bad_request");
}

#[tokio::test]
async fn health_reports_version() {
    let base = start_server().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
