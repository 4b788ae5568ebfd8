//! Chunked analysis over the LLM capability.
//!
//! The base document is split with [`chunk_lines`]; every chunk is sent to
//! the model together with the entire test table, and all requests are in
//! flight at once. `try_join_all` yields outputs in chunk order whatever the
//! completion order, which is what requirement dedup relies on. The first
//! failing chunk fails the whole analysis.

use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;

use crate::chunk::{chunk_lines, DEFAULT_CHUNK_SIZE};
use crate::error::Result;
use crate::llm::{LlmClient, LlmRequest};
use crate::merge::merge_chunks;
use crate::models::AnalysisResult;
use crate::response::{parse_chunk_response, ChunkAnalysis};

const SYSTEM_INSTRUCTION: &str = "You are a requirements traceability analyst. \
You map requirements to the test cases that exercise them and reply with a single JSON object.";

const OUTPUT_RULES: &str = r#"You MUST respond with ONE valid JSON object that adheres EXACTLY to the schema below.
Guidelines for output (read carefully):
- Do NOT wrap the JSON in markdown code fences or any explanatory text. Output the raw JSON only.
- Keep all keys and nesting exactly as shown; do not add, remove, or reorder keys.
- All numeric values must be numbers (not strings) and non-negative; decimals may have up to three digits of precision.
- Preserve every identifier (e.g., requirementId, testcaseId) exactly as provided; never invent new IDs.
- If a field value is unavailable, use an empty string "" (for strings) or 0 (for numbers) rather than omitting the field.
- The JSON must parse directly without any preprocessing.
Failure to comply with these rules will be treated as a critical error.

Provide the JSON using this schema:
{
  "requirements": [
    {
      "id": "REQ-1",
      "text": "requirement text",
      "type": "functional|non-functional",
      "status": "new|modified|stable|deprecated",
      "priority": "high|medium|low",
      "risk": "high|medium|low"
    }
  ],
  "testcases": [
    {
      "id": "TC-1",
      "text": "test case text",
      "type": "positive|negative|edge-case|regression",
      "complexity": "simple|moderate|complex"
    }
  ],
  "links": [
    {
      "requirementId": "REQ-1",
      "testcaseId": "TC-1",
      "matchType": "exact|partial|none",
      "confidence": 0.95,
      "explanation": "Detailed explanation of why this test case matches the requirement",
      "coverageAreas": ["List of specific areas covered by this test case"],
      "gaps": ["List of any gaps in coverage"]
    }
  ]
}"#;

/// Build the user message for one chunk. `index` is 0-based.
pub fn chunk_prompt(index: usize, lines: &[&str], test_rows: &[Vec<String>]) -> String {
    let tests = test_rows
        .iter()
        .map(|row| row.join(", "))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Analyze the following requirements and test cases (chunk {}):\n\n\
         Requirements (including typical and edge-case items such as error states, performance ceilings, extreme data sizes, and security constraints):\n{}\n\n\
         Test Cases (including edge-case scenarios such as invalid inputs, boundary values, and unexpected user interactions):\n{}\n\n{}",
        index + 1,
        lines.join("\n"),
        tests,
        OUTPUT_RULES
    )
}

/// Runs the chunked analysis and merges the outputs.
#[derive(Clone)]
pub struct Analyzer {
    llm: Arc<dyn LlmClient>,
    chunk_size: usize,
}

impl Analyzer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Analyze `base` against the test table and return the classified result.
    ///
    /// `updated` does not reach the model; it only distinguishes cache
    /// entries (see [`AnalysisCache`](crate::cache::AnalysisCache)).
    pub async fn analyze(
        &self,
        base: &str,
        _updated: &str,
        test_rows: &[Vec<String>],
    ) -> Result<AnalysisResult> {
        let chunks = chunk_lines(base, self.chunk_size);
        tracing::info!(
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            model = self.llm.model_name(),
            "analyzing requirements"
        );

        let outputs = try_join_all(
            chunks
                .iter()
                .enumerate()
                .map(|(index, lines)| self.analyze_chunk(index, lines, test_rows)),
        )
        .await?;

        Ok(merge_chunks(&outputs, test_rows))
    }

    async fn analyze_chunk(
        &self,
        index: usize,
        lines: &[&str],
        test_rows: &[Vec<String>],
    ) -> Result<ChunkAnalysis> {
        let request =
            LlmRequest::new(chunk_prompt(index, lines, test_rows)).with_system(SYSTEM_INSTRUCTION);
        let started = Instant::now();
        let raw = self.llm.complete(&request).await?;
        tracing::info!(
            chunk = index + 1,
            duration_ms = started.elapsed().as_millis() as u64,
            response_bytes = raw.len(),
            "llm chunk analysis returned"
        );
        tracing::debug!(chunk = index + 1, raw = %raw, "llm raw output");

        parse_chunk_response(&raw).map_err(|e| {
            tracing::warn!(chunk = index + 1, error = %e, "unusable chunk response");
            e
        })
    }
}
