//! Core data types shared by the analysis pipeline and the search engine.
//!
//! Every type here serializes as camelCase JSON. That shape is the persisted
//! form in the key-value store and the body returned over HTTP, so field
//! renames are wire-format changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// Job status
// ═══════════════════════════════════════════════════════════════════════

/// Pipeline stage of a job.
///
/// Moves strictly forward `Extracting → Processing → Analyzing → Complete`;
/// `Error` is reachable from any phase and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Extracting,
    Processing,
    Analyzing,
    Complete,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Extracting => "extracting",
            Phase::Processing => "processing",
            Phase::Analyzing => "analyzing",
            Phase::Complete => "complete",
            Phase::Error => "error",
        }
    }
}

/// Persisted job status snapshot. `progress` is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub phase: Phase,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub progress: u8,
}

impl Status {
    pub fn new(phase: Phase, message: impl Into<String>, progress: u8) -> Self {
        Self {
            phase,
            message: message.into(),
            progress,
        }
    }

    /// The error-phase snapshot: message from the failure, progress reset to 0.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(Phase::Error, message, 0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Analysis vocabulary
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementType {
    #[default]
    Functional,
    NonFunctional,
}

impl RequirementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementType::Functional => "functional",
            RequirementType::NonFunctional => "non-functional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementStatus {
    #[default]
    New,
    Modified,
    Stable,
    Deprecated,
}

/// Shared three-level scale used for both priority and risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    #[default]
    Medium,
    Low,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::High => "high",
            Level::Medium => "medium",
            Level::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestCaseType {
    #[default]
    Positive,
    Negative,
    EdgeCase,
    Regression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

/// How well a test case exercises a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Partial,
    #[default]
    None,
}

/// Overall classification of a merged analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    #[default]
    Ok,
    IrrelevantDocs,
    MismatchedTests,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Ok => "ok",
            OutcomeStatus::IrrelevantDocs => "irrelevant_docs",
            OutcomeStatus::MismatchedTests => "mismatched_tests",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Analysis artifacts
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: RequirementType,
    pub status: RequirementStatus,
    pub priority: Level,
    pub risk: Level,
}

impl Requirement {
    /// Identity used for deduplication: the id, or the text when the id is blank.
    pub fn dedup_key(&self) -> &str {
        if self.id.is_empty() {
            &self.text
        } else {
            &self.id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: TestCaseType,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    pub requirement_id: String,
    pub testcase_id: String,
    pub match_type: MatchType,
    pub confidence: f64,
    pub explanation: String,
    pub coverage_areas: Vec<String>,
    pub gaps: Vec<String>,
}

impl Link {
    /// True for `exact` and `partial` links.
    pub fn is_match(&self) -> bool {
        self.match_type != MatchType::None
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageMetrics {
    pub total_requirements: usize,
    pub covered_requirements: usize,
    pub partially_covered_requirements: usize,
    pub uncovered_requirements: usize,
    pub coverage_percentage: f64,
    pub high_risk_uncovered: usize,
    pub medium_risk_uncovered: usize,
    pub low_risk_uncovered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub requirement_id: String,
    pub priority: Level,
    pub suggestion: String,
    pub impact: String,
}

/// The merged, classified output of one analysis. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub requirements: Vec<Requirement>,
    pub testcases: Vec<TestCase>,
    pub links: Vec<Link>,
    pub coverage_metrics: CoverageMetrics,
    pub recommendations: Vec<Recommendation>,
    pub status: OutcomeStatus,
}

// ═══════════════════════════════════════════════════════════════════════
// Job inputs and search projection
// ═══════════════════════════════════════════════════════════════════════

/// Raw uploaded files, each base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFiles {
    pub base: String,
    #[serde(default)]
    pub updated: Option<String>,
    pub tests: String,
}

/// Display names of the uploaded files. Outlive the job's ephemeral state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNames {
    pub base_name: String,
    #[serde(default)]
    pub updated_name: Option<String>,
    pub tests_name: String,
}

/// Text extracted from a job's files, ready for analysis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedInputs {
    pub base: String,
    pub updated: String,
    /// Test table rows; row 0 is the header.
    pub tests: Vec<Vec<String>>,
}

/// Flattened per-test-row projection that backs keyword search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchableItem {
    pub id: String,
    #[serde(default)]
    pub requirement_id: String,
    #[serde(default)]
    pub requirement_text: String,
    #[serde(default)]
    pub requirement_source: String,
    pub test_case_id: String,
    pub test_case_text: String,
    #[serde(default)]
    pub test_case_source: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub coverage_areas: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_use_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&RequirementType::NonFunctional).unwrap(),
            "\"non-functional\""
        );
        assert_eq!(
            serde_json::to_string(&TestCaseType::EdgeCase).unwrap(),
            "\"edge-case\""
        );
        assert_eq!(
            serde_json::to_string(&OutcomeStatus::MismatchedTests).unwrap(),
            "\"mismatched_tests\""
        );
        assert_eq!(serde_json::to_string(&Phase::Analyzing).unwrap(), "\"analyzing\"");
    }

    #[test]
    fn link_fields_are_camel_case() {
        let link = Link {
            id: "L1".into(),
            requirement_id: "REQ-1".into(),
            testcase_id: "TC-1".into(),
            match_type: MatchType::Partial,
            confidence: 0.5,
            explanation: String::new(),
            coverage_areas: vec![],
            gaps: vec![],
        };
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["requirementId"], "REQ-1");
        assert_eq!(json["testcaseId"], "TC-1");
        assert_eq!(json["matchType"], "partial");
        assert!(json.get("coverageAreas").is_some());
    }

    #[test]
    fn dedup_key_falls_back_to_text() {
        let mut req = Requirement {
            id: String::new(),
            text: "must log in".into(),
            kind: RequirementType::Functional,
            status: RequirementStatus::New,
            priority: Level::High,
            risk: Level::Low,
        };
        assert_eq!(req.dedup_key(), "must log in");
        req.id = "REQ-9".into();
        assert_eq!(req.dedup_key(), "REQ-9");
    }

    #[test]
    fn failed_status_resets_progress() {
        let status = Status::failed("Analysis timed out");
        assert_eq!(status.phase, Phase::Error);
        assert_eq!(status.progress, 0);
    }
}
