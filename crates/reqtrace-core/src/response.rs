//! Reading LLM analysis responses.
//!
//! The model is asked for exactly one JSON object, but the text that comes
//! back may carry code fences or prose around it. [`extract_json_object`]
//! finds the first well-formed object by brace matching that tracks string
//! and escape state, so braces inside string values do not end the match.
//!
//! [`parse_chunk_response`] then validates the object against the chunk
//! schema. The only coercions applied are the documented defaults: absent or
//! `null` strings become `""`, absent numbers become `0`, absent lists become
//! empty, and unknown enum spellings fall back to the enum's default.
//! Everything else (a missing top-level array, a wrong JSON type, a negative
//! or out-of-range confidence) is an [`PipelineError::UpstreamFormat`].

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::models::{
    Complexity, Level, Link, MatchType, Requirement, RequirementStatus, RequirementType,
    TestCase, TestCaseType,
};

/// One chunk's worth of parsed analysis output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkAnalysis {
    pub requirements: Vec<Requirement>,
    pub testcases: Vec<TestCase>,
    pub links: Vec<Link>,
}

const REQUIRED_ARRAYS: [&str; 3] = ["requirements", "testcases", "links"];

/// Return the first balanced `{ … }` span in `raw` that parses as a JSON object.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let mut start = 0;
    while let Some(offset) = raw[start..].find('{') {
        let open = start + offset;
        if let Some(close) = matching_brace(bytes, open) {
            let candidate = &raw[open..=close];
            if matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_))) {
                return Some(candidate);
            }
        }
        start = open + 1;
    }
    None
}

/// Index of the `}` closing the `{` at `open`, ignoring braces inside strings.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Deserialize)]
struct WireChunk {
    requirements: Vec<WireRequirement>,
    testcases: Vec<WireTestCase>,
    links: Vec<WireLink>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequirement {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    risk: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTestCase {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    complexity: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLink {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    requirement_id: Option<String>,
    #[serde(default)]
    testcase_id: Option<String>,
    #[serde(default)]
    match_type: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    coverage_areas: Option<Vec<String>>,
    #[serde(default)]
    gaps: Option<Vec<String>>,
}

/// Parse a wire enum spelling case-insensitively; `None` for unknown values.
fn parse_wire<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(Value::String(raw.trim().to_lowercase())).ok()
}

fn wire_or_default<T: DeserializeOwned + Default>(raw: Option<&str>) -> T {
    raw.and_then(parse_wire).unwrap_or_default()
}

/// Extract, validate and convert one chunk's raw LLM response.
pub fn parse_chunk_response(raw: &str) -> Result<ChunkAnalysis> {
    let json = extract_json_object(raw).ok_or_else(|| {
        PipelineError::UpstreamFormat("response contains no JSON object".to_string())
    })?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| PipelineError::UpstreamFormat(e.to_string()))?;

    for key in REQUIRED_ARRAYS {
        if !value.get(key).is_some_and(Value::is_array) {
            return Err(PipelineError::UpstreamFormat(format!(
                "response is missing the `{}` array",
                key
            )));
        }
    }

    let wire: WireChunk = serde_json::from_value(value)
        .map_err(|e| PipelineError::UpstreamFormat(e.to_string()))?;

    let requirements = wire
        .requirements
        .into_iter()
        .map(|r| Requirement {
            id: r.id.unwrap_or_default(),
            text: r.text.unwrap_or_default(),
            kind: wire_or_default::<RequirementType>(r.kind.as_deref()),
            status: wire_or_default::<RequirementStatus>(r.status.as_deref()),
            priority: wire_or_default::<Level>(r.priority.as_deref()),
            risk: wire_or_default::<Level>(r.risk.as_deref()),
        })
        .collect();

    let testcases = wire
        .testcases
        .into_iter()
        .map(|t| TestCase {
            id: t.id.unwrap_or_default(),
            text: t.text.unwrap_or_default(),
            kind: wire_or_default::<TestCaseType>(t.kind.as_deref()),
            complexity: wire_or_default::<Complexity>(t.complexity.as_deref()),
        })
        .collect();

    let links = wire
        .links
        .into_iter()
        .map(|l| {
            let confidence = l.confidence.unwrap_or(0.0);
            if !(0.0..=1.0).contains(&confidence) {
                return Err(PipelineError::UpstreamFormat(format!(
                    "link confidence {} is outside [0, 1]",
                    confidence
                )));
            }
            Ok(Link {
                id: l.id.unwrap_or_default(),
                requirement_id: l.requirement_id.unwrap_or_default(),
                testcase_id: l.testcase_id.unwrap_or_default(),
                match_type: wire_or_default::<MatchType>(l.match_type.as_deref()),
                confidence,
                explanation: l.explanation.unwrap_or_default(),
                coverage_areas: l.coverage_areas.unwrap_or_default(),
                gaps: l.gaps.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ChunkAnalysis {
        requirements,
        testcases,
        links,
    })
}
