//! Projection of test-table rows into [`SearchableItem`]s.
//!
//! One item per data row (the header is row 0 and is skipped). Items are
//! keyed `tc-<jobId>-<testCaseId>` and carry the full header→cell map so a
//! search hit can be shown with its original columns.

use std::collections::BTreeMap;

use reqtrace_core::models::SearchableItem;

pub fn derive_searchable(job_id: &str, source: &str, rows: &[Vec<String>]) -> Vec<SearchableItem> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };

    data.iter()
        .enumerate()
        .map(|(i, row)| {
            let test_case_id = row
                .first()
                .filter(|id| !id.is_empty())
                .cloned()
                .unwrap_or_else(|| format!("row-{}", i + 1));

            let rest: Vec<&str> = row
                .iter()
                .skip(1)
                .map(String::as_str)
                .filter(|c| !c.is_empty())
                .collect();
            let test_case_text = if rest.is_empty() {
                test_case_id.clone()
            } else {
                rest.join(" | ")
            };

            let fields: BTreeMap<String, String> = header
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.is_empty())
                .map(|(col, name)| (name.clone(), row.get(col).cloned().unwrap_or_default()))
                .collect();

            SearchableItem {
                id: format!("tc-{}-{}", job_id, test_case_id),
                requirement_id: String::new(),
                requirement_text: String::new(),
                requirement_source: String::new(),
                test_case_id,
                test_case_text,
                test_case_source: source.to_string(),
                confidence: 1.0,
                explanation: String::new(),
                coverage_areas: Vec::new(),
                gaps: Vec::new(),
                fields,
            }
        })
        .collect()
}
