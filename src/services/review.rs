//! Review findings parsing.
//!
//! Agents return findings as a JSON object, usually fenced or surrounded
//! by prose. The extractor pulls the first balanced object out of the
//! response before deserializing.

use serde::Deserialize;

use crate::domain::models::{Finding, ReviewFindings};

/// Pull the first balanced `{...}` object out of free-form agent output.
/// Handles fenced blocks and surrounding prose; string literals are
/// skipped so braces inside them don't unbalance the scan.
pub fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Deserialize)]
struct FindingsPayload {
    #[serde(default)]
    findings: Vec<Finding>,
    #[serde(default)]
    summary: String,
}

/// Parse a review response into findings for the given round. A response
/// with no parseable JSON object is treated as a clean review.
pub fn parse_findings(content: &str, round: u32) -> ReviewFindings {
    let Some(json) = extract_json_object(content) else {
        return ReviewFindings {
            round,
            ..ReviewFindings::default()
        };
    };

    match serde_json::from_str::<FindingsPayload>(json) {
        Ok(payload) => ReviewFindings {
            round,
            findings: payload.findings,
            summary: payload.summary,
        },
        Err(err) => {
            tracing::warn!(%err, "Review response JSON did not match the findings shape");
            ReviewFindings {
                round,
                ..ReviewFindings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;

    #[test]
    fn test_extract_from_fenced_block() {
        let content = "Here you go:\n```json\n{\"findings\": []}\n```\ndone";
        assert_eq!(extract_json_object(content), Some("{\"findings\": []}"));
    }

    #[test]
    fn test_extract_skips_braces_in_strings() {
        let content = r#"{"summary": "uses {braces} inside", "findings": []}"#;
        assert_eq!(extract_json_object(content), Some(content));
    }

    #[test]
    fn test_parse_findings() {
        let content = r#"
The review found issues.
{"findings": [
  {"title": "Unchecked error", "severity": "high", "file": "src/io.rs", "detail": "ignores write failure"},
  {"title": "Naming nit", "severity": "low", "detail": "rename"}
], "summary": "one real problem"}
phase_complete=true
"#;
        let findings = parse_findings(content, 2);
        assert_eq!(findings.round, 2);
        assert_eq!(findings.findings.len(), 2);
        assert_eq!(findings.findings[0].severity, Severity::High);
        assert!(findings.requires_fixes());
    }

    #[test]
    fn test_unparseable_response_is_clean_review() {
        let findings = parse_findings("all good, nothing to report", 1);
        assert!(findings.findings.is_empty());
        assert!(!findings.requires_fixes());
    }
}
