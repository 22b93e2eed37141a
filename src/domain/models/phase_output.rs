//! Durable phase artefacts.
//!
//! Phases that produce content worth keeping (notably the specification
//! and review findings) store it here, one row per (task, phase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a phase output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSource {
    Agent,
    Manifest,
    Import,
}

impl OutputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Manifest => "manifest",
            Self::Import => "import",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "agent" => Some(Self::Agent),
            "manifest" => Some(Self::Manifest),
            "import" => Some(Self::Import),
            _ => None,
        }
    }
}

/// Durable artefact content produced by a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutput {
    pub task_id: String,
    pub phase: String,
    pub content: String,
    /// Hex sha256 of the content
    pub content_hash: String,
    pub source: OutputSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PhaseOutput {
    pub fn new(
        task_id: impl Into<String>,
        phase: impl Into<String>,
        content: impl Into<String>,
        source: OutputSource,
    ) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            phase: phase.into(),
            content_hash: Self::hash(&content),
            content,
            source,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn hash(content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        format!("{digest:x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let a = PhaseOutput::new("TASK-001", "spec", "content", OutputSource::Agent);
        let b = PhaseOutput::new("TASK-001", "spec", "content", OutputSource::Import);
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(
            a.content_hash,
            PhaseOutput::hash("different content"),
        );
    }
}
