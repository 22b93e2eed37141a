//! Initiative domain model and manifest input format.
//!
//! An initiative groups tasks that share a vision. Manifests declare an
//! initiative plus an ordered list of task stubs with local integer ids;
//! the planner topologically sorts and materialises them atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::task::Weight;

/// A grouping of tasks sharing a vision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initiative {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub vision: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Initiative {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            vision: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Initiative declaration inside a manifest: either an existing id or a
/// new title/vision pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestInitiative {
    Existing { id: String },
    New {
        title: String,
        #[serde(default)]
        vision: String,
    },
}

/// One task stub declared in a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStub {
    /// Manifest-local integer id, referenced by `depends_on`
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub weight: Weight,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: Option<String>,
    /// Optional specification text stored as a phase output
    #[serde(default)]
    pub spec: Option<String>,
    /// Manifest-local ids this stub depends on
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

/// The parsed manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiativeManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiative: Option<ManifestInitiative>,
    pub tasks: Vec<TaskStub>,
}
