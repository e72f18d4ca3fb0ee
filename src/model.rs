//! Records that flow through the crawl pipeline
//!
//! Every type here is handed across a channel exactly once: the producer
//! gives it up and the consumer becomes its only owner.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque identifier of one node in the remote tree. The empty string names
/// the root.
pub type NodeId = String;

/// Snapshot of one shared box as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub node: NodeId,
    pub url: String,
    pub drive_path: String,
}

/// An item observed as a child of `parent_node` during this crawl pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredEdge {
    pub item: Item,
    pub parent_node: NodeId,
}

/// A failure observed while processing one job or one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeError {
    /// The node being processed, absent for batch-level failures
    pub node: Option<NodeId>,
    pub message: String,
}

impl NodeError {
    /// Records a failure for a specific node
    pub fn for_node(node: &str, err: &dyn std::error::Error) -> Self {
        Self {
            node: Some(node.to_string()),
            message: err.to_string(),
        }
    }

    /// Records a failure that is not tied to a single node
    pub fn detached(message: impl Into<String>) -> Self {
        Self {
            node: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeError: node={}, err={}",
            self.node.as_deref().unwrap_or(""),
            self.message
        )
    }
}

impl std::error::Error for NodeError {}

/// Envelope shared by every list endpoint of the admin API
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub total: i64,
    #[serde(default = "Vec::new")]
    pub lists: Vec<T>,
}

/// A user entry from the user list, kept as the raw JSON object
///
/// Only `user_seq` is interpreted; every other field is stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRecord(pub Map<String, Value>);

impl UserRecord {
    /// Returns the identity key of this user, accepting string or numeric ids
    pub fn user_seq(&self) -> Option<String> {
        match self.0.get("user_seq")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Command that owns a pipeline run; names the error-log list it writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SharedBoxSync,
    SharedBoxImport,
    UserSync,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SharedBoxSync => "sharedbox:sync",
            Self::SharedBoxImport => "sharedbox:import",
            Self::UserSync => "user:sync",
        }
    }

    /// Key of the durable error list for this operation in a session
    pub fn error_list_key(&self, session_id: &str) -> String {
        format!("{}:errors:{}", session_id, self.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
