//! Durable knowledge-base snapshots.
//!
//! One snapshot is a pair of co-located artifacts sharing a base path:
//! `<base>.json` holds issue patterns, resolution templates, and the
//! conversation metadata list; `<base>.index` holds the vector index. The
//! metadata row order and the index row order are the same snapshot state,
//! so loading one without the other is an error, not a degraded mode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::index::VectorIndex;
use crate::kb::KnowledgeBase;
use crate::types::{AgentPerformance, IndexedConversation, IssuePattern, ResolutionTemplate};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("knowledge base snapshot not found at {0}")]
    NotFound(PathBuf),
    #[error("vector index artifact {0} is missing; snapshot is inconsistent")]
    MissingIndex(PathBuf),
    #[error("corrupt knowledge base snapshot: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Serialize, Deserialize)]
struct SnapshotMetadata {
    issue_patterns: BTreeMap<String, Vec<IssuePattern>>,
    resolution_templates: BTreeMap<String, Vec<ResolutionTemplate>>,
    /// Absent in snapshots written before performance tracking existed.
    #[serde(default)]
    agent_performance: BTreeMap<String, AgentPerformance>,
    conversations: Vec<IndexedConversation>,
}

fn metadata_path(base: &Path) -> PathBuf {
    base.with_extension("json")
}

fn index_path(base: &Path) -> PathBuf {
    base.with_extension("index")
}

/// Whether a snapshot's metadata artifact exists at `base`, so startup can
/// decide between loading and rebuilding.
pub fn snapshot_exists(base: &Path) -> bool {
    metadata_path(base).exists()
}

/// Persist the aggregate as a snapshot pair under `base`.
pub fn save(kb: &KnowledgeBase, base: &Path) -> Result<(), SnapshotError> {
    if let Some(parent) = base.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let metadata = SnapshotMetadata {
        issue_patterns: kb.issue_patterns.clone(),
        resolution_templates: kb.resolution_templates.clone(),
        agent_performance: kb.agent_performance.clone(),
        conversations: kb.conversations.clone(),
    };

    let file = std::fs::File::create(metadata_path(base))?;
    serde_json::to_writer(BufWriter::new(file), &metadata)
        .map_err(|e| SnapshotError::Corrupt(format!("failed to serialize metadata: {}", e)))?;

    kb.index.write_to(&index_path(base))?;

    tracing::info!(
        path = %base.display(),
        conversations = kb.conversations.len(),
        "Saved knowledge base snapshot"
    );
    Ok(())
}

/// Load a snapshot pair from `base`, failing fast on any inconsistency.
pub fn load(base: &Path) -> Result<KnowledgeBase, SnapshotError> {
    let metadata_file = metadata_path(base);
    if !metadata_file.exists() {
        return Err(SnapshotError::NotFound(metadata_file));
    }

    let index_file = index_path(base);
    if !index_file.exists() {
        return Err(SnapshotError::MissingIndex(index_file));
    }

    let file = std::fs::File::open(&metadata_file)?;
    let metadata: SnapshotMetadata = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| SnapshotError::Corrupt(format!("failed to parse metadata: {}", e)))?;

    let index = VectorIndex::read_from(&index_file)
        .map_err(|e| SnapshotError::Corrupt(format!("failed to read index: {}", e)))?;

    if index.len() != metadata.conversations.len() {
        return Err(SnapshotError::Corrupt(format!(
            "index has {} rows but metadata lists {} conversations",
            index.len(),
            metadata.conversations.len()
        )));
    }

    tracing::info!(
        path = %base.display(),
        conversations = metadata.conversations.len(),
        "Loaded knowledge base snapshot"
    );

    Ok(KnowledgeBase {
        issue_patterns: metadata.issue_patterns,
        resolution_templates: metadata.resolution_templates,
        agent_performance: metadata.agent_performance,
        conversations: metadata.conversations,
        index,
    })
}
