//! Kanban board state: grouping issues into status columns, resolving drag
//! targets, and applying optimistic moves with snapshot rollback.
//!
//! The reducer owns no persisted state. It holds the issue list from the last
//! authoritative fetch, mutates it optimistically while the server round-trip
//! is in flight, and either commits (caller refetches) or rolls back to the
//! pre-move snapshot.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// The slice of an issue the board logic needs. Everything else on an issue
/// (title, priority, labels, ...) is payload that rides along unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct BoardIssue {
    pub id: Uuid,
    pub status_id: Uuid,
    pub position: i64,
}

/// Resolved destination for a drag: target column and insertion index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub status_id: Uuid,
    pub index: usize,
}

/// Issue list as of the last server fetch plus the ordered column ids.
#[derive(Debug, Clone)]
pub struct BoardState {
    columns: Vec<Uuid>,
    issues: Vec<BoardIssue>,
}

impl BoardState {
    pub fn new(columns: Vec<Uuid>, issues: Vec<BoardIssue>) -> Self {
        Self { columns, issues }
    }

    pub fn issues(&self) -> &[BoardIssue] {
        &self.issues
    }

    /// Issues of one column, ascending by position. The sort is stable, so
    /// duplicate positions keep their order from the last fetch.
    pub fn column(&self, status_id: Uuid) -> Vec<&BoardIssue> {
        let mut members: Vec<&BoardIssue> = self
            .issues
            .iter()
            .filter(|issue| issue.status_id == status_id)
            .collect();
        members.sort_by_key(|issue| issue.position);
        members
    }

    /// Resolves what the drag was dropped onto. A column id means "append to
    /// that column"; another issue's id means "insert immediately before that
    /// issue". An id matching neither (drop outside any valid target, or a
    /// stale list) resolves to `None`.
    pub fn resolve_drop_target(&self, over_id: Uuid) -> Option<DropTarget> {
        if self.columns.contains(&over_id) {
            return Some(DropTarget {
                status_id: over_id,
                index: self.column(over_id).len(),
            });
        }

        let over_issue = self.issues.iter().find(|issue| issue.id == over_id)?;
        let status_id = over_issue.status_id;
        let index = self
            .column(status_id)
            .iter()
            .position(|issue| issue.id == over_id)?;
        Some(DropTarget { status_id, index })
    }

    /// Applies a move before the server has confirmed it: the dragged issue
    /// gets the target column and `position = index`. No other issue is
    /// renumbered; the column's visual order is entirely a function of the
    /// position sort. Returns `None` (state untouched) when the issue id is
    /// unknown.
    pub fn apply_move(&mut self, issue_id: Uuid, target: DropTarget) -> Option<PendingMove> {
        let idx = self.issues.iter().position(|issue| issue.id == issue_id)?;
        let snapshot = self.issues.clone();

        let issue = &mut self.issues[idx];
        issue.status_id = target.status_id;
        issue.position = target.index as i64;

        Some(PendingMove { snapshot })
    }
}

/// Undo token for an optimistic move. Commit when the server confirms (the
/// caller then refetches authoritative positions); roll back when the move
/// request fails, restoring the exact pre-move list.
#[must_use = "a pending move must be committed or rolled back"]
#[derive(Debug)]
pub struct PendingMove {
    snapshot: Vec<BoardIssue>,
}

impl PendingMove {
    pub fn commit(self) {}

    pub fn rollback(self, state: &mut BoardState) {
        state.issues = self.snapshot;
    }
}
