//! Commit history types and their projection into the event pipeline.
//!
//! Commits are fetched externally (see the CLI's git collector) and enter
//! the serialized document as synthetic `git.commit` events. They are
//! deliberately excluded from statistics: their placeholder duration would
//! skew every duration-based metric.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::event::RawEvent;

/// One file-level change within a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Change {
    Modified { path: String },
    Added { path: String },
    Deleted { path: String },
    Renamed { old_path: String, new_path: String },
}

impl Change {
    /// The path a change is tracked under (the new path for renames).
    pub fn tracked_path(&self) -> &str {
        match self {
            Self::Modified { path } | Self::Added { path } | Self::Deleted { path } => path,
            Self::Renamed { new_path, .. } => new_path,
        }
    }
}

/// One commit matching the author filter within the analysis window.
#[derive(Debug, Clone, Serialize)]
pub struct CommitRecord {
    pub hash: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub repo_path: String,
    pub repo_name: String,
    pub diff: String,
    pub changes: Vec<Change>,
}

/// Synthetic bucket id for commit-derived events.
pub const COMMIT_BUCKET_ID: i64 = -1000;

/// Placeholder duration for commit events; non-zero so they survive the
/// zero-duration filter, small enough to be obviously synthetic.
const COMMIT_EVENT_DURATION: f64 = 1.0;

/// Projects commits into synthetic raw events for the serialized document.
///
/// Events carry negative ids, the `git.commit` bucket type, and a payload
/// of `{repo, path, subject, diff}`. The result is sorted ascending by
/// timestamp.
pub fn build_commit_events(commits: &[CommitRecord]) -> Vec<RawEvent> {
    let mut events: Vec<RawEvent> = commits
        .iter()
        .enumerate()
        .map(|(index, commit)| {
            let payload = json!({
                "repo": commit.repo_name,
                "path": commit.repo_path,
                "subject": commit.subject,
                "diff": commit.diff,
            });
            #[expect(
                clippy::cast_possible_wrap,
                reason = "commit counts are nowhere near i64::MAX"
            )]
            let id = -1 - index as i64;
            RawEvent {
                id,
                bucket_id: COMMIT_BUCKET_ID,
                timestamp: commit.timestamp,
                duration: COMMIT_EVENT_DURATION,
                payload: payload.to_string(),
                bucket_type: "git.commit".to_string(),
            }
        })
        .collect();
    events.sort_by_key(|event| event.timestamp);
    events
}

/// The earliest pre-image and latest post-image of one touched file.
#[derive(Debug, Clone, Serialize)]
pub struct FileSnapshot {
    pub repo_name: String,
    pub repo_path: String,
    pub path: String,
    pub before: String,
    pub after: String,
}

/// Where to read a snapshot's before/after content from.
///
/// The pure planning step; the git collector resolves the actual blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBounds {
    pub repo_name: String,
    pub repo_path: String,
    /// Tracked path (post-rename) the snapshot is keyed by.
    pub path: String,
    /// Commit whose parent holds the pre-image.
    pub earliest_hash: String,
    /// Path of the pre-image (the old path for renames).
    pub before_path: String,
    /// Commit holding the post-image.
    pub latest_hash: String,
    /// Path of the post-image.
    pub after_path: String,
}

/// Plans snapshot reads: per repo, per touched file, the earliest and
/// latest change across the window's commits, capped at `max_files` total.
pub fn snapshot_plan(commits: &[CommitRecord], max_files: usize) -> Vec<SnapshotBounds> {
    use std::collections::BTreeMap;

    // Group chronologically within each repo; BTreeMap keeps repo order
    // stable across runs.
    let mut by_repo: BTreeMap<&str, Vec<&CommitRecord>> = BTreeMap::new();
    for commit in commits {
        by_repo.entry(commit.repo_path.as_str()).or_default().push(commit);
    }

    let mut plan = Vec::new();
    for (repo_path, mut repo_commits) in by_repo {
        repo_commits.sort_by_key(|commit| commit.timestamp);
        let repo_name = repo_commits
            .first()
            .map(|c| c.repo_name.clone())
            .unwrap_or_default();

        // Earliest and latest change per tracked path, insertion-ordered.
        let mut bounds: Vec<SnapshotBounds> = Vec::new();
        for commit in &repo_commits {
            for change in &commit.changes {
                let key = change.tracked_path().to_string();
                let before_path = match change {
                    Change::Renamed { old_path, .. } => old_path.clone(),
                    _ => key.clone(),
                };
                if let Some(existing) = bounds.iter_mut().find(|b| b.path == key) {
                    existing.latest_hash = commit.hash.clone();
                    existing.after_path = key;
                } else {
                    bounds.push(SnapshotBounds {
                        repo_name: repo_name.clone(),
                        repo_path: repo_path.to_string(),
                        path: key.clone(),
                        earliest_hash: commit.hash.clone(),
                        before_path,
                        latest_hash: commit.hash.clone(),
                        after_path: key,
                    });
                }
            }
        }

        for entry in bounds {
            if plan.len() >= max_files {
                return plan;
            }
            plan.push(entry);
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit(hash: &str, minute: u32, changes: Vec<Change>) -> CommitRecord {
        CommitRecord {
            hash: hash.to_string(),
            subject: format!("commit {hash}"),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 10, minute, 0).unwrap(),
            repo_path: "/src/org/proj".to_string(),
            repo_name: "proj".to_string(),
            diff: "diff".to_string(),
            changes,
        }
    }

    #[test]
    fn commit_events_are_sorted_with_placeholder_duration() {
        let commits = vec![
            commit("b", 30, vec![]),
            commit("a", 10, vec![]),
        ];
        let events = build_commit_events(&commits);
        assert_eq!(events.len(), 2);
        assert!(events[0].timestamp < events[1].timestamp);
        assert!(events.iter().all(|e| e.duration > 0.0));
        assert!(events.iter().all(|e| e.id < 0));
        assert!(events.iter().all(|e| e.bucket_type == "git.commit"));

        let payload: serde_json::Value = serde_json::from_str(&events[0].payload).unwrap();
        assert_eq!(payload["repo"], "proj");
        assert_eq!(payload["subject"], "commit a");
    }

    #[test]
    fn snapshot_plan_tracks_earliest_and_latest_change() {
        let commits = vec![
            commit("c1", 0, vec![Change::Added { path: "a.rs".into() }]),
            commit("c2", 10, vec![Change::Modified { path: "a.rs".into() }]),
            commit("c3", 20, vec![Change::Modified { path: "a.rs".into() }]),
        ];
        let plan = snapshot_plan(&commits, 50);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].earliest_hash, "c1");
        assert_eq!(plan[0].latest_hash, "c3");
        assert_eq!(plan[0].before_path, "a.rs");
        assert_eq!(plan[0].after_path, "a.rs");
    }

    #[test]
    fn snapshot_plan_uses_old_path_for_renamed_pre_image() {
        let commits = vec![commit(
            "c1",
            0,
            vec![Change::Renamed {
                old_path: "old.rs".into(),
                new_path: "new.rs".into(),
            }],
        )];
        let plan = snapshot_plan(&commits, 50);
        assert_eq!(plan[0].path, "new.rs");
        assert_eq!(plan[0].before_path, "old.rs");
    }

    #[test]
    fn snapshot_plan_respects_file_cap() {
        let changes: Vec<Change> = (0..10)
            .map(|i| Change::Added { path: format!("f{i}.rs") })
            .collect();
        let commits = vec![commit("c1", 0, changes)];
        assert_eq!(snapshot_plan(&commits, 3).len(), 3);
    }
}
