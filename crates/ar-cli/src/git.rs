//! Commit collection via git subprocesses.
//!
//! Scans the configured root two directory levels deep for repositories
//! and reads the commit log, diffs, and file snapshots for the analysis
//! window. Every failure in here degrades to an empty result with a
//! warning; a broken repo never fails the analysis.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, TimeZone, Utc};
use tokio::process::Command;

use ar_core::commit::{Change, CommitRecord, FileSnapshot, snapshot_plan};

use crate::config::GitConfig;

/// Author filter applied to `git log`, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorFilter {
    Pattern(String),
    Email(String),
    Name(String),
    None,
}

impl AuthorFilter {
    fn as_log_arg(&self) -> Option<String> {
        // Slashes would be taken as regex delimiters by some git builds.
        match self {
            Self::Pattern(pattern) => Some(format!("--author={pattern}")),
            Self::Email(email) => Some(format!("--author={}", email.replace('/', "\\/"))),
            Self::Name(name) => Some(format!("--author={}", name.replace('/', "\\/"))),
            Self::None => None,
        }
    }
}

async fn run_git(repo: &Path, args: &[String]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn is_git_repo(dir: &Path) -> bool {
    tokio::fs::metadata(dir.join(".git"))
        .await
        .is_ok_and(|meta| meta.is_dir())
}

/// Lists repositories exactly two levels under `root` (org/repo layout).
async fn list_repos_at_depth2(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut repos = Vec::new();
    let mut level1 = tokio::fs::read_dir(root).await?;
    while let Some(org) = level1.next_entry().await? {
        if !org.file_type().await.is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let Ok(mut level2) = tokio::fs::read_dir(org.path()).await else {
            continue;
        };
        while let Some(repo) = level2.next_entry().await? {
            if !repo.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            if is_git_repo(&repo.path()).await {
                repos.push(repo.path());
            }
        }
    }
    Ok(repos)
}

/// Resolves the author filter: explicit config first, then the global git
/// identity.
pub async fn resolve_author_filter(config: &GitConfig) -> AuthorFilter {
    let configured = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    };
    if let Some(pattern) = configured(&config.author_pattern) {
        return AuthorFilter::Pattern(pattern);
    }
    if let Some(email) = configured(&config.author_email) {
        return AuthorFilter::Email(email);
    }
    if let Some(name) = configured(&config.author_name) {
        return AuthorFilter::Name(name);
    }

    async fn global(key: &'static str) -> Option<String> {
        let output = Command::new("git")
            .args(["config", "--global", key])
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!value.is_empty()).then_some(value)
    }
    if let Some(email) = global("user.email").await {
        return AuthorFilter::Email(email);
    }
    if let Some(name) = global("user.name").await {
        return AuthorFilter::Name(name);
    }
    AuthorFilter::None
}

fn cap_chars(text: String, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text;
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}\n[truncated]")
}

/// Parses one `--name-status` line into a change, skipping anything that
/// is not a plain modify/add/delete/rename.
fn parse_name_status_line(line: &str) -> Option<Change> {
    let mut parts = line.split('\t');
    let status = parts.next()?;
    if status.starts_with('R') {
        let old_path = parts.next()?.to_string();
        let new_path = parts.next()?.to_string();
        return Some(Change::Renamed { old_path, new_path });
    }
    let path = parts.next()?.to_string();
    match status {
        "M" => Some(Change::Modified { path }),
        "A" => Some(Change::Added { path }),
        "D" => Some(Change::Deleted { path }),
        _ => None,
    }
}

async fn commit_diff(repo: &Path, hash: &str, config: &GitConfig) -> String {
    let args = vec![
        "show".to_string(),
        "--no-color".to_string(),
        "--format=".to_string(),
        format!("-U{}", config.diff_context),
        hash.to_string(),
    ];
    match run_git(repo, &args).await {
        Some(patch) => cap_chars(patch, config.max_diff_chars),
        None => {
            tracing::warn!(repo = %repo.display(), %hash, "failed to read commit diff");
            String::new()
        }
    }
}

async fn commit_changes(repo: &Path, hash: &str) -> Vec<Change> {
    let args = vec![
        "show".to_string(),
        "--name-status".to_string(),
        "--pretty=".to_string(),
        "-M".to_string(),
        "--diff-filter=ACMDRTUXB".to_string(),
        hash.to_string(),
    ];
    match run_git(repo, &args).await {
        Some(output) => output
            .lines()
            .filter(|line| !line.is_empty())
            .filter_map(parse_name_status_line)
            .collect(),
        None => {
            tracing::warn!(repo = %repo.display(), %hash, "failed to read changed files");
            Vec::new()
        }
    }
}

async fn collect_commits_from_repo(
    repo: &Path,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    author: &AuthorFilter,
    config: &GitConfig,
) -> Vec<CommitRecord> {
    // Unit separator in the pretty format keeps subjects with commas intact.
    let mut args = vec![
        "log".to_string(),
        "--all".to_string(),
        format!("--since={}", start.to_rfc3339()),
        format!("--until={}", end.to_rfc3339()),
        "--no-show-signature".to_string(),
        "--pretty=%H%x1f%at%x1f%s".to_string(),
        "-n".to_string(),
        config.max_commits.to_string(),
    ];
    if let Some(author_arg) = author.as_log_arg() {
        args.insert(4, author_arg);
    }

    let Some(log) = run_git(repo, &args).await else {
        tracing::warn!(repo = %repo.display(), "failed to read git log");
        return Vec::new();
    };

    let repo_name = repo
        .file_name()
        .map_or_else(|| repo.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut commits = Vec::new();
    for line in log.lines().filter(|line| !line.is_empty()) {
        let mut fields = line.split('\u{1f}');
        let (Some(hash), Some(at)) = (fields.next(), fields.next()) else {
            continue;
        };
        if hash.is_empty() || at.is_empty() {
            continue;
        }
        let subject = fields.next().unwrap_or_default();
        let Some(timestamp) = at
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        else {
            continue;
        };

        let diff = commit_diff(repo, hash, config).await;
        let changes = commit_changes(repo, hash).await;
        commits.push(CommitRecord {
            hash: hash.to_string(),
            subject: subject.to_string(),
            timestamp,
            repo_path: repo.display().to_string(),
            repo_name: repo_name.clone(),
            diff,
            changes,
        });
    }
    commits
}

/// Collects commits across all repos under the scan root, sorted by
/// author timestamp ascending.
pub async fn collect_commits_in_range(
    config: &GitConfig,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<CommitRecord> {
    let author = resolve_author_filter(config).await;
    if author == AuthorFilter::None {
        tracing::warn!(
            "no author filter found; set git.author_pattern, git.author_email, or \
             git.author_name to restrict commits"
        );
    }

    let repos = match list_repos_at_depth2(&config.scan_root).await {
        Ok(repos) => repos,
        Err(err) => {
            tracing::warn!(
                root = %config.scan_root.display(),
                error = %err,
                "failed to scan for repositories"
            );
            return Vec::new();
        }
    };

    let mut commits = Vec::new();
    for repo in repos {
        commits.extend(collect_commits_from_repo(&repo, start, end, &author, config).await);
    }
    commits.sort_by_key(|commit| commit.timestamp);
    commits
}

/// Resolves before/after file content for the snapshot plan.
///
/// Missing content (file added in the earliest commit, deleted in the
/// latest, unreadable blob) renders as an empty string.
pub async fn build_file_snapshots(
    config: &GitConfig,
    commits: &[CommitRecord],
) -> Vec<FileSnapshot> {
    let plan = snapshot_plan(commits, config.max_snapshot_files);
    let mut snapshots = Vec::with_capacity(plan.len());
    for bounds in plan {
        let repo = PathBuf::from(&bounds.repo_path);
        let before_spec = format!("{}^:{}", bounds.earliest_hash, bounds.before_path);
        let after_spec = format!("{}:{}", bounds.latest_hash, bounds.after_path);
        let before = run_git(&repo, &["show".to_string(), before_spec])
            .await
            .unwrap_or_default();
        let after = run_git(&repo, &["show".to_string(), after_spec])
            .await
            .unwrap_or_default();
        snapshots.push(FileSnapshot {
            repo_name: bounds.repo_name,
            repo_path: bounds.repo_path,
            path: bounds.path,
            before: cap_chars(before, config.max_file_chars),
            after: cap_chars(after, config.max_file_chars),
        });
    }
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_filter_prefers_pattern_then_email_then_name() {
        let filter = AuthorFilter::Pattern("alice|bob".to_string());
        assert_eq!(filter.as_log_arg().as_deref(), Some("--author=alice|bob"));

        let filter = AuthorFilter::Email("a/b@example.com".to_string());
        assert_eq!(
            filter.as_log_arg().as_deref(),
            Some("--author=a\\/b@example.com")
        );

        assert_eq!(AuthorFilter::None.as_log_arg(), None);
    }

    #[tokio::test]
    async fn configured_pattern_wins_over_email_and_name() {
        let config = GitConfig {
            author_pattern: Some("pat".to_string()),
            author_email: Some("mail@example.com".to_string()),
            author_name: Some("Name".to_string()),
            ..GitConfig::default()
        };
        assert_eq!(
            resolve_author_filter(&config).await,
            AuthorFilter::Pattern("pat".to_string())
        );
    }

    #[tokio::test]
    async fn configured_email_used_when_pattern_absent() {
        let config = GitConfig {
            author_email: Some("mail@example.com".to_string()),
            author_name: Some("Name".to_string()),
            ..GitConfig::default()
        };
        assert_eq!(
            resolve_author_filter(&config).await,
            AuthorFilter::Email("mail@example.com".to_string())
        );
    }

    #[test]
    fn name_status_lines_parse_into_changes() {
        assert_eq!(
            parse_name_status_line("M\tsrc/lib.rs"),
            Some(Change::Modified {
                path: "src/lib.rs".to_string()
            })
        );
        assert_eq!(
            parse_name_status_line("R100\told.rs\tnew.rs"),
            Some(Change::Renamed {
                old_path: "old.rs".to_string(),
                new_path: "new.rs".to_string()
            })
        );
        assert_eq!(parse_name_status_line("T\tsome-link"), None);
        assert_eq!(parse_name_status_line("M"), None);
    }

    #[test]
    fn cap_chars_appends_truncation_marker() {
        let capped = cap_chars("abcdef".to_string(), 3);
        assert_eq!(capped, "abc\n[truncated]");
        assert_eq!(cap_chars("abc".to_string(), 3), "abc");
        assert_eq!(cap_chars("abcdef".to_string(), 0), "abcdef");
    }

    #[tokio::test]
    async fn scan_of_missing_root_returns_empty() {
        let config = GitConfig {
            scan_root: PathBuf::from("/nonexistent/for/sure"),
            author_pattern: Some("x".to_string()),
            ..GitConfig::default()
        };
        let commits = collect_commits_in_range(
            &config,
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 1, 0, 0).unwrap(),
        )
        .await;
        assert!(commits.is_empty());
    }
}
