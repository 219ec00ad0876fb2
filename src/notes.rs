//! Mirrors the three canonical notes files (`decisions.md`, `learnings.md`,
//! `blockers.md`) between the repo and a worktree, each a category-based
//! markdown file using a timestamped section-header append pattern, per
//! §4.I's three fixed files.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

pub const CANONICAL_FILES: [&str; 3] = ["decisions.md", "learnings.md", "blockers.md"];

#[derive(Debug, Error)]
pub enum NotesError {
    #[error("notes io error: {0}")]
    Io(#[from] std::io::Error),
}

fn sanitize_branch(branch: &str) -> String {
    branch.replace('/', "-")
}

fn placeholder(filename: &str) -> String {
    let title = match filename {
        "decisions.md" => "Decisions",
        "learnings.md" => "Learnings",
        "blockers.md" => "Blockers",
        other => other,
    };
    format!("# {title}\n")
}

fn ensure_with_placeholder(dir: &Path, filename: &str) -> Result<(), NotesError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    if !path.exists() {
        std::fs::write(&path, placeholder(filename))?;
    }
    Ok(())
}

/// Ensures `<repo>/notes/<sanitized-branch>/` exists with header-only
/// placeholders, then copies each file verbatim into `<worktree>/notes/`.
pub fn sync_notes_to_worktree(repo_path: &Path, worktree_path: &Path, branch_name: &str) -> Result<(), NotesError> {
    let repo_notes_dir = repo_path.join("notes").join(sanitize_branch(branch_name));
    let worktree_notes_dir = worktree_path.join("notes");
    std::fs::create_dir_all(&worktree_notes_dir)?;

    for filename in CANONICAL_FILES {
        ensure_with_placeholder(&repo_notes_dir, filename)?;
        let content = std::fs::read_to_string(repo_notes_dir.join(filename))?;
        std::fs::write(worktree_notes_dir.join(filename), content)?;
    }

    Ok(())
}

/// For each file that exists and is non-empty in the worktree, appends to
/// the repo-side file a timestamped section header followed by the trimmed
/// content and a trailing newline. Falls back to a full rewrite if the
/// append-mode open fails.
pub fn sync_notes_back(repo_path: &Path, worktree_path: &Path, branch_name: &str) -> Result<(), NotesError> {
    let repo_notes_dir = repo_path.join("notes").join(sanitize_branch(branch_name));
    let worktree_notes_dir = worktree_path.join("notes");
    std::fs::create_dir_all(&repo_notes_dir)?;

    let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

    for filename in CANONICAL_FILES {
        let worktree_file = worktree_notes_dir.join(filename);
        let Ok(content) = std::fs::read_to_string(&worktree_file) else {
            continue;
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            continue;
        }

        let section = format!("\n\n## {timestamp} \u{2013} {branch_name}\n{trimmed}\n");
        let repo_file = repo_notes_dir.join(filename);

        let append_result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&repo_file)
            .and_then(|mut f| f.write_all(section.as_bytes()));

        if append_result.is_err() {
            let mut existing = std::fs::read_to_string(&repo_file).unwrap_or_default();
            existing.push_str(&section);
            std::fs::write(&repo_file, existing)?;
        }
    }

    Ok(())
}

pub fn repo_notes_dir(repo_path: &Path, branch_name: &str) -> PathBuf {
    repo_path.join("notes").join(sanitize_branch(branch_name))
}

/// Ensures `<worktree>/notes/` exists with header-only placeholders for any
/// canonical file that is missing, without overwriting existing content.
/// Used by the launcher before it writes `AGENT.md`.
pub fn ensure_canonical_notes(worktree_path: &Path) -> Result<(), NotesError> {
    let dir = worktree_path.join("notes");
    for filename in CANONICAL_FILES {
        ensure_with_placeholder(&dir, filename)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_to_worktree_seeds_placeholders_and_copies() {
        let repo = tempfile::tempdir().unwrap();
        let worktree = tempfile::tempdir().unwrap();

        sync_notes_to_worktree(repo.path(), worktree.path(), "agent/claude-us-1").unwrap();

        for filename in CANONICAL_FILES {
            assert!(worktree.path().join("notes").join(filename).exists());
            assert!(repo
                .path()
                .join("notes/agent-claude-us-1")
                .join(filename)
                .exists());
        }
    }

    #[test]
    fn sync_back_appends_timestamped_section() {
        let repo = tempfile::tempdir().unwrap();
        let worktree = tempfile::tempdir().unwrap();
        sync_notes_to_worktree(repo.path(), worktree.path(), "agent/claude-us-1").unwrap();

        std::fs::write(
            worktree.path().join("notes/decisions.md"),
            "# Decisions\n\nUse sha256 for hashing.",
        )
        .unwrap();

        sync_notes_back(repo.path(), worktree.path(), "agent/claude-us-1").unwrap();

        let repo_content =
            std::fs::read_to_string(repo.path().join("notes/agent-claude-us-1/decisions.md")).unwrap();
        assert!(repo_content.contains("Use sha256 for hashing."));
        assert!(repo_content.contains("agent/claude-us-1"));
    }

    #[test]
    fn sync_back_skips_empty_files() {
        let repo = tempfile::tempdir().unwrap();
        let worktree = tempfile::tempdir().unwrap();
        sync_notes_to_worktree(repo.path(), worktree.path(), "agent/claude-us-1").unwrap();

        sync_notes_back(repo.path(), worktree.path(), "agent/claude-us-1").unwrap();

        let repo_content =
            std::fs::read_to_string(repo.path().join("notes/agent-claude-us-1/blockers.md")).unwrap();
        // only the placeholder header, no appended section
        assert_eq!(repo_content, "# Blockers\n");
    }

    #[test]
    fn round_trip_growth_is_monotonic_and_preserves_latest_contribution() {
        let repo = tempfile::tempdir().unwrap();
        let worktree = tempfile::tempdir().unwrap();
        sync_notes_to_worktree(repo.path(), worktree.path(), "agent/claude-us-1").unwrap();

        std::fs::write(worktree.path().join("notes/learnings.md"), "first learning").unwrap();
        sync_notes_back(repo.path(), worktree.path(), "agent/claude-us-1").unwrap();
        let after_first = std::fs::read_to_string(repo.path().join("notes/agent-claude-us-1/learnings.md")).unwrap();

        std::fs::write(worktree.path().join("notes/learnings.md"), "second learning").unwrap();
        sync_notes_back(repo.path(), worktree.path(), "agent/claude-us-1").unwrap();
        let after_second = std::fs::read_to_string(repo.path().join("notes/agent-claude-us-1/learnings.md")).unwrap();

        assert!(after_second.len() > after_first.len());
        assert!(after_second.trim_end().ends_with("second learning"));
    }

    #[test]
    fn sanitizes_branch_slashes_in_repo_dir() {
        let dir = repo_notes_dir(Path::new("/repo"), "feat/my-thing");
        assert_eq!(dir, PathBuf::from("/repo/notes/feat-my-thing"));
    }
}
