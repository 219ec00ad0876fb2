//! Produces and executes a topologically-ordered merge plan across
//! completed worktree branches, with conflict handling and optional
//! rollback, via `git merge <branch> --no-edit` with an abort-on-conflict
//! path for `FailFast`.
//!
//! §4.N frames the Merge Coordinator as an external collaborator contract
//! only; this crate ships a concrete default implementation behind that same
//! contract since there is no separate process to delegate to (see
//! DESIGN.md's Open Question resolutions for the per-strategy rollback
//! behavior this module picks).

use std::path::Path;

use thiserror::Error;

use crate::git::{GitError, GitService, MergeOutcome};
use crate::types::{ConflictStrategy, MergeConflict, MergePlan, MergePlanStep, MergeResult, MergeStepStatus, WorktreeAssignment};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Builds the merge plan. Task groups partition the story set into disjoint
/// clusters (§4.G), so no assignment's branch depends on another's; every
/// step starts `Ready` and the topological order is simply assignment order.
pub fn build_plan(base_branch: &str, assignments: &[WorktreeAssignment]) -> MergePlan {
    let steps = assignments
        .iter()
        .map(|a| MergePlanStep {
            assignment_id: a.id,
            branch_name: a.branch_name.clone(),
            depends_on: Vec::new(),
            status: MergeStepStatus::Ready,
        })
        .collect();
    MergePlan { base_branch: base_branch.to_string(), steps }
}

/// Executes `plan` against `repo_path`. If `auto_merge` is false, the plan
/// is returned as a no-op success with no branches actually merged (§4.M).
pub fn coordinate_merge(
    git: &dyn GitService,
    repo_path: &Path,
    plan: &MergePlan,
    strategy: ConflictStrategy,
    auto_merge: bool,
) -> Result<MergeResult, MergeError> {
    if !auto_merge {
        return Ok(MergeResult {
            base_branch: plan.base_branch.clone(),
            merged_branches: Vec::new(),
            conflicts: Vec::new(),
            success: true,
            rolled_back: false,
        });
    }

    let pre_run_tip = git.current_tip(repo_path)?;
    let mut merged_branches = Vec::new();
    let mut conflicts = Vec::new();
    let mut rolled_back = false;

    for step in &plan.steps {
        match git.merge(repo_path, &step.branch_name)? {
            MergeOutcome::Merged | MergeOutcome::NoOp => {
                merged_branches.push(step.branch_name.clone());
            }
            MergeOutcome::Conflict { files } => match strategy {
                ConflictStrategy::PreferPrimary => {
                    resolve_prefer_primary(git, repo_path, &step.branch_name)?;
                    merged_branches.push(step.branch_name.clone());
                }
                ConflictStrategy::ManualReview => {
                    for file in files {
                        conflicts.push(MergeConflict {
                            branch_name: step.branch_name.clone(),
                            file_path: file.into(),
                            detail: "conflicting hunks; left for manual resolution".into(),
                        });
                    }
                }
                ConflictStrategy::FailFast => {
                    for file in files {
                        conflicts.push(MergeConflict {
                            branch_name: step.branch_name.clone(),
                            file_path: file.into(),
                            detail: "conflicting hunks; merge run aborted".into(),
                        });
                    }
                    git.reset_hard(repo_path, &pre_run_tip)?;
                    rolled_back = true;
                    return Ok(MergeResult {
                        base_branch: plan.base_branch.clone(),
                        merged_branches: Vec::new(),
                        conflicts,
                        success: false,
                        rolled_back,
                    });
                }
            },
        }
    }

    Ok(MergeResult {
        base_branch: plan.base_branch.clone(),
        merged_branches,
        success: conflicts.is_empty(),
        conflicts,
        rolled_back,
    })
}

/// Earlier-merged branches already occupy the base tip, so "primary wins"
/// means keeping the base side of every conflicting hunk. `git.merge`
/// already aborted this branch's merge and left the tree clean by the time
/// this runs, so re-resolving from the aborted index is not an option —
/// instead this re-runs the merge with `-X ours`, which auto-resolves
/// conflicting hunks toward `HEAD` and completes the merge commit itself.
fn resolve_prefer_primary(git: &dyn GitService, repo_path: &Path, branch_name: &str) -> Result<(), MergeError> {
    git.merge_prefer_ours(repo_path, branch_name)?;
    Ok(())
}
