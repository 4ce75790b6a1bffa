use crate::change::{Change, ChangeStatus};
use crate::order::files_before_dirs;
use crate::planner::RenamePlan;
use crate::validate::{validate, ValidateOptions};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupRecord {
    pub changes: Vec<Change>,
    #[serde(default)]
    pub cleaned_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub backup_path: Option<PathBuf>,
    pub clean: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryFailure {
    pub source: PathBuf,
    pub target: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub applied: usize,
    pub unchanged: usize,
    pub errors: Vec<EntryFailure>,
    pub cleaned_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct UndoOptions {
    pub validate: ValidateOptions,
    pub clean: bool,
}

impl Default for UndoOptions {
    fn default() -> Self {
        Self {
            validate: ValidateOptions {
                auto_fix: true,
                ..ValidateOptions::default()
            },
            clean: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndoResult {
    pub restored: usize,
    pub skipped: usize,
    pub errors: Vec<EntryFailure>,
}

/// Renames every pending entry of a conflict-free plan, in plan order.
///
/// Entries that fail to rename keep their error in `Change::error` and are
/// left out of the backup record.
pub fn apply_plan(plan: &mut RenamePlan, options: &ApplyOptions) -> Result<ApplyResult> {
    if plan.has_conflicts() {
        let count: usize = plan.conflicts.values().map(Vec::len).sum();
        bail!("plan has {count} unresolved conflicts; nothing was renamed");
    }
    if let Some(change) = plan
        .changes
        .iter()
        .find(|c| !c.status.is_committable() && c.status != ChangeStatus::Ignored)
    {
        bail!(
            "plan entry {} has status {:?}; nothing was renamed",
            change.source_path().display(),
            change.status
        );
    }

    let (result, committed) = commit(&mut plan.changes, options.clean)?;
    if let Some(backup_path) = &options.backup_path {
        if !committed.is_empty() {
            persist_backup(
                backup_path,
                &BackupRecord {
                    changes: committed,
                    cleaned_dirs: result.cleaned_dirs.clone(),
                },
            )?;
        }
    }
    info!(
        "applied {} renames, {} failed",
        result.applied,
        result.errors.len()
    );
    Ok(result)
}

fn is_pending(change: &Change) -> bool {
    matches!(change.status, ChangeStatus::Ok | ChangeStatus::Overwriting)
}

fn commit(changes: &mut [Change], clean: bool) -> Result<(ApplyResult, Vec<Change>)> {
    create_target_dirs(changes)?;

    let mut committed = Vec::new();
    let mut errors = Vec::new();
    let mut unchanged = 0usize;
    for (index, change) in changes.iter_mut().enumerate() {
        if !is_pending(change) {
            unchanged += 1;
            continue;
        }
        let source = change.source_path();
        let target = change.target_path();
        let overwrite = change.status == ChangeStatus::Overwriting;
        match rename_entry(&source, &target, index, overwrite) {
            Ok(()) => {
                debug!("renamed {} -> {}", source.display(), target.display());
                change.error = None;
                committed.push(change.clone());
            }
            Err(err) => {
                warn!("{:#}", err);
                let message = format!("{err:#}");
                change.error = Some(message.clone());
                errors.push(EntryFailure {
                    source,
                    target,
                    message,
                });
            }
        }
    }

    let cleaned_dirs = if clean {
        remove_empty_sources(&committed)
    } else {
        Vec::new()
    };

    Ok((
        ApplyResult {
            applied: committed.len(),
            unchanged,
            errors,
            cleaned_dirs,
        },
        committed,
    ))
}

fn create_target_dirs(changes: &[Change]) -> Result<()> {
    let arriving: Vec<PathBuf> = changes
        .iter()
        .filter(|c| c.is_dir && is_pending(c))
        .map(Change::target_path)
        .collect();
    let dirs: BTreeSet<PathBuf> = changes
        .iter()
        .filter(|c| is_pending(c))
        .filter_map(|c| c.target_path().parent().map(Path::to_path_buf))
        .filter(|dir| !arriving.iter().any(|target| dir.starts_with(target)))
        .collect();

    for dir in dirs {
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create target directory: {}", dir.display()))?;
        debug!("created {}", dir.display());
    }
    Ok(())
}

fn rename_entry(source: &Path, target: &Path, index: usize, overwrite: bool) -> Result<()> {
    // An earlier failure can leave a planned-vacant target in place.
    if !overwrite && !is_case_only(source, target) && fs::symlink_metadata(target).is_ok() {
        bail!(
            "refusing to rename {} -> {}: target exists",
            source.display(),
            target.display()
        );
    }
    if is_case_only(source, target) {
        let temp = temp_path_for(source, index);
        fs::rename(source, &temp).with_context(|| {
            format!(
                "failed to move aside for case-only rename: {} -> {}",
                source.display(),
                temp.display()
            )
        })?;
        if let Err(err) = fs::rename(&temp, target) {
            let restore = fs::rename(&temp, source);
            let err = anyhow::Error::from(err).context(format!(
                "failed to rename {} -> {}",
                source.display(),
                target.display()
            ));
            return match restore {
                Ok(()) => Err(err),
                Err(restore_err) => Err(err.context(format!(
                    "and failed to restore {}: {restore_err}",
                    temp.display()
                ))),
            };
        }
        return Ok(());
    }

    fs::rename(source, target)
        .with_context(|| format!("failed to rename {} -> {}", source.display(), target.display()))
}

fn is_case_only(source: &Path, target: &Path) -> bool {
    source != target
        && source.to_string_lossy().to_lowercase() == target.to_string_lossy().to_lowercase()
}

fn remove_empty_sources(committed: &[Change]) -> Vec<PathBuf> {
    let candidates: BTreeSet<PathBuf> = committed
        .iter()
        .filter(|change| change.base_dir != change.target_dir)
        .map(|change| change.base_dir.clone())
        .collect();

    let mut cleaned = Vec::new();
    for dir in candidates.into_iter().rev() {
        let is_empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            continue;
        }
        match fs::remove_dir(&dir) {
            Ok(()) => {
                debug!("removed empty directory {}", dir.display());
                cleaned.push(dir);
            }
            Err(err) => warn!("failed to remove empty directory {}: {}", dir.display(), err),
        }
    }
    cleaned
}

fn persist_backup(path: &Path, record: &BackupRecord) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create backup directory: {}", dir.display()))?;
    }
    let body = serde_json::to_string_pretty(record).context("failed to serialize backup record")?;
    fs::write(path, body)
        .with_context(|| format!("failed to write backup record: {}", path.display()))?;
    Ok(())
}

pub fn read_backup(path: &Path) -> Result<BackupRecord> {
    if !path.exists() {
        bail!("nothing to undo: {} does not exist", path.display());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read backup record: {}", path.display()))?;
    serde_json::from_str::<BackupRecord>(&raw)
        .with_context(|| format!("backup record is corrupt: {}", path.display()))
}

/// Replays the backup record at `backup_path` backwards.
///
/// The record is removed once every entry has been restored.
pub fn undo(backup_path: &Path, options: &UndoOptions) -> Result<UndoResult> {
    let record = read_backup(backup_path)?;

    for dir in &record.cleaned_dirs {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to recreate directory: {}", dir.display()))?;
    }

    let mut changes: Vec<Change> = record.changes.iter().rev().map(Change::reversed).collect();
    files_before_dirs(&mut changes, true);

    let validate_options = ValidateOptions {
        undo_mode: true,
        ..options.validate.clone()
    };
    let report = validate(&mut changes, &validate_options).context("undo validation failed")?;
    if !report.is_clean() {
        bail!(
            "undo has {} unresolved conflicts; nothing was restored",
            report.conflict_count()
        );
    }
    let skipped = changes
        .iter()
        .filter(|c| c.status == ChangeStatus::Ignored)
        .count();

    let (result, _) = commit(&mut changes, options.clean)?;
    if result.errors.is_empty() {
        fs::remove_file(backup_path).with_context(|| {
            format!("failed to remove backup record: {}", backup_path.display())
        })?;
    }
    info!("restored {} entries, {} skipped", result.applied, skipped);

    Ok(UndoResult {
        restored: result.applied,
        skipped,
        errors: result.errors,
    })
}

fn temp_path_for(original_path: &Path, index: usize) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let parent = original_path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = original_path
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| "entry".to_string());
    parent.join(format!(".batch_renamer_tmp_{}_{}_{}", now, index, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{Conflict, ConflictKind};
    use crate::planner::RenameStats;
    use crate::sanitize::Platform;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn validate_options() -> ValidateOptions {
        ValidateOptions {
            platform: Platform::Unix,
            case_insensitive_fs: false,
            ..ValidateOptions::default()
        }
    }

    fn renamed(base: &Path, from: &str, to: &str, is_dir: bool) -> Change {
        let mut change = Change::new(0, base, from, is_dir);
        change.target_name = to.to_string();
        change.status = ChangeStatus::Ok;
        change
    }

    fn plan_of(mut changes: Vec<Change>) -> RenamePlan {
        files_before_dirs(&mut changes, false);
        let report = validate(&mut changes, &validate_options()).expect("validation runs");
        assert!(report.is_clean(), "fixture plan must be clean");
        RenamePlan {
            changes,
            conflicts: report.conflicts,
            stats: RenameStats::default(),
        }
    }

    #[test]
    fn apply_and_undo_round_trip() {
        let temp = tempdir().expect("tempdir");
        let state = tempdir().expect("state dir");
        let root = temp.path();
        fs::create_dir_all(root.join("d")).expect("create dir");
        fs::write(root.join("d").join("a.txt"), b"A").expect("write file");
        let backup = state.path().join("undo-last.json");

        let mut plan = plan_of(vec![
            renamed(root, "d", "e", true),
            renamed(&root.join("d"), "a.txt", "b.txt", false),
        ]);
        let result = apply_plan(
            &mut plan,
            &ApplyOptions {
                backup_path: Some(backup.clone()),
                clean: false,
            },
        )
        .expect("apply must succeed");
        assert_eq!(result.applied, 2);
        assert!(result.errors.is_empty());
        assert!(root.join("e").join("b.txt").exists());
        assert!(backup.exists());

        let undo_options = UndoOptions {
            validate: ValidateOptions {
                auto_fix: true,
                ..validate_options()
            },
            clean: false,
        };
        let restored = undo(&backup, &undo_options).expect("undo must succeed");
        assert_eq!(restored.restored, 2);
        assert_eq!(fs::read(root.join("d").join("a.txt")).expect("read"), b"A");
        assert!(!root.join("e").exists());
        assert!(!backup.exists());
    }

    #[test]
    fn clean_removes_emptied_sources_and_undo_recreates_them() {
        let temp = tempdir().expect("tempdir");
        let state = tempdir().expect("state dir");
        let root = temp.path();
        let sub = root.join("sub");
        fs::create_dir_all(&sub).expect("create dir");
        fs::write(sub.join("x.txt"), b"x").expect("write file");
        let backup = state.path().join("undo-last.json");

        let mut change = renamed(&sub, "x.txt", "x.txt", false);
        change.target_dir = root.to_path_buf();
        let mut plan = plan_of(vec![change]);
        let result = apply_plan(
            &mut plan,
            &ApplyOptions {
                backup_path: Some(backup.clone()),
                clean: true,
            },
        )
        .expect("apply must succeed");
        assert_eq!(result.cleaned_dirs, vec![sub.clone()]);
        assert!(!sub.exists());

        let record = read_backup(&backup).expect("record");
        assert_eq!(record.cleaned_dirs, vec![sub.clone()]);

        let undo_options = UndoOptions {
            validate: validate_options(),
            clean: false,
        };
        undo(&backup, &undo_options).expect("undo must succeed");
        assert!(sub.join("x.txt").exists());
    }

    #[test]
    fn case_only_rename_hops_through_temp_name() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join("photo.jpg"), b"p").expect("write file");

        let mut plan = plan_of(vec![renamed(root, "photo.jpg", "Photo.jpg", false)]);
        apply_plan(&mut plan, &ApplyOptions::default()).expect("apply must succeed");

        let names: Vec<String> = fs::read_dir(root)
            .expect("read dir")
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["Photo.jpg"]);
    }

    #[test]
    fn per_entry_failures_are_collected() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join("a.txt"), b"a").expect("write file");

        let mut plan = RenamePlan {
            changes: vec![
                renamed(root, "missing.txt", "m.txt", false),
                renamed(root, "a.txt", "b.txt", false),
            ],
            conflicts: BTreeMap::new(),
            stats: RenameStats::default(),
        };
        let result = apply_plan(&mut plan, &ApplyOptions::default()).expect("apply runs");
        assert_eq!(result.applied, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].source, root.join("missing.txt"));
        assert!(plan.changes[0].error.is_some());
        assert!(root.join("b.txt").exists());
    }

    #[test]
    fn failed_rename_does_not_let_chain_overwrite() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join("01"), b"one").expect("write file");
        fs::write(root.join("02"), b"two").expect("write file");
        fs::create_dir_all(root.join("00").join("inner")).expect("create dir");

        let mut plan = RenamePlan {
            changes: vec![
                renamed(root, "01", "00", false),
                renamed(root, "02", "01", false),
            ],
            conflicts: BTreeMap::new(),
            stats: RenameStats::default(),
        };
        let result = apply_plan(&mut plan, &ApplyOptions::default()).expect("apply runs");
        assert_eq!(result.applied, 0);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[1].message.contains("target exists"));
        assert_eq!(fs::read(root.join("01")).expect("read"), b"one");
        assert_eq!(fs::read(root.join("02")).expect("read"), b"two");
    }

    #[test]
    fn plans_with_conflicts_are_refused() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join("a.txt"), b"a").expect("write file");

        let mut conflicts = BTreeMap::new();
        conflicts.insert(
            ConflictKind::PathExists,
            vec![Conflict {
                kind: ConflictKind::PathExists,
                target_path: root.join("b.txt"),
                cause: "target already exists on disk".to_string(),
                sources: vec![root.join("a.txt")],
            }],
        );
        let mut plan = RenamePlan {
            changes: vec![renamed(root, "a.txt", "b.txt", false)],
            conflicts,
            stats: RenameStats::default(),
        };
        let err = apply_plan(&mut plan, &ApplyOptions::default()).expect_err("must refuse");
        assert!(err.to_string().contains("unresolved conflicts"));
        assert!(root.join("a.txt").exists());
    }

    #[test]
    fn undo_without_record_fails() {
        let temp = tempdir().expect("tempdir");
        let err = undo(&temp.path().join("none.json"), &UndoOptions::default())
            .expect_err("must fail");
        assert!(err.to_string().contains("nothing to undo"));
    }
}
