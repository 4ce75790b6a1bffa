use crate::change::{
    split_extension, split_last_segment, Change, ChangeStatus, Conflict, ConflictKind,
};
use crate::sanitize::{
    forbidden_chars, has_trailing_period, longest_segment_exceeds, strip_forbidden,
    strip_trailing_periods, truncate_filename_if_needed, truncate_to_limit, Platform,
};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_FIX_PATTERN: &str = "(%d)";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidateError {
    #[error("conflicts did not settle after {passes} validation passes")]
    UnresolvedCycle { passes: usize },
    #[error("invalid conflict fix pattern `{0}`: it must contain %d")]
    InvalidPattern(String),
}

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub auto_fix: bool,
    pub allow_overwrites: bool,
    pub fix_conflicts_pattern: String,
    pub platform: Platform,
    pub case_insensitive_fs: bool,
    pub undo_mode: bool,
    pub max_passes: Option<usize>,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        let platform = Platform::current();
        Self {
            auto_fix: false,
            allow_overwrites: false,
            fix_conflicts_pattern: DEFAULT_FIX_PATTERN.to_string(),
            platform,
            case_insensitive_fs: platform.case_insensitive_by_default(),
            undo_mode: false,
            max_passes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub conflicts: BTreeMap<ConflictKind, Vec<Conflict>>,
    pub fixed: usize,
    pub passes: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.values().all(Vec::is_empty)
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.values().map(Vec::len).sum()
    }
}

pub fn default_max_passes(len: usize) -> usize {
    len.saturating_mul(len).saturating_add(16)
}

#[derive(Debug, Clone)]
pub struct ConflictNamer {
    prefix: String,
    suffix: String,
    numbered: Regex,
    platform: Platform,
}

impl ConflictNamer {
    pub fn new(pattern: &str) -> Result<Self, ValidateError> {
        let Some((prefix, suffix)) = pattern.split_once("%d") else {
            return Err(ValidateError::InvalidPattern(pattern.to_string()));
        };
        let numbered = Regex::new(&format!(
            r"^(?P<base>.*?){}(?P<n>\d+){}$",
            regex::escape(prefix),
            regex::escape(suffix)
        ))
        .map_err(|_| ValidateError::InvalidPattern(pattern.to_string()))?;
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            numbered,
            platform: Platform::current(),
        })
    }

    pub fn for_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Next candidate for `name`: an existing counter is incremented,
    /// otherwise counter 1 is appended to the stem. The stem is shortened
    /// when the counter would push the name past the length limit.
    pub fn next(&self, name: &str, is_dir: bool) -> String {
        let (dirs, last) = split_last_segment(name);
        let (stem, ext) = if is_dir {
            (last, "")
        } else {
            split_extension(last)
        };

        let numbered = self.numbered.captures(stem).and_then(|caps| {
            let base = caps.name("base")?.as_str();
            let n = caps.name("n")?.as_str().parse::<u64>().ok()?;
            Some((base.to_string(), n.saturating_add(1)))
        });
        let (base, n) = numbered.unwrap_or_else(|| (stem.to_string(), 1));
        let tail = format!("{}{n}{}{ext}", self.prefix, self.suffix);
        let base = truncate_filename_if_needed(&base, &tail, self.platform);
        format!("{dirs}{base}{tail}")
    }
}

pub fn propose_next(name: &str, is_dir: bool, pattern: &str) -> Result<String, ValidateError> {
    Ok(ConflictNamer::new(pattern)?.next(name, is_dir))
}

enum Visit {
    Clean,
    Fixed,
    Restart,
    Detected(Conflict),
}

enum PassEnd {
    Settled,
    Restart,
    Stuck,
}

type Check = fn(&Context<'_>, usize) -> Option<Conflict>;

const CHECKS: [Check; 8] = [
    check_empty,
    check_trailing_period,
    check_length,
    check_forbidden,
    check_path_exists,
    check_overwriting_new_path,
    check_source_not_found,
    check_source_already_renamed,
];

struct Context<'a> {
    changes: &'a mut Vec<Change>,
    seen: HashMap<PathBuf, usize>,
    sources: HashMap<PathBuf, usize>,
    conflicts: BTreeMap<ConflictKind, Vec<Conflict>>,
    options: &'a ValidateOptions,
    namer: ConflictNamer,
}

/// Validates `changes` in place, repairing them when auto-fix is enabled.
///
/// The entries may be reordered. Conflicts left in the report belong to the
/// final pass.
pub fn validate(
    changes: &mut Vec<Change>,
    options: &ValidateOptions,
) -> Result<ValidationReport, ValidateError> {
    let namer = ConflictNamer::new(&options.fix_conflicts_pattern)?.for_platform(options.platform);
    let max_passes = options
        .max_passes
        .unwrap_or_else(|| default_max_passes(changes.len()));

    let mut ctx = Context {
        changes,
        seen: HashMap::new(),
        sources: HashMap::new(),
        conflicts: BTreeMap::new(),
        options,
        namer,
    };

    let mut fixed = 0usize;
    let mut passes = 0usize;
    loop {
        if passes >= max_passes {
            return Err(ValidateError::UnresolvedCycle { passes });
        }
        passes += 1;
        ctx.begin_pass();
        match ctx.run_pass(&mut fixed, max_passes) {
            PassEnd::Settled => break,
            PassEnd::Restart => debug!("restarting validation pass {}", passes),
            PassEnd::Stuck => return Err(ValidateError::UnresolvedCycle { passes }),
        }
    }

    debug!("validation settled after {} passes, {} repairs", passes, fixed);
    Ok(ValidationReport {
        conflicts: ctx.conflicts,
        fixed,
        passes,
    })
}

impl Context<'_> {
    fn key(&self, path: &Path) -> PathBuf {
        if self.options.case_insensitive_fs {
            PathBuf::from(path.to_string_lossy().to_lowercase())
        } else {
            path.to_path_buf()
        }
    }

    fn begin_pass(&mut self) {
        self.seen.clear();
        self.conflicts.clear();
        let sources: HashMap<PathBuf, usize> = self
            .changes
            .iter()
            .enumerate()
            .filter(|(_, change)| change.is_moving())
            .map(|(idx, change)| (self.key(&change.source_path()), idx))
            .collect();
        self.sources = sources;
    }

    fn run_pass(&mut self, fixed: &mut usize, max_repairs: usize) -> PassEnd {
        let mut i = 0usize;
        let mut repairs = 0usize;
        while i < self.changes.len() {
            match self.visit(i) {
                Visit::Clean => {
                    self.register(i);
                    i += 1;
                    repairs = 0;
                }
                Visit::Fixed => {
                    *fixed += 1;
                    repairs += 1;
                    if repairs > max_repairs {
                        debug!(
                            "{} still conflicts after {} repairs",
                            self.changes[i].source_name, repairs
                        );
                        return PassEnd::Stuck;
                    }
                }
                Visit::Restart => {
                    *fixed += 1;
                    return PassEnd::Restart;
                }
                Visit::Detected(conflict) => {
                    self.changes[i].status = conflict.kind.status();
                    self.record(conflict);
                    self.register(i);
                    i += 1;
                    repairs = 0;
                }
            }
        }
        PassEnd::Settled
    }

    fn register(&mut self, i: usize) {
        if self.changes[i].status == ChangeStatus::Ignored {
            return;
        }
        let key = self.key(&self.changes[i].target_path());
        self.seen.entry(key).or_insert(i);
    }

    fn record(&mut self, conflict: Conflict) {
        self.conflicts
            .entry(conflict.kind)
            .or_default()
            .push(conflict);
    }

    fn visit(&mut self, i: usize) -> Visit {
        let change = &self.changes[i];
        if change.status == ChangeStatus::Ignored {
            return Visit::Clean;
        }
        if change.is_unchanged() {
            return self.visit_unchanged(i);
        }

        self.changes[i].status = ChangeStatus::Ok;
        self.changes[i].will_overwrite = false;

        for check in CHECKS {
            let Some(conflict) = check(self, i) else {
                continue;
            };
            if !self.options.auto_fix {
                return Visit::Detected(conflict);
            }
            return self.repair(i, conflict);
        }

        if self.options.allow_overwrites && self.blocking_occupant(i) {
            self.changes[i].will_overwrite = true;
            self.changes[i].status = ChangeStatus::Overwriting;
        }
        Visit::Clean
    }

    fn visit_unchanged(&mut self, i: usize) -> Visit {
        self.changes[i].status = ChangeStatus::Unchanged;
        let key = self.key(&self.changes[i].source_path());
        let Some(&j) = self.seen.get(&key).filter(|j| **j != i) else {
            return Visit::Clean;
        };

        if self.options.auto_fix {
            let next = self
                .namer
                .next(&self.changes[j].target_name, self.changes[j].is_dir);
            debug!(
                "{} collides with unchanged {}, moving to {}",
                self.changes[j].source_name, self.changes[i].source_name, next
            );
            self.changes[j].target_name = next;
            return Visit::Restart;
        }

        let conflict = self.conflict(
            j,
            ConflictKind::PathExists,
            format!("{} stays in place", self.changes[i].source_path().display()),
            Some(i),
        );
        self.changes[j].status = ChangeStatus::PathExists;
        self.record(conflict);
        Visit::Clean
    }

    fn repair(&mut self, i: usize, conflict: Conflict) -> Visit {
        let platform = self.options.platform;
        let change = &self.changes[i];
        let before = change.target_name.clone();
        let after = match conflict.kind {
            ConflictKind::EmptyFilename => {
                self.revert_to_source(i);
                return Visit::Fixed;
            }
            ConflictKind::SourceNotFound => {
                debug!("ignoring {}: source not found", change.source_name);
                self.changes[i].status = ChangeStatus::Ignored;
                self.forget_source(i);
                return Visit::Fixed;
            }
            ConflictKind::SourceAlreadyRenamed => return self.reorder(i),
            ConflictKind::TrailingPeriod => strip_trailing_periods(&before),
            ConflictKind::FilenameLengthExceeded => {
                truncate_to_limit(&before, change.is_dir, platform)
            }
            ConflictKind::ForbiddenCharacters => strip_forbidden(&before, platform),
            ConflictKind::PathExists | ConflictKind::OverwritingNewPath => {
                self.namer.next(&before, change.is_dir)
            }
        };

        if after == before {
            self.revert_to_source(i);
        } else {
            debug!("{} ({}): {} -> {}", conflict.kind, change.source_name, before, after);
            self.changes[i].target_name = after;
        }
        Visit::Fixed
    }

    fn revert_to_source(&mut self, i: usize) {
        let change = &mut self.changes[i];
        debug!("reverting {} to its source name", change.source_name);
        change.target_name = change.source_name.clone();
        change.target_dir = change.base_dir.clone();
        change.status = ChangeStatus::Unchanged;
        self.forget_source(i);
    }

    fn forget_source(&mut self, i: usize) {
        let key = self.key(&self.changes[i].source_path());
        if self.sources.get(&key) == Some(&i) {
            self.sources.remove(&key);
        }
    }

    fn reorder(&mut self, i: usize) -> Visit {
        let key = self.key(&self.changes[i].source_path());
        let Some(&j) = self.seen.get(&key) else {
            return Visit::Fixed;
        };

        if self.forms_cycle(i, j) {
            let next = self
                .namer
                .next(&self.changes[i].target_name, self.changes[i].is_dir);
            debug!(
                "breaking rename cycle at {}: target becomes {}",
                self.changes[i].source_name, next
            );
            self.changes[i].target_name = next;
            return Visit::Fixed;
        }

        debug!(
            "moving {} ahead of {}",
            self.changes[i].source_name, self.changes[j].source_name
        );
        self.changes.swap(i, j);
        Visit::Restart
    }

    fn forms_cycle(&self, i: usize, j: usize) -> bool {
        let mut cursor = self.changes[i].target_path();
        for _ in 0..self.changes.len() {
            match self.sources.get(&self.key(&cursor)) {
                Some(&k) if k == j => return true,
                Some(&k) if k != i => cursor = self.changes[k].target_path(),
                _ => return false,
            }
        }
        false
    }

    fn blocking_occupant(&self, i: usize) -> bool {
        let change = &self.changes[i];
        let target = change.target_path();
        if !exists_on_disk(&target) {
            return false;
        }
        let target_key = self.key(&target);
        if target_key == self.key(&change.source_path()) {
            return false;
        }
        // An earlier occupant is gone by then; a later one is reported at
        // its own visit as source_already_renamed.
        !matches!(self.sources.get(&target_key), Some(&k) if k != i)
    }

    fn conflict(&self, i: usize, kind: ConflictKind, cause: String, other: Option<usize>) -> Conflict {
        let change = &self.changes[i];
        let mut sources = vec![change.source_path()];
        if let Some(other) = other {
            sources.push(self.changes[other].source_path());
        }
        Conflict {
            kind,
            target_path: change.target_path(),
            cause,
            sources,
        }
    }
}

fn exists_on_disk(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn check_empty(ctx: &Context<'_>, i: usize) -> Option<Conflict> {
    let (_, last) = split_last_segment(&ctx.changes[i].target_name);
    last.is_empty().then(|| {
        ctx.conflict(i, ConflictKind::EmptyFilename, "target name is empty".to_string(), None)
    })
}

fn check_trailing_period(ctx: &Context<'_>, i: usize) -> Option<Conflict> {
    let name = &ctx.changes[i].target_name;
    (ctx.options.platform == Platform::Windows && has_trailing_period(name)).then(|| {
        ctx.conflict(
            i,
            ConflictKind::TrailingPeriod,
            "a path segment ends with a period".to_string(),
            None,
        )
    })
}

fn check_length(ctx: &Context<'_>, i: usize) -> Option<Conflict> {
    let name = &ctx.changes[i].target_name;
    longest_segment_exceeds(name, ctx.options.platform).then(|| {
        ctx.conflict(
            i,
            ConflictKind::FilenameLengthExceeded,
            "a path segment exceeds the platform limit".to_string(),
            None,
        )
    })
}

fn check_forbidden(ctx: &Context<'_>, i: usize) -> Option<Conflict> {
    let found = forbidden_chars(&ctx.changes[i].target_name, ctx.options.platform);
    (!found.is_empty()).then(|| {
        ctx.conflict(
            i,
            ConflictKind::ForbiddenCharacters,
            format!("contains {found:?}"),
            None,
        )
    })
}

fn check_path_exists(ctx: &Context<'_>, i: usize) -> Option<Conflict> {
    (!ctx.options.allow_overwrites && ctx.blocking_occupant(i)).then(|| {
        ctx.conflict(
            i,
            ConflictKind::PathExists,
            "target already exists on disk".to_string(),
            None,
        )
    })
}

fn check_overwriting_new_path(ctx: &Context<'_>, i: usize) -> Option<Conflict> {
    let key = ctx.key(&ctx.changes[i].target_path());
    let j = *ctx.seen.get(&key)?;
    (j != i).then(|| {
        ctx.conflict(
            i,
            ConflictKind::OverwritingNewPath,
            format!("also the target of {}", ctx.changes[j].source_path().display()),
            Some(j),
        )
    })
}

fn check_source_not_found(ctx: &Context<'_>, i: usize) -> Option<Conflict> {
    if !ctx.options.undo_mode {
        return None;
    }
    let source = ctx.changes[i].source_path();
    if exists_on_disk(&source) {
        return None;
    }
    // A directory restored earlier in the batch brings its contents back.
    let source_key = ctx.key(&source);
    let restored_by_parent = ctx
        .seen
        .iter()
        .any(|(key, &j)| j < i && ctx.changes[j].is_dir && source_key.starts_with(key));
    (!restored_by_parent).then(|| {
        ctx.conflict(
            i,
            ConflictKind::SourceNotFound,
            "source no longer exists".to_string(),
            None,
        )
    })
}

fn check_source_already_renamed(ctx: &Context<'_>, i: usize) -> Option<Conflict> {
    let key = ctx.key(&ctx.changes[i].source_path());
    let j = *ctx.seen.get(&key)?;
    (j < i && ctx.changes[j].is_moving()).then(|| {
        ctx.conflict(
            i,
            ConflictKind::SourceAlreadyRenamed,
            format!(
                "{} is renamed onto this source first",
                ctx.changes[j].source_path().display()
            ),
            Some(j),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn fixture(files: &[&str]) -> TempDir {
        let temp = tempdir().expect("tempdir");
        for name in files {
            fs::write(temp.path().join(name), name.as_bytes()).expect("write file");
        }
        temp
    }

    fn rename(id: usize, dir: &Path, from: &str, to: &str) -> Change {
        let mut change = Change::new(id, dir, from, false);
        change.target_name = to.to_string();
        change.status = ChangeStatus::Ok;
        change
    }

    fn options(auto_fix: bool) -> ValidateOptions {
        ValidateOptions {
            auto_fix,
            platform: Platform::Unix,
            case_insensitive_fs: false,
            ..ValidateOptions::default()
        }
    }

    fn plan(changes: &[Change]) -> Vec<(String, String)> {
        changes
            .iter()
            .map(|c| (c.source_name.clone(), c.target_name.clone()))
            .collect()
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn propose_next_appends_or_increments() {
        assert_eq!(propose_next("c.txt", false, "(%d)").expect("valid"), "c(1).txt");
        assert_eq!(propose_next("c(1).txt", false, "(%d)").expect("valid"), "c(2).txt");
        assert_eq!(propose_next("sub/a.b", true, "_%d").expect("valid"), "sub/a.b_1");
        assert_eq!(
            propose_next("c.txt", false, "(n)"),
            Err(ValidateError::InvalidPattern("(n)".to_string()))
        );
    }

    #[test]
    fn duplicate_targets_are_reported_then_fixed() {
        let temp = fixture(&["a.txt", "b.txt"]);
        let dir = temp.path();
        let batch = vec![rename(0, dir, "a.txt", "c.txt"), rename(1, dir, "b.txt", "c.txt")];

        let mut reported = batch.clone();
        let report = validate(&mut reported, &options(false)).expect("validation runs");
        assert_eq!(report.conflict_count(), 1);
        assert_eq!(reported[1].status, ChangeStatus::OverwritingNewPath);
        assert_eq!(
            report.conflicts[&ConflictKind::OverwritingNewPath][0].sources.len(),
            2
        );

        let mut fixed = batch;
        let report = validate(&mut fixed, &options(true)).expect("validation runs");
        assert!(report.is_clean());
        assert_eq!(report.fixed, 1);
        assert_eq!(
            plan(&fixed),
            pairs(&[("a.txt", "c.txt"), ("b.txt", "c(1).txt")])
        );
    }

    #[test]
    fn autofix_is_idempotent() {
        let temp = fixture(&["a.txt", "b.txt", "c.txt"]);
        let dir = temp.path();
        let mut changes = vec![
            rename(0, dir, "a.txt", "c.txt"),
            rename(1, dir, "b.txt", "c.txt"),
        ];
        validate(&mut changes, &options(true)).expect("validation runs");
        let first = plan(&changes);

        let report = validate(&mut changes, &options(true)).expect("validation runs");
        assert_eq!(report.fixed, 0);
        assert_eq!(report.passes, 1);
        assert_eq!(plan(&changes), first);
    }

    #[test]
    fn targets_are_unique_after_autofix() {
        let temp = fixture(&["1", "2", "3", "4", "taken"]);
        let dir = temp.path();
        let mut changes: Vec<Change> = ["1", "2", "3", "4"]
            .iter()
            .enumerate()
            .map(|(id, name)| rename(id, dir, name, "taken"))
            .collect();
        let report = validate(&mut changes, &options(true)).expect("validation runs");
        assert!(report.is_clean());

        let mut targets: Vec<PathBuf> = changes.iter().map(Change::target_path).collect();
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), 4);
        assert!(!targets.contains(&dir.join("taken")));
    }

    #[test]
    fn shifting_chain_is_reordered() {
        let temp = fixture(&["01", "02", "03"]);
        let dir = temp.path();
        let mut changes = vec![
            rename(0, dir, "03", "02"),
            rename(1, dir, "02", "01"),
            rename(2, dir, "01", "00"),
        ];

        let mut reported = changes.clone();
        let report = validate(&mut reported, &options(false)).expect("validation runs");
        assert!(report.conflicts.contains_key(&ConflictKind::SourceAlreadyRenamed));

        let report = validate(&mut changes, &options(true)).expect("validation runs");
        assert!(report.is_clean());
        assert_eq!(
            plan(&changes),
            pairs(&[("01", "00"), ("02", "01"), ("03", "02")])
        );
    }

    #[test]
    fn swap_cycle_is_broken_with_free_name() {
        let temp = fixture(&["a", "b"]);
        let dir = temp.path();
        let mut changes = vec![rename(0, dir, "a", "b"), rename(1, dir, "b", "a")];
        let report = validate(&mut changes, &options(true)).expect("validation runs");
        assert!(report.is_clean());
        assert_eq!(plan(&changes), pairs(&[("b", "a(1)"), ("a", "b")]));
    }

    #[test]
    fn pass_bound_is_enforced() {
        let temp = fixture(&["01", "02", "03"]);
        let dir = temp.path();
        let mut changes = vec![
            rename(0, dir, "03", "02"),
            rename(1, dir, "02", "01"),
            rename(2, dir, "01", "00"),
        ];
        let bounded = ValidateOptions {
            max_passes: Some(1),
            ..options(true)
        };
        assert_eq!(
            validate(&mut changes, &bounded),
            Err(ValidateError::UnresolvedCycle { passes: 1 })
        );
    }

    #[test]
    fn name_at_length_limit_gets_a_fitting_counter() {
        let temp = fixture(&["a.txt", "b.txt"]);
        let dir = temp.path();
        let long = format!("{}.txt", "x".repeat(251));
        let mut changes = vec![rename(0, dir, "a.txt", &long), rename(1, dir, "b.txt", &long)];

        let report = validate(&mut changes, &options(true)).expect("validation runs");
        assert!(report.is_clean());
        assert_eq!(changes[0].target_name, long);
        assert_eq!(changes[1].target_name, format!("{}(1).txt", "x".repeat(248)));
        assert!(changes.iter().all(|c| c.target_name.len() <= 255));
    }

    #[test]
    fn endless_repairs_hit_the_bound() {
        let temp = fixture(&["a.txt", "b.txt", "c.txt"]);
        let dir = temp.path();
        let long = format!("{}.txt", "x".repeat(251));
        let mut changes = vec![
            rename(0, dir, "a.txt", &long),
            rename(1, dir, "b.txt", &long),
            rename(2, dir, "c.txt", &long),
        ];
        // The counter suffix alone is longer than a name may be, so truncation
        // keeps removing the counter the namer adds.
        let overlong_pattern = ValidateOptions {
            fix_conflicts_pattern: format!("%d{}", "y".repeat(300)),
            ..options(true)
        };
        let result = validate(&mut changes, &overlong_pattern);
        assert!(matches!(result, Err(ValidateError::UnresolvedCycle { .. })));
    }

    #[test]
    fn case_only_rename_depends_on_fs_case_sensitivity() {
        let temp = fixture(&["photo.jpg", "Photo.jpg"]);
        let dir = temp.path();
        let batch = vec![rename(0, dir, "photo.jpg", "Photo.jpg")];

        let mut insensitive = batch.clone();
        let options_insensitive = ValidateOptions {
            case_insensitive_fs: true,
            ..options(false)
        };
        let report = validate(&mut insensitive, &options_insensitive).expect("validation runs");
        assert!(report.is_clean());
        assert_eq!(insensitive[0].status, ChangeStatus::Ok);

        let mut sensitive = batch;
        let report = validate(&mut sensitive, &options(false)).expect("validation runs");
        assert!(!report.is_clean());
        assert_eq!(sensitive[0].status, ChangeStatus::PathExists);
    }

    #[test]
    fn existing_file_blocks_unless_overwrites_allowed() {
        let temp = fixture(&["a.txt", "x.txt"]);
        let dir = temp.path();
        let batch = vec![rename(0, dir, "a.txt", "x.txt")];

        let mut blocked = batch.clone();
        let report = validate(&mut blocked, &options(false)).expect("validation runs");
        assert_eq!(blocked[0].status, ChangeStatus::PathExists);
        assert_eq!(report.conflicts[&ConflictKind::PathExists].len(), 1);

        let mut fixed = batch.clone();
        validate(&mut fixed, &options(true)).expect("validation runs");
        assert_eq!(fixed[0].target_name, "x(1).txt");

        let mut overwrite = batch;
        let allow = ValidateOptions {
            allow_overwrites: true,
            ..options(false)
        };
        let report = validate(&mut overwrite, &allow).expect("validation runs");
        assert!(report.is_clean());
        assert_eq!(overwrite[0].status, ChangeStatus::Overwriting);
        assert!(overwrite[0].will_overwrite);
    }

    #[test]
    fn unchanged_occupant_pushes_earlier_claim_aside() {
        let temp = fixture(&["a.txt", "b.txt"]);
        let dir = temp.path();
        let mut changes = vec![
            rename(0, dir, "a.txt", "b.txt"),
            Change::new(1, dir, "b.txt", false),
        ];
        let report = validate(&mut changes, &options(true)).expect("validation runs");
        assert!(report.is_clean());
        assert_eq!(changes[0].target_name, "b(1).txt");
        assert_eq!(changes[1].status, ChangeStatus::Unchanged);
    }

    #[test]
    fn windows_name_repairs() {
        let temp = fixture(&["a.txt", "b.txt", "c.txt"]);
        let dir = temp.path();
        let mut changes = vec![
            rename(0, dir, "a.txt", "what?.txt."),
            rename(1, dir, "b.txt", ""),
            rename(2, dir, "c.txt", &format!("{}.txt", "x".repeat(300))),
        ];
        let windows = ValidateOptions {
            platform: Platform::Windows,
            ..options(true)
        };
        let report = validate(&mut changes, &windows).expect("validation runs");
        assert!(report.is_clean());
        assert_eq!(changes[0].target_name, "what.txt");
        assert_eq!(changes[1].target_name, "b.txt");
        assert_eq!(changes[1].status, ChangeStatus::Unchanged);
        assert_eq!(changes[2].target_name.encode_utf16().count(), 260);
        assert!(changes[2].target_name.ends_with(".txt"));
    }

    #[test]
    fn missing_source_is_ignored_in_undo_mode() {
        let temp = fixture(&["present"]);
        let dir = temp.path();
        let mut changes = vec![
            rename(0, dir, "present", "restored"),
            rename(1, dir, "gone", "other"),
        ];
        let undo = ValidateOptions {
            undo_mode: true,
            ..options(true)
        };
        let report = validate(&mut changes, &undo).expect("validation runs");
        assert!(report.is_clean());
        assert_eq!(changes[0].status, ChangeStatus::Ok);
        assert_eq!(changes[1].status, ChangeStatus::Ignored);
    }
}
