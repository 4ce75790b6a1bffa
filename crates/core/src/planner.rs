use crate::change::{Change, ChangeStatus, Conflict, ConflictKind};
use crate::discovery::{discover, DiscoveryOptions};
use crate::metadata::{FsMetadata, HashAlgorithm, MetadataProvider};
use crate::order::files_before_dirs;
use crate::replace::{self, ReplaceOptions};
use crate::template::extract;
use crate::validate::{validate, ValidateOptions};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub discovery: DiscoveryOptions,
    pub replace: ReplaceOptions,
    pub validate: ValidateOptions,
    pub csv_rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RenameStats {
    pub scanned: usize,
    pub matched: usize,
    pub planned: usize,
    pub unchanged: usize,
    pub ignored: usize,
    pub fixed: usize,
    pub conflicts: usize,
    pub passes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePlan {
    pub changes: Vec<Change>,
    pub conflicts: BTreeMap<ConflictKind, Vec<Conflict>>,
    pub stats: RenameStats,
}

impl RenamePlan {
    pub fn has_conflicts(&self) -> bool {
        self.conflicts.values().any(|list| !list.is_empty())
    }

    pub fn pending(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(|change| {
            matches!(change.status, ChangeStatus::Ok | ChangeStatus::Overwriting)
        })
    }
}

pub fn generate_plan(options: &PlanOptions) -> Result<RenamePlan> {
    let (changes, discovery_stats) = discover(&options.discovery)?;
    info!("discovered {} entries", changes.len());

    let provider = FsMetadata::new();
    let algorithms = hash_algorithms(&options.replace)?;
    if !algorithms.is_empty() {
        let paths: Vec<PathBuf> = changes.iter().map(Change::source_path).collect();
        provider.prefetch_hashes(&paths, &algorithms);
    }

    let mut plan = plan_changes(changes, options, &provider)?;
    plan.stats.scanned = discovery_stats.scanned;
    Ok(plan)
}

pub fn plan_changes(
    mut changes: Vec<Change>,
    options: &PlanOptions,
    provider: &dyn MetadataProvider,
) -> Result<RenamePlan> {
    assign_csv_rows(&mut changes, &options.csv_rows);
    let scanned = changes.len();

    let mut changes = replace::apply(changes, &options.replace, provider)?;
    let matched = changes.len();
    files_before_dirs(&mut changes, false);

    let report = validate(&mut changes, &options.validate).context("conflict validation failed")?;
    let count = |status: ChangeStatus| changes.iter().filter(|c| c.status == status).count();
    let stats = RenameStats {
        scanned,
        matched,
        planned: changes
            .iter()
            .filter(|c| matches!(c.status, ChangeStatus::Ok | ChangeStatus::Overwriting))
            .count(),
        unchanged: count(ChangeStatus::Unchanged),
        ignored: count(ChangeStatus::Ignored),
        fixed: report.fixed,
        conflicts: report.conflict_count(),
        passes: report.passes,
    };
    info!(
        "planned {} renames ({} unchanged, {} conflicts, {} auto-fixed)",
        stats.planned, stats.unchanged, stats.conflicts, stats.fixed
    );

    Ok(RenamePlan {
        changes,
        conflicts: report.conflicts,
        stats,
    })
}

fn hash_algorithms(options: &ReplaceOptions) -> Result<Vec<HashAlgorithm>> {
    let mut algorithms = Vec::new();
    for stage in &options.stages {
        let template = extract(&stage.replacement)
            .with_context(|| format!("invalid replacement: {}", stage.replacement))?;
        algorithms.extend(template.hash_algorithms());
    }
    algorithms.sort();
    algorithms.dedup();
    Ok(algorithms)
}

/// Hands CSV rows to entries.
///
/// When the first column of every row names an entry of the batch, by full
/// source path or by file name, rows go to the entry they name. Otherwise row
/// `n` goes to the n-th discovered entry.
pub fn assign_csv_rows(changes: &mut [Change], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for (idx, change) in changes.iter().enumerate() {
        by_key
            .entry(change.source_path().to_string_lossy().to_string())
            .or_insert(idx);
        by_key.entry(change.source_name.clone()).or_insert(idx);
    }
    let keyed: Option<Vec<usize>> = rows
        .iter()
        .map(|row| row.first().and_then(|key| by_key.get(key.trim()).copied()))
        .collect();

    match keyed {
        Some(targets) => {
            debug!("matching {} CSV rows by their first column", rows.len());
            for (row, idx) in rows.iter().zip(targets) {
                changes[idx].csv_row = row.clone();
            }
        }
        None => {
            for (change, row) in changes.iter_mut().zip(rows) {
                change.csv_row = row.clone();
            }
        }
    }
}

pub fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read CSV file: {}", path.display()))?;
    parse_csv(&raw).with_context(|| format!("malformed CSV file: {}", path.display()))
}

fn parse_csv(raw: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => row.push(std::mem::take(&mut field)),
            '\r' if !quoted && chars.peek() == Some(&'\n') => {}
            '\n' if !quoted => end_row(&mut rows, &mut row, &mut field),
            _ => field.push(ch),
        }
    }
    if quoted {
        bail!("unterminated quoted field");
    }
    end_row(&mut rows, &mut row, &mut field);
    Ok(rows)
}

fn end_row(rows: &mut Vec<Vec<String>>, row: &mut Vec<String>, field: &mut String) {
    row.push(std::mem::take(field));
    let row = std::mem::take(row);
    if !(row.len() == 1 && row[0].trim().is_empty()) {
        rows.push(row);
    }
}
