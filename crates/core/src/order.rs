use crate::change::{split_extension, Change, SortCriterion};
use crate::index::IndexSequencer;
use crate::metadata::{MetadataProvider, TimeAttr};
use crate::template::{extract, render, RenderContext};
use crate::transform::parse_date;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Default,
    Natural,
    Size,
    Mtime,
    Atime,
    Ctime,
    Btime,
    TimeVar,
    IntVar,
    StringVar,
}

impl SortMode {
    fn uses_variable(self) -> bool {
        matches!(self, SortMode::TimeVar | SortMode::IntVar | SortMode::StringVar)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOptions {
    pub mode: SortMode,
    pub reverse: bool,
    pub sort_var: Option<String>,
    pub per_dir: bool,
}

pub fn sort_changes(
    changes: &mut [Change],
    options: &SortOptions,
    provider: &dyn MetadataProvider,
) -> Result<()> {
    fill_sort_criteria(changes, options, provider)?;

    let mode = options.mode;
    changes.sort_by(|a, b| {
        let group = if options.per_dir {
            a.base_dir.cmp(&b.base_dir)
        } else {
            Ordering::Equal
        };
        group.then_with(|| {
            let ordering = compare_by_mode(a, b, mode);
            if options.reverse {
                ordering.reverse()
            } else {
                ordering
            }
        })
    });
    Ok(())
}

fn fill_sort_criteria(
    changes: &mut [Change],
    options: &SortOptions,
    provider: &dyn MetadataProvider,
) -> Result<()> {
    let mode = options.mode;
    if mode.uses_variable() {
        let Some(raw) = options.sort_var.as_deref() else {
            bail!("sort mode {:?} requires a sort variable", mode);
        };
        let template =
            extract(raw).with_context(|| format!("invalid sort variable: {raw}"))?;
        for change in changes.iter_mut() {
            let mut sequencer = IndexSequencer::new(template.index_occurrences());
            let ctx = RenderContext {
                change,
                input_name: &change.source_name,
                match_text: &change.source_name,
                captures: None,
                provider,
            };
            let rendered = render(&template, &ctx, &mut sequencer).with_context(|| {
                format!("failed to render sort variable for {}", change.source_path().display())
            })?;
            change.sort_criterion = match mode {
                SortMode::TimeVar => parse_date(&rendered).map(SortCriterion::Time),
                SortMode::IntVar => rendered.trim().parse().ok().map(SortCriterion::Int),
                _ => Some(SortCriterion::Text(rendered)),
            };
        }
        return Ok(());
    }

    let attr = match mode {
        SortMode::Mtime => Some(TimeAttr::Modified),
        SortMode::Atime => Some(TimeAttr::Accessed),
        SortMode::Ctime => Some(TimeAttr::Changed),
        SortMode::Btime => Some(TimeAttr::Birth),
        _ => None,
    };
    for change in changes.iter_mut() {
        let path = change.source_path();
        change.sort_criterion = match (mode, attr) {
            (SortMode::Size, _) => provider
                .file_size(&path)
                .map(|size| SortCriterion::Int(i64::try_from(size).unwrap_or(i64::MAX))),
            (_, Some(attr)) => provider.file_time(&path, attr).map(SortCriterion::Time),
            _ => None,
        };
    }
    Ok(())
}

fn compare_by_mode(a: &Change, b: &Change, mode: SortMode) -> Ordering {
    match mode {
        SortMode::Default => a.source_path().cmp(&b.source_path()),
        SortMode::Natural => natural_cmp(&a.source_name, &b.source_name)
            .then_with(|| a.source_path().cmp(&b.source_path())),
        _ => a
            .sort_criterion
            .cmp(&b.sort_criterion)
            .then_with(|| a.source_path().cmp(&b.source_path())),
    }
}

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let l_trim = l_run.trim_start_matches('0');
                let r_trim = r_run.trim_start_matches('0');
                let ordering = l_trim
                    .len()
                    .cmp(&r_trim.len())
                    .then_with(|| l_trim.cmp(r_trim));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                let ordering = l.to_lowercase().cmp(r.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(ch) = chars.peek().copied().filter(char::is_ascii_digit) {
        run.push(ch);
        chars.next();
    }
    run
}

pub fn hierarchical_order(changes: &mut [Change]) {
    changes.sort_by_key(|change| change.source_path());
}

pub fn group_by_dir(changes: &mut [Change]) {
    changes.sort_by(|a, b| a.base_dir.cmp(&b.base_dir));
}

pub fn assign_positions(changes: &mut [Change], reset_per_dir: bool) {
    let mut position = 0usize;
    let mut current_dir: Option<PathBuf> = None;
    for change in changes.iter_mut() {
        if change.primary_pair.is_some() {
            continue;
        }
        if reset_per_dir && current_dir.as_ref() != Some(&change.base_dir) {
            position = 0;
            current_dir = Some(change.base_dir.clone());
        }
        change.position = position;
        position += 1;
    }
}

/// Orders a batch so that no rename invalidates a path used later.
///
/// Forward: files first in their current order, then directories deepest
/// first. Undo: directories shallowest first, then files.
pub fn files_before_dirs(changes: &mut Vec<Change>, for_undo: bool) {
    let (mut dirs, files): (Vec<Change>, Vec<Change>) =
        changes.drain(..).partition(|change| change.is_dir);
    if for_undo {
        dirs.sort_by_key(|change| change.path_depth());
        changes.extend(dirs);
        changes.extend(files);
    } else {
        dirs.sort_by_key(|change| std::cmp::Reverse(change.path_depth()));
        changes.extend(files);
        changes.extend(dirs);
    }
}

pub fn pairs(changes: &mut [Change], extension_priority: &[String]) -> usize {
    let priority: Vec<String> = extension_priority
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let rank = |name: &str| {
        let ext = split_extension(name).1.trim_start_matches('.').to_ascii_lowercase();
        priority.iter().position(|p| *p == ext).unwrap_or(usize::MAX)
    };

    let mut groups: HashMap<(PathBuf, String), Vec<usize>> = HashMap::new();
    let mut group_order = Vec::new();
    for (idx, change) in changes.iter().enumerate() {
        if change.is_dir {
            continue;
        }
        let key = (
            change.base_dir.clone(),
            split_extension(&change.source_name).0.to_string(),
        );
        let members = groups.entry(key.clone()).or_default();
        if members.is_empty() {
            group_order.push(key);
        }
        members.push(idx);
    }

    let mut secondaries = 0usize;
    for key in group_order {
        let members = &groups[&key];
        if members.len() < 2 {
            continue;
        }
        let Some(&primary) = members
            .iter()
            .min_by_key(|idx| rank(&changes[**idx].source_name))
        else {
            continue;
        };
        let primary_id = changes[primary].id;
        for &idx in members {
            changes[idx].primary_pair = (idx != primary).then_some(primary_id);
            if idx != primary {
                secondaries += 1;
            }
        }
    }
    secondaries
}

pub fn apply_pair_targets(changes: &mut [Change]) {
    let primaries: HashMap<usize, (PathBuf, String)> = changes
        .iter()
        .filter(|change| change.primary_pair.is_none())
        .map(|change| {
            (
                change.id,
                (
                    change.target_dir.clone(),
                    split_extension(&change.target_name).0.to_string(),
                ),
            )
        })
        .collect();

    for change in changes.iter_mut() {
        let Some(primary_id) = change.primary_pair else {
            continue;
        };
        let Some((dir, stem)) = primaries.get(&primary_id) else {
            continue;
        };
        let ext = split_extension(&change.source_name).1;
        change.target_dir = dir.clone();
        change.target_name = format!("{stem}{ext}");
    }
}
