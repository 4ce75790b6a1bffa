use crate::change::{file_name_of, Change};
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryOptions {
    pub paths: Vec<PathBuf>,
    pub recursive: bool,
    pub max_depth: Option<usize>,
    pub include_hidden: bool,
    pub include_dirs: bool,
    pub only_dirs: bool,
    pub exclude: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub scanned: usize,
    pub skipped_hidden: usize,
    pub skipped_excluded: usize,
    pub skipped_kind: usize,
}

pub fn discover(options: &DiscoveryOptions) -> Result<(Vec<Change>, DiscoveryStats)> {
    if options.paths.is_empty() {
        bail!("no input paths given");
    }
    let exclude = options
        .exclude
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid exclude pattern")?;
    let mut stats = DiscoveryStats::default();
    let mut out = Vec::new();

    for input in &options.paths {
        let meta = std::fs::metadata(input)
            .with_context(|| format!("input path does not exist: {}", input.display()))?;
        if !meta.is_dir() {
            push_entry(input, false, options, exclude.as_ref(), &mut stats, &mut out);
            continue;
        }

        let max_depth = if options.recursive {
            options.max_depth.map_or(usize::MAX, |depth| depth.saturating_add(1))
        } else {
            1
        };
        let walker = WalkDir::new(input)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || options.include_hidden || !is_hidden(entry.path())
            });
        for entry in walker {
            let entry = entry
                .with_context(|| format!("failed to walk directory: {}", input.display()))?;
            let is_dir = entry.file_type().is_dir();
            push_entry(entry.path(), is_dir, options, exclude.as_ref(), &mut stats, &mut out);
        }
    }

    for (id, change) in out.iter_mut().enumerate() {
        change.id = id;
    }
    Ok((out, stats))
}

fn push_entry(
    path: &Path,
    is_dir: bool,
    options: &DiscoveryOptions,
    exclude: Option<&Regex>,
    stats: &mut DiscoveryStats,
    out: &mut Vec<Change>,
) {
    stats.scanned += 1;
    let name = file_name_of(path);
    if is_hidden(path) && !options.include_hidden {
        stats.skipped_hidden += 1;
        return;
    }
    if exclude.is_some_and(|re| re.is_match(&name)) {
        stats.skipped_excluded += 1;
        return;
    }
    let wanted = if options.only_dirs {
        is_dir
    } else {
        !is_dir || options.include_dirs
    };
    if !wanted {
        stats.skipped_kind += 1;
        return;
    }

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    out.push(Change::new(out.len(), base_dir, name, is_dir));
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
