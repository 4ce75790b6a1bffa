use crate::change::{split_extension, Change, ChangeStatus};
use crate::filter::{FilterExpr, FilterScope};
use crate::grammar::TokenKind;
use crate::index::IndexSequencer;
use crate::metadata::MetadataProvider;
use crate::order::{
    apply_pair_targets, assign_positions, group_by_dir, hierarchical_order, pairs, sort_changes,
    SortOptions,
};
use crate::template::{extract, render, RenderContext, Template, TemplateError};
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub find: String,
    pub replacement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Stage {
    pub fn new(find: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replacement: replacement.into(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplaceOptions {
    pub stages: Vec<Stage>,
    pub ignore_case: bool,
    pub string_literal: bool,
    pub ignore_extension: bool,
    pub replace_limit: i64,
    pub sort: Option<SortOptions>,
    pub reset_index_per_dir: bool,
    pub target_dir: Option<PathBuf>,
    pub pair: bool,
    pub extension_priority: Vec<String>,
}

struct CompiledStage {
    find: Regex,
    template: Template,
    filter: Option<FilterExpr>,
}

pub fn compile_find(
    find: &str,
    ignore_case: bool,
    string_literal: bool,
) -> Result<Regex, TemplateError> {
    let body = if find.is_empty() {
        "^.*$".to_string()
    } else if string_literal {
        regex::escape(find)
    } else {
        find.to_string()
    };
    let pattern = if ignore_case {
        format!("(?i){body}")
    } else {
        body
    };
    Regex::new(&pattern).map_err(|err| TemplateError::InvalidPattern {
        pattern: find.to_string(),
        message: err.to_string(),
    })
}

fn compile_stages(options: &ReplaceOptions) -> Result<Vec<CompiledStage>> {
    options
        .stages
        .iter()
        .enumerate()
        .map(|(idx, stage)| {
            let find = compile_find(&stage.find, options.ignore_case, options.string_literal)
                .with_context(|| format!("stage {idx}: invalid find pattern"))?;
            let template = extract(&stage.replacement)
                .with_context(|| format!("stage {idx}: invalid replacement"))?;
            let filter = stage
                .filter
                .as_deref()
                .map(FilterExpr::parse)
                .transpose()
                .with_context(|| format!("stage {idx}: invalid filter"))?;
            Ok(CompiledStage {
                find,
                template,
                filter,
            })
        })
        .collect()
}

fn split_subject<'a>(name: &'a str, is_dir: bool, ignore_extension: bool) -> (&'a str, &'a str) {
    if ignore_extension && !is_dir {
        split_extension(name)
    } else {
        (name, "")
    }
}

pub fn apply(
    changes: Vec<Change>,
    options: &ReplaceOptions,
    provider: &dyn MetadataProvider,
) -> Result<Vec<Change>> {
    let stages = compile_stages(options)?;
    let Some(first) = stages.first() else {
        return Ok(changes);
    };

    let mut changes: Vec<Change> = changes
        .into_iter()
        .filter(|change| {
            let (subject, _) =
                split_subject(&change.source_name, change.is_dir, options.ignore_extension);
            first.find.is_match(subject)
        })
        .collect();
    debug!("{} entries match the first stage", changes.len());

    if options.pair {
        let secondaries = pairs(&mut changes, &options.extension_priority);
        debug!("paired {} secondary entries", secondaries);
    }

    let uses_index = stages
        .iter()
        .any(|stage| stage.template.variables.contains(TokenKind::Index));
    match &options.sort {
        Some(sort) => sort_changes(&mut changes, sort, provider)?,
        None if uses_index => hierarchical_order(&mut changes),
        None => {}
    }
    if options.reset_index_per_dir {
        group_by_dir(&mut changes);
    }
    assign_positions(&mut changes, options.reset_index_per_dir);

    let mut active = vec![true; changes.len()];
    for (stage_idx, stage) in stages.iter().enumerate() {
        let mut sequencer = IndexSequencer::new(stage.template.index_occurrences());
        let mut current_dir: Option<PathBuf> = None;

        for (change, is_active) in changes.iter_mut().zip(active.iter_mut()) {
            if !*is_active || change.primary_pair.is_some() {
                continue;
            }
            if options.reset_index_per_dir && current_dir.as_ref() != Some(&change.base_dir) {
                sequencer = IndexSequencer::new(stage.template.index_occurrences());
                current_dir = Some(change.base_dir.clone());
            }

            let input = change.target_name.clone();
            let output = run_stage(stage, change, &input, options, provider, &mut sequencer)
                .with_context(|| {
                    format!(
                        "stage {stage_idx}: failed to rename {}",
                        change.source_path().display()
                    )
                })?;
            change.target_name = output;

            if let Some(filter) = &stage.filter {
                let keep = passes_filter(filter, change, &input, provider).with_context(|| {
                    format!(
                        "stage {stage_idx}: filter `{}` failed for {}",
                        filter.as_str(),
                        change.source_path().display()
                    )
                })?;
                if !keep {
                    debug!("{} excluded by stage {} filter", change.source_name, stage_idx);
                    *is_active = false;
                }
            }
        }
    }

    if let Some(target_dir) = &options.target_dir {
        for change in changes.iter_mut() {
            change.target_dir = change.base_dir.join(target_dir);
        }
    }
    if options.pair {
        apply_pair_targets(&mut changes);
    }

    for change in changes.iter_mut() {
        change.status = if change.is_unchanged() {
            ChangeStatus::Unchanged
        } else {
            ChangeStatus::Ok
        };
    }
    Ok(changes)
}

fn run_stage(
    stage: &CompiledStage,
    change: &Change,
    input: &str,
    options: &ReplaceOptions,
    provider: &dyn MetadataProvider,
    sequencer: &mut IndexSequencer,
) -> Result<String> {
    let (subject, suffix) = split_subject(input, change.is_dir, options.ignore_extension);
    let matches: Vec<Captures<'_>> = stage.find.captures_iter(subject).collect();
    let selected = selected_range(matches.len(), options.replace_limit);

    let mut output = String::with_capacity(input.len());
    let mut cursor = 0usize;
    for (idx, caps) in matches.iter().enumerate() {
        if !selected.contains(&idx) {
            continue;
        }
        let whole = caps.get(0).map(|m| (m.start(), m.end(), m.as_str()));
        let Some((start, end, text)) = whole else {
            continue;
        };
        output.push_str(&subject[cursor..start]);
        let ctx = RenderContext {
            change,
            input_name: input,
            match_text: text,
            captures: Some(caps),
            provider,
        };
        output.push_str(&render(&stage.template, &ctx, sequencer)?);
        cursor = end;
    }
    output.push_str(&subject[cursor..]);
    output.push_str(suffix);
    Ok(output)
}

fn selected_range(count: usize, limit: i64) -> std::ops::Range<usize> {
    let n = usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX);
    match limit {
        0 => 0..count,
        l if l > 0 => 0..count.min(n),
        _ => count.saturating_sub(n)..count,
    }
}

fn passes_filter(
    filter: &FilterExpr,
    change: &Change,
    input: &str,
    provider: &dyn MetadataProvider,
) -> Result<bool> {
    let scope = FilterScope {
        name: &change.target_name,
        source: input,
        is_dir: change.is_dir,
    };
    let mut render_operand = |template: &Template| {
        let mut sequencer = IndexSequencer::new(template.index_occurrences());
        let ctx = RenderContext {
            change,
            input_name: &change.target_name,
            match_text: &change.target_name,
            captures: None,
            provider,
        };
        render(template, &ctx, &mut sequencer)
    };
    Ok(filter.evaluate(&scope, &mut render_operand)?)
}
