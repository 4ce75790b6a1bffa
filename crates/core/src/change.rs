use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Ok,
    Unchanged,
    Overwriting,
    EmptyFilename,
    TrailingPeriod,
    FilenameLengthExceeded,
    ForbiddenCharacters,
    PathExists,
    OverwritingNewPath,
    SourceAlreadyRenamed,
    SourceNotFound,
    Ignored,
}

impl ChangeStatus {
    pub fn is_committable(self) -> bool {
        matches!(
            self,
            ChangeStatus::Ok | ChangeStatus::Unchanged | ChangeStatus::Overwriting
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    EmptyFilename,
    TrailingPeriod,
    FilenameLengthExceeded,
    ForbiddenCharacters,
    PathExists,
    OverwritingNewPath,
    SourceNotFound,
    SourceAlreadyRenamed,
}

impl ConflictKind {
    pub fn status(self) -> ChangeStatus {
        match self {
            ConflictKind::EmptyFilename => ChangeStatus::EmptyFilename,
            ConflictKind::TrailingPeriod => ChangeStatus::TrailingPeriod,
            ConflictKind::FilenameLengthExceeded => ChangeStatus::FilenameLengthExceeded,
            ConflictKind::ForbiddenCharacters => ChangeStatus::ForbiddenCharacters,
            ConflictKind::PathExists => ChangeStatus::PathExists,
            ConflictKind::OverwritingNewPath => ChangeStatus::OverwritingNewPath,
            ConflictKind::SourceNotFound => ChangeStatus::SourceNotFound,
            ConflictKind::SourceAlreadyRenamed => ChangeStatus::SourceAlreadyRenamed,
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConflictKind::EmptyFilename => "empty filename",
            ConflictKind::TrailingPeriod => "trailing period",
            ConflictKind::FilenameLengthExceeded => "filename too long",
            ConflictKind::ForbiddenCharacters => "forbidden characters",
            ConflictKind::PathExists => "path already exists",
            ConflictKind::OverwritingNewPath => "overwrites another target",
            ConflictKind::SourceNotFound => "source not found",
            ConflictKind::SourceAlreadyRenamed => "source renamed earlier in batch",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub target_path: PathBuf,
    pub cause: String,
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortCriterion {
    Int(i64),
    Time(DateTime<Local>),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: usize,
    pub base_dir: PathBuf,
    pub source_name: String,
    pub is_dir: bool,
    pub target_name: String,
    pub target_dir: PathBuf,
    pub status: ChangeStatus,
    #[serde(default)]
    pub will_overwrite: bool,
    #[serde(skip)]
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_pair: Option<usize>,
    #[serde(skip)]
    pub sort_criterion: Option<SortCriterion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub csv_row: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Change {
    pub fn new(id: usize, base_dir: impl Into<PathBuf>, name: impl Into<String>, is_dir: bool) -> Self {
        let base_dir = base_dir.into();
        let name = name.into();
        Self {
            id,
            target_dir: base_dir.clone(),
            target_name: name.clone(),
            base_dir,
            source_name: name,
            is_dir,
            status: ChangeStatus::Unchanged,
            will_overwrite: false,
            position: 0,
            primary_pair: None,
            sort_criterion: None,
            csv_row: Vec::new(),
            error: None,
        }
    }

    pub fn source_path(&self) -> PathBuf {
        self.base_dir.join(&self.source_name)
    }

    pub fn target_path(&self) -> PathBuf {
        self.target_dir.join(&self.target_name)
    }

    pub fn is_unchanged(&self) -> bool {
        self.source_path() == self.target_path()
    }

    pub fn is_moving(&self) -> bool {
        self.status != ChangeStatus::Ignored && !self.is_unchanged()
    }

    pub fn reversed(&self) -> Change {
        let mut reversed = self.clone();
        reversed.base_dir = self.target_dir.clone();
        reversed.source_name = self.target_name.clone();
        reversed.target_dir = self.base_dir.clone();
        reversed.target_name = self.source_name.clone();
        reversed.status = ChangeStatus::Ok;
        reversed.will_overwrite = false;
        reversed.error = None;
        reversed
    }

    pub fn path_depth(&self) -> usize {
        self.base_dir.components().count()
    }
}

pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}

pub fn split_last_segment(name: &str) -> (&str, &str) {
    match name.rfind(['/', '\\']) {
        Some(idx) => (&name[..=idx], &name[idx + 1..]),
        None => ("", name),
    }
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_extension_handles_dotfiles_and_multiple_dots() {
        assert_eq!(split_extension("photo.jpg"), ("photo", ".jpg"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension("README"), ("README", ""));
    }

    #[test]
    fn split_last_segment_keeps_separator_on_directory_part() {
        assert_eq!(split_last_segment("a/b/c.txt"), ("a/b/", "c.txt"));
        assert_eq!(split_last_segment("c.txt"), ("", "c.txt"));
    }

    #[test]
    fn reversed_swaps_source_and_target() {
        let mut change = Change::new(0, "/tmp/in", "a.txt", false);
        change.target_dir = PathBuf::from("/tmp/out");
        change.target_name = "b.txt".to_string();
        change.status = ChangeStatus::Ok;

        let back = change.reversed();
        assert_eq!(back.source_path(), PathBuf::from("/tmp/out/b.txt"));
        assert_eq!(back.target_path(), PathBuf::from("/tmp/in/a.txt"));
        assert!(back.is_moving());
    }
}
