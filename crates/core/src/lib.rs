mod apply;
mod change;
mod config;
mod discovery;
mod exif_reader;
mod filter;
mod grammar;
mod index;
mod metadata;
mod order;
mod planner;
mod replace;
mod sanitize;
mod template;
mod transform;
mod validate;

pub use apply::{
    apply_plan, read_backup, undo, ApplyOptions, ApplyResult, BackupRecord, EntryFailure,
    UndoOptions, UndoResult,
};
pub use change::{
    split_extension, split_last_segment, Change, ChangeStatus, Conflict, ConflictKind,
};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
};
pub use discovery::{discover, DiscoveryOptions, DiscoveryStats};
pub use filter::{FilterError, FilterExpr, FilterScope};
pub use index::{format_number, IndexSequencer, NumeralSystem, Width};
pub use metadata::{hash_file, FsMetadata, HashAlgorithm, MetadataProvider, TimeAttr};
pub use order::{files_before_dirs, natural_cmp, sort_changes, SortMode, SortOptions};
pub use planner::{generate_plan, plan_changes, read_csv_rows, PlanOptions, RenamePlan, RenameStats};
pub use replace::{apply as apply_replacements, compile_find, ReplaceOptions, Stage};
pub use sanitize::Platform;
pub use template::{extract, render, RenderContext, ResolveError, Template, TemplateError};
pub use validate::{
    propose_next, validate, ConflictNamer, ValidateError, ValidateOptions, ValidationReport,
    DEFAULT_FIX_PATTERN,
};
