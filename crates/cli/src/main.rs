use anyhow::{bail, Result};
use batch_renamer_core::{
    app_paths, apply_plan, generate_plan, load_config, read_csv_rows, save_config, undo,
    AppConfig, ApplyOptions, ChangeStatus, DiscoveryOptions, PlanOptions, Platform, RenamePlan,
    ReplaceOptions, SortMode, SortOptions, Stage, UndoOptions, ValidateOptions,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "batch-renamer")]
#[command(about = "Rename files in bulk with find/replace stages and templates")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plan a batch rename and optionally commit it
    Rename(Box<RenameArgs>),
    /// Restore the names changed by the last committed batch
    Undo(UndoArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    /// Write the default configuration if none exists
    Init,
}

#[derive(Debug, Args)]
struct RenameArgs {
    /// Files or directories to rename
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Find pattern of a stage; repeat for chained stages
    #[arg(short = 'f', long = "find")]
    find: Vec<String>,

    /// Replacement template of a stage, paired with --find by position
    #[arg(short = 'r', long = "replace", required = true)]
    replace: Vec<String>,

    /// Filter expression of a stage, paired by position; empty for none
    #[arg(long)]
    filter: Vec<String>,

    #[arg(long)]
    recursive: bool,
    #[arg(long)]
    max_depth: Option<usize>,
    #[arg(long)]
    include_hidden: bool,
    /// Rename directories as well as files
    #[arg(long)]
    include_dirs: bool,
    #[arg(long, conflicts_with = "include_dirs")]
    only_dirs: bool,
    /// Skip entries whose name matches this regex
    #[arg(long)]
    exclude: Option<String>,

    #[arg(short = 'i', long)]
    ignore_case: bool,
    /// Treat find patterns as plain text
    #[arg(short = 'l', long)]
    literal: bool,
    /// Match and replace on the full name, extension included
    #[arg(long)]
    with_extension: bool,
    /// 0 replaces every match, n the first n, -n the last n
    #[arg(long, allow_hyphen_values = true)]
    limit: Option<i64>,

    #[arg(long, value_enum)]
    sort: Option<SortArg>,
    #[arg(long)]
    reverse: bool,
    /// Template rendered per entry by the *-var sort modes
    #[arg(long)]
    sort_var: Option<String>,
    #[arg(long)]
    sort_per_dir: bool,
    /// Restart index tokens in every directory
    #[arg(long)]
    reset_per_dir: bool,

    /// Move renamed entries into this directory
    #[arg(long)]
    target_dir: Option<PathBuf>,
    /// Rename files sharing a stem together
    #[arg(long)]
    pair: bool,
    /// Extension priority for --pair, comma separated
    #[arg(long, value_delimiter = ',')]
    pair_order: Vec<String>,
    /// Rows feeding the {csv.N} tokens, one per discovered entry
    #[arg(long)]
    csv: Option<PathBuf>,

    #[arg(long)]
    auto_fix: bool,
    #[arg(long)]
    allow_overwrites: bool,
    #[arg(long)]
    fix_pattern: Option<String>,
    #[arg(long, value_enum)]
    platform: Option<PlatformArg>,
    #[arg(long)]
    case_insensitive: bool,

    /// Commit the plan; without it nothing on disk changes
    #[arg(long)]
    apply: bool,
    /// Remove source directories left empty
    #[arg(long)]
    clean: bool,
    /// Backup record location, defaults to the config directory
    #[arg(long)]
    backup: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct UndoArgs {
    #[arg(long)]
    backup: Option<PathBuf>,
    #[arg(long)]
    clean: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
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

impl From<SortArg> for SortMode {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Default => SortMode::Default,
            SortArg::Natural => SortMode::Natural,
            SortArg::Size => SortMode::Size,
            SortArg::Mtime => SortMode::Mtime,
            SortArg::Atime => SortMode::Atime,
            SortArg::Ctime => SortMode::Ctime,
            SortArg::Btime => SortMode::Btime,
            SortArg::TimeVar => SortMode::TimeVar,
            SortArg::IntVar => SortMode::IntVar,
            SortArg::StringVar => SortMode::StringVar,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlatformArg {
    Windows,
    Macos,
    Unix,
}

impl From<PlatformArg> for Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::Windows => Platform::Windows,
            PlatformArg::Macos => Platform::MacOs,
            PlatformArg::Unix => Platform::Unix,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    match cli.command {
        Commands::Rename(args) => cmd_rename(*args),
        Commands::Undo(args) => cmd_undo(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Init => cmd_config_init(),
        },
    }
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();

    Ok(())
}

fn build_stages(args: &RenameArgs) -> Result<Vec<Stage>> {
    if args.find.len() > args.replace.len() {
        bail!(
            "{} --find patterns but only {} --replace templates",
            args.find.len(),
            args.replace.len()
        );
    }
    if args.filter.len() > args.replace.len() {
        bail!("more --filter expressions than stages");
    }

    Ok(args
        .replace
        .iter()
        .enumerate()
        .map(|(idx, replacement)| Stage {
            find: args.find.get(idx).cloned().unwrap_or_default(),
            replacement: replacement.clone(),
            filter: args.filter.get(idx).filter(|f| !f.trim().is_empty()).cloned(),
        })
        .collect())
}

fn build_options(args: &RenameArgs, config: &AppConfig) -> Result<PlanOptions> {
    let sort = match (args.sort, &args.sort_var) {
        (Some(mode), _) => Some(SortOptions {
            mode: mode.into(),
            reverse: args.reverse,
            sort_var: args.sort_var.clone(),
            per_dir: args.sort_per_dir,
        }),
        (None, Some(_)) => bail!("--sort-var needs one of the *-var sort modes"),
        (None, None) if args.reverse || args.sort_per_dir => Some(SortOptions {
            mode: SortMode::Default,
            reverse: args.reverse,
            sort_var: None,
            per_dir: args.sort_per_dir,
        }),
        (None, None) => None,
    };

    let mut validate = ValidateOptions {
        auto_fix: args.auto_fix || config.auto_fix_conflicts,
        allow_overwrites: args.allow_overwrites || config.allow_overwrites,
        fix_conflicts_pattern: args
            .fix_pattern
            .clone()
            .unwrap_or_else(|| config.fix_conflicts_pattern.clone()),
        ..ValidateOptions::default()
    };
    if let Some(platform) = args.platform {
        validate.platform = platform.into();
        validate.case_insensitive_fs = validate.platform.case_insensitive_by_default();
    }
    if args.case_insensitive {
        validate.case_insensitive_fs = true;
    }

    let csv_rows = match &args.csv {
        Some(path) => read_csv_rows(path)?,
        None => Vec::new(),
    };

    Ok(PlanOptions {
        discovery: DiscoveryOptions {
            paths: args.paths.clone(),
            recursive: args.recursive || config.recursive,
            max_depth: args.max_depth,
            include_hidden: args.include_hidden || config.include_hidden,
            include_dirs: args.include_dirs,
            only_dirs: args.only_dirs,
            exclude: args.exclude.clone(),
        },
        replace: ReplaceOptions {
            stages: build_stages(args)?,
            ignore_case: args.ignore_case,
            string_literal: args.literal,
            ignore_extension: config.ignore_extension && !args.with_extension,
            replace_limit: args.limit.unwrap_or(config.replace_limit),
            sort,
            reset_index_per_dir: args.reset_per_dir,
            target_dir: args.target_dir.clone(),
            pair: args.pair,
            extension_priority: if args.pair_order.is_empty() {
                config.pair_order.clone()
            } else {
                args.pair_order.clone()
            },
        },
        validate,
        csv_rows,
    })
}

fn cmd_rename(args: RenameArgs) -> Result<()> {
    let config = load_config()?;
    let options = build_options(&args, &config)?;
    let mut plan = generate_plan(&options)?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        OutputFormat::Table => {
            print_table(&plan);
        }
    }

    if !args.apply {
        eprintln!("dry run: nothing was renamed. Pass --apply to commit.");
        return Ok(());
    }

    let backup_path = match args.backup {
        Some(path) => path,
        None => app_paths()?.backup_path,
    };
    let result = apply_plan(
        &mut plan,
        &ApplyOptions {
            backup_path: Some(backup_path),
            clean: args.clean,
        },
    )?;
    eprintln!(
        "applied {} renames ({} unchanged, {} failed)",
        result.applied,
        result.unchanged,
        result.errors.len()
    );
    for failure in &result.errors {
        eprintln!("  {}: {}", failure.source.display(), failure.message);
    }
    for dir in &result.cleaned_dirs {
        eprintln!("  removed empty {}", dir.display());
    }
    if !result.errors.is_empty() {
        bail!("{} renames failed", result.errors.len());
    }
    Ok(())
}

fn cmd_undo(args: UndoArgs) -> Result<()> {
    let config = load_config()?;
    let backup_path = match args.backup {
        Some(path) => path,
        None => app_paths()?.backup_path,
    };
    let options = UndoOptions {
        validate: ValidateOptions {
            auto_fix: true,
            fix_conflicts_pattern: config.fix_conflicts_pattern,
            ..ValidateOptions::default()
        },
        clean: args.clean,
    };
    let result = undo(&backup_path, &options)?;
    println!(
        "restored {} entries ({} skipped, {} failed)",
        result.restored,
        result.skipped,
        result.errors.len()
    );
    for failure in &result.errors {
        eprintln!("  {}: {}", failure.source.display(), failure.message);
    }
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("config file: {}", paths.config_path.display());
    println!("undo record: {}", paths.backup_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let paths = app_paths()?;
    if paths.config_path.exists() {
        println!("config already exists: {}", paths.config_path.display());
        return Ok(());
    }
    save_config(&AppConfig::default())?;
    info!("wrote {}", paths.config_path.display());
    println!("created {}", paths.config_path.display());
    Ok(())
}

fn status_label(status: ChangeStatus) -> &'static str {
    match status {
        ChangeStatus::Ok => "ok",
        ChangeStatus::Unchanged => "unchanged",
        ChangeStatus::Overwriting => "overwrite",
        ChangeStatus::Ignored => "ignored",
        _ => "CONFLICT",
    }
}

fn print_table(plan: &RenamePlan) {
    println!("status     source -> target");
    for change in &plan.changes {
        println!(
            "{:<10} {} -> {}",
            status_label(change.status),
            change.source_path().display(),
            change.target_path().display()
        );
    }

    if plan.has_conflicts() {
        println!("\nconflicts:");
        for (kind, conflicts) in &plan.conflicts {
            for conflict in conflicts {
                println!(
                    "  [{}] {}: {}",
                    kind,
                    conflict.target_path.display(),
                    conflict.cause
                );
            }
        }
    }

    let stats = &plan.stats;
    println!(
        "\nsummary: scanned={} matched={} planned={} unchanged={} ignored={} fixed={} conflicts={} passes={}",
        stats.scanned,
        stats.matched,
        stats.planned,
        stats.unchanged,
        stats.ignored,
        stats.fixed,
        stats.conflicts,
        stats.passes
    );
}
