use std::io::{self, Write};
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use devicefs_core::access::KindFilter;
use devicefs_core::{DevicePath, FileFilter, FileKind, IterationControl};
use eyre::{bail, Result};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "devicefs")]
#[command(about = "Inspect files on the local machine through the device file layer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metadata for a path
    Stat(StatArgs),
    /// List directory entries
    #[command(alias = "list")]
    Ls(LsArgs),
    /// Print file contents to stdout
    Cat(CatArgs),
    /// Show free space on the filesystem holding a path
    Df(DfArgs),
    /// Exit 0 when the path exists, 1 otherwise
    Exists(ExistsArgs),
    /// Watch a path and print change notifications
    Watch(WatchArgs),
}

#[derive(Args)]
struct StatArgs {
    path: String,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LsArgs {
    path: String,
    /// Shell wildcard applied to entry names (repeatable)
    #[arg(long)]
    pattern: Vec<String>,
    #[arg(long)]
    recursive: bool,
    /// Only regular files
    #[arg(long)]
    files: bool,
    /// Only directories
    #[arg(long)]
    dirs: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CatArgs {
    path: String,
    /// Byte offset to start reading at
    #[arg(long, default_value_t = 0)]
    offset: u64,
    /// Maximum number of bytes to read
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Args)]
struct DfArgs {
    path: String,
}

#[derive(Args)]
struct ExistsArgs {
    path: String,
}

#[derive(Args)]
struct WatchArgs {
    path: String,
    /// Stop after this many notifications
    #[arg(long)]
    count: Option<u64>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Stat(args) => run_stat(args),
        Commands::Ls(args) => run_ls(args),
        Commands::Cat(args) => run_cat(args),
        Commands::Df(args) => run_df(args),
        Commands::Exists(args) => run_exists(args),
        Commands::Watch(args) => run_watch(args),
    }
}

#[derive(Serialize)]
struct StatJson {
    path: String,
    kind: &'static str,
    size: u64,
    mtime_seconds: i64,
    permissions: String,
    owner: Option<String>,
    group: Option<String>,
}

fn kind_label(kind: FileKind) -> &'static str {
    match kind {
        FileKind::File => "file",
        FileKind::Directory => "directory",
        FileKind::Symlink => "symlink",
        FileKind::Other => "other",
    }
}

fn run_stat(args: StatArgs) -> Result<()> {
    let path = DevicePath::parse_user_input(&args.path);
    let info = path.file_path_info()?;
    let owner = path.owner().ok();
    let group = path.group().ok();

    if args.json {
        let row = StatJson {
            path: path.to_display_string(true),
            kind: kind_label(info.kind),
            size: info.file_size,
            mtime_seconds: info.modified_secs,
            permissions: info.permissions.to_octal_string(),
            owner,
            group,
        };
        println!("{}", serde_json::to_string_pretty(&row)?);
        return Ok(());
    }

    println!("{}", path.to_display_string(true));
    println!("  kind:        {}", kind_label(info.kind));
    println!("  size:        {}", info.file_size);
    println!(
        "  modified:    {}",
        format_mtime(info.modified_secs)
    );
    println!("  permissions: {}", info.permissions.to_octal_string());
    if let (Some(owner), Some(group)) = (&owner, &group) {
        println!("  owner:       {owner}:{group}");
    }
    Ok(())
}

#[derive(Serialize)]
struct DirEntryJson {
    path: String,
    is_dir: bool,
    size: u64,
    mtime_seconds: i64,
}

fn run_ls(args: LsArgs) -> Result<()> {
    if args.files && args.dirs {
        bail!("--files and --dirs are mutually exclusive");
    }
    let path = DevicePath::parse_user_input(&args.path);
    let mut filter = FileFilter::new().with_patterns(args.pattern.clone());
    filter.recursive = args.recursive;
    filter.with_info = true;
    filter.kind = if args.files {
        KindFilter::FilesOnly
    } else if args.dirs {
        KindFilter::DirectoriesOnly
    } else {
        KindFilter::All
    };

    let mut rows: Vec<DirEntryJson> = Vec::new();
    path.iterate_directory(&filter, &mut |entry, info| {
        rows.push(DirEntryJson {
            path: entry.to_display_string(true),
            is_dir: info.map(|i| i.kind == FileKind::Directory).unwrap_or(false),
            size: info.map(|i| i.file_size).unwrap_or(0),
            mtime_seconds: info.map(|i| i.modified_secs).unwrap_or(0),
        });
        IterationControl::Continue
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in &rows {
        let marker = if row.is_dir { "d" } else { "-" };
        println!(
            "{marker} {:>12}  {}  {}",
            row.size,
            format_mtime(row.mtime_seconds),
            row.path
        );
    }
    Ok(())
}

fn run_cat(args: CatArgs) -> Result<()> {
    let path = DevicePath::parse_user_input(&args.path);
    let data = path.file_contents(args.limit, args.offset)?;
    io::stdout().write_all(&data)?;
    Ok(())
}

fn run_df(args: DfArgs) -> Result<()> {
    let path = DevicePath::parse_user_input(&args.path);
    let bytes = path.bytes_available()?;
    println!(
        "{}  {} available",
        path.to_display_string(true),
        human_bytes(bytes)
    );
    Ok(())
}

fn run_exists(args: ExistsArgs) -> Result<()> {
    let path = DevicePath::parse_user_input(&args.path);
    if path.exists()? {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn run_watch(args: WatchArgs) -> Result<()> {
    let path = DevicePath::parse_user_input(&args.path);
    let handle = path.watch()?;
    eprintln!("watching {}", path.to_display_string(true));

    let mut delivered = 0u64;
    loop {
        if let Some(event) = handle.wait_for_event(Duration::from_secs(1)) {
            println!("{}", event.path.to_display_string(true));
            delivered += 1;
            if args.count.is_some_and(|count| delivered >= count) {
                return Ok(());
            }
        }
    }
}

fn format_mtime(seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
