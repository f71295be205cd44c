//! romforge CLI
//!
//! Command-line interface for inspecting, converting, resolving, rebuilding
//! and verifying ROM catalog files.

mod error;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use romforge_core::{BucketDimension, DedupePolicy, ItemKind, ItemStore, MergePolicy};
use romforge_dat::{CatalogFormat, DatHeader};
use romforge_rebuild::{OutputFormat, RebuildOptions};

use error::CliError;

#[derive(Parser)]
#[command(name = "romforge")]
#[command(about = "Process ROM catalog files: inspect, resolve, rebuild, verify", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show catalog header and content statistics
    Info {
        /// Catalog files (Logiqx XML or ClrMamePro, auto-detected)
        #[arg(required = true)]
        catalogs: Vec<PathBuf>,
    },

    /// Convert a catalog between serialization formats
    Convert {
        /// Input catalog (format auto-detected)
        catalog: PathBuf,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(short, long)]
        format: FormatArg,
    },

    /// Flatten parent/clone/device relationships
    Resolve {
        /// Catalog files; several inputs are merged into one store
        #[arg(required = true)]
        catalogs: Vec<PathBuf>,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,

        /// Flattening policy
        #[arg(short, long)]
        policy: PolicyArg,

        /// Output format (defaults to Logiqx XML)
        #[arg(short, long, default_value = "xml")]
        format: FormatArg,

        /// Deduplicate by CRC across inputs before resolving
        #[arg(long, default_value = "none")]
        dedupe: DedupeArg,
    },

    /// Rebuild input files into catalog-named sets
    Rebuild {
        /// Catalog file
        catalog: PathBuf,

        /// Input files or directories to scan
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Output container format
        #[arg(short, long, default_value = "folder")]
        format: ContainerArg,

        /// Whole-collection set rebuild instead of streaming
        #[arg(long)]
        sets: bool,

        /// Emit only files that match nothing in the catalog
        #[arg(long)]
        inverse: bool,

        /// Trust archive metadata instead of deep-hashing members
        #[arg(short, long)]
        quick: bool,
    },

    /// Check which catalog entries are present among the inputs
    Verify {
        /// Catalog file
        catalog: PathBuf,

        /// Input files or directories to scan
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Trust archive metadata instead of deep-hashing members
        #[arg(short, long)]
        quick: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Write missing entries as a fix catalog to this path
        #[arg(long)]
        fixdat: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Logiqx XML
    Xml,
    /// ClrMamePro text blocks
    Cmp,
}

impl From<FormatArg> for CatalogFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Xml => CatalogFormat::Logiqx,
            FormatArg::Cmp => CatalogFormat::ClrMamePro,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Embed device dependencies only
    DeviceExpand,
    /// Fully self-contained sets, BIOS/device sets deleted
    FullyNonMerged,
    /// Self-contained sets, BIOS sets kept separate
    NonMerged,
    /// Clones absorbed into parents
    Merged,
    /// Clones keep only what the parent lacks
    Split,
}

impl From<PolicyArg> for MergePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::DeviceExpand => MergePolicy::DeviceExpand,
            PolicyArg::FullyNonMerged => MergePolicy::FullyNonMerged,
            PolicyArg::NonMerged => MergePolicy::NonMerged,
            PolicyArg::Merged => MergePolicy::Merged,
            PolicyArg::Split => MergePolicy::Split,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DedupeArg {
    /// Leave duplicates alone
    None,
    /// Flag duplicates and unify their hashes
    Standard,
    /// Remove flagged duplicates
    Collapse,
}

impl From<DedupeArg> for DedupePolicy {
    fn from(arg: DedupeArg) -> Self {
        match arg {
            DedupeArg::None => DedupePolicy::None,
            DedupeArg::Standard => DedupePolicy::Standard,
            DedupeArg::Collapse => DedupePolicy::Collapse,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ContainerArg {
    /// One directory per set
    Folder,
    /// One zip archive per set
    Zip,
    /// One directory of per-item gzip members per set
    TorrentGz,
    /// One tar archive per set
    Tar,
}

impl From<ContainerArg> for OutputFormat {
    fn from(arg: ContainerArg) -> Self {
        match arg {
            ContainerArg::Folder => OutputFormat::Folder,
            ContainerArg::Zip => OutputFormat::Zip,
            ContainerArg::TorrentGz => OutputFormat::TorrentGz,
            ContainerArg::Tar => OutputFormat::Tar,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { catalogs } => run_info(&catalogs),
        Commands::Convert {
            catalog,
            output,
            format,
        } => run_convert(&catalog, &output, format.into()),
        Commands::Resolve {
            catalogs,
            output,
            policy,
            format,
            dedupe,
        } => run_resolve(&catalogs, &output, policy.into(), format.into(), dedupe.into()),
        Commands::Rebuild {
            catalog,
            inputs,
            output,
            format,
            sets,
            inverse,
            quick,
        } => run_rebuild(
            &catalog,
            &inputs,
            RebuildOptions {
                output,
                format: format.into(),
                use_sets: sets,
                inverse,
                quick_scan: quick,
            },
        ),
        Commands::Verify {
            catalog,
            inputs,
            quick,
            json,
            fixdat,
        } => run_verify(&catalog, &inputs, quick, json, fixdat.as_deref()),
    };

    if let Err(e) = result {
        eprintln!(
            "{} {}",
            "error:".if_supports_color(Stdout, |t| t.bright_red()),
            e,
        );
        std::process::exit(1);
    }
}

/// Parse every catalog and merge them into one store, stamping each input's
/// items with its index for dupe classification.
fn load_catalogs(paths: &[PathBuf]) -> Result<(ItemStore, DatHeader), CliError> {
    let mut merged = ItemStore::new();
    let mut header = None;

    for (index, path) in paths.iter().enumerate() {
        let id = index as u32;
        let (store, parsed_header) = romforge_dat::parse_catalog_file(path, id, id)?;
        for item in store.items() {
            merged.insert(item.clone());
        }
        if header.is_none() {
            header = Some(parsed_header);
        }
    }

    Ok((merged, header.unwrap_or_else(|| DatHeader::named("romforge"))))
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .expect("static pattern")
            .tick_chars("/-\\|"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

fn run_info(catalogs: &[PathBuf]) -> Result<(), CliError> {
    for path in catalogs {
        let (mut store, header) = romforge_dat::parse_catalog_file(path, 0, 0)?;
        store.rebucket(BucketDimension::Game, DedupePolicy::None);

        let mut roms = 0usize;
        let mut disks = 0usize;
        let mut samples = 0usize;
        let mut other = 0usize;
        for item in store.items() {
            if item.is_placeholder() {
                continue;
            }
            match item.kind {
                ItemKind::Rom { .. } => roms += 1,
                ItemKind::Disk { .. } => disks += 1,
                ItemKind::Sample => samples += 1,
                _ => other += 1,
            }
        }

        println!(
            "{}",
            path.display().if_supports_color(Stdout, |t| t.bold()),
        );
        println!(
            "  {} {} ({})",
            "Name:".if_supports_color(Stdout, |t| t.cyan()),
            header.name,
            header.version,
        );
        if !header.description.is_empty() && header.description != header.name {
            println!(
                "  {} {}",
                "Description:".if_supports_color(Stdout, |t| t.cyan()),
                header.description,
            );
        }
        if let Some(author) = &header.author {
            println!(
                "  {} {}",
                "Author:".if_supports_color(Stdout, |t| t.cyan()),
                author,
            );
        }
        println!(
            "  {} {} games, {} roms, {} disks, {} samples, {} other",
            "Contents:".if_supports_color(Stdout, |t| t.cyan()),
            store.bucket_count(),
            roms,
            disks,
            samples,
            other,
        );
        println!();
    }
    Ok(())
}

fn run_convert(catalog: &PathBuf, output: &PathBuf, format: CatalogFormat) -> Result<(), CliError> {
    let (mut store, header) = romforge_dat::parse_catalog_file(catalog, 0, 0)?;
    romforge_dat::write_catalog_file(output, &mut store, &header, format)?;
    println!(
        "{} {} -> {}",
        "Converted".if_supports_color(Stdout, |t| t.green()),
        catalog.display(),
        output.display(),
    );
    Ok(())
}

fn run_resolve(
    catalogs: &[PathBuf],
    output: &PathBuf,
    policy: MergePolicy,
    format: CatalogFormat,
    dedupe: DedupePolicy,
) -> Result<(), CliError> {
    let (mut store, header) = load_catalogs(catalogs)?;
    let before = store.len();

    if dedupe != DedupePolicy::None {
        store.rebucket(BucketDimension::Crc, dedupe);
    }

    let pb = spinner("Resolving sets...");
    romforge_core::resolve(&mut store, policy);
    pb.finish_and_clear();

    romforge_dat::write_catalog_file(output, &mut store, &header, format)?;
    println!(
        "{} {} items in, {} items out -> {}",
        "Resolved".if_supports_color(Stdout, |t| t.green()),
        before,
        store.len(),
        output.display(),
    );
    Ok(())
}

fn run_rebuild(
    catalog: &PathBuf,
    inputs: &[PathBuf],
    options: RebuildOptions,
) -> Result<(), CliError> {
    let (mut store, _) = romforge_dat::parse_catalog_file(catalog, 0, 0)?;

    let pb = spinner("Scanning and rebuilding...");
    let summary = romforge_rebuild::rebuild(&mut store, inputs, &options);
    pb.finish_and_clear();

    println!(
        "{} {} scanned, {} rebuilt, {} skipped, {} failed",
        if summary.success() {
            "\u{2714}".if_supports_color(Stdout, |t| t.green()).to_string()
        } else {
            "\u{2718}"
                .if_supports_color(Stdout, |t| t.bright_red())
                .to_string()
        },
        summary.scanned,
        summary.rebuilt,
        summary.skipped,
        summary.failed,
    );

    if !summary.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_verify(
    catalog: &PathBuf,
    inputs: &[PathBuf],
    quick: bool,
    json: bool,
    fixdat: Option<&std::path::Path>,
) -> Result<(), CliError> {
    let (mut store, header) = romforge_dat::parse_catalog_file(catalog, 0, 0)?;

    let pb = spinner("Verifying collection...");
    let (mut missing, report) = romforge_rebuild::verify(&mut store, inputs, quick);
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.complete() {
        println!(
            "{} {} complete: {} of {} present",
            "\u{2714}".if_supports_color(Stdout, |t| t.green()),
            header.name,
            report.found,
            report.total,
        );
    } else {
        println!(
            "{} {} incomplete: {} of {} present, {} missing",
            "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
            header.name,
            report.found,
            report.total,
            report.missing.if_supports_color(Stdout, |t| t.bright_red()),
        );
    }

    if let Some(path) = fixdat {
        let mut fix_header = header.clone();
        fix_header.name = format!("{} (fixdat)", header.name);
        fix_header.description = fix_header.name.clone();
        romforge_dat::write_catalog_file(path, &mut missing, &fix_header, CatalogFormat::Logiqx)?;
        println!(
            "{} fix catalog with {} entries -> {}",
            "Wrote".if_supports_color(Stdout, |t| t.green()),
            report.missing,
            path.display(),
        );
    }

    Ok(())
}
