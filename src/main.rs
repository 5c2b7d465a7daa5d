use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use treesync::logging::{self, Verbosity};
use treesync::{apply, plan_format, MirrorFetcher, Package, UpdateOperations};

#[derive(Parser)]
#[command(
    name = "treesync",
    about = "Inspect directory trees, diff them against manifests and apply update plans"
)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Only log warnings and errors (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    quiet: bool,
    /// Worker threads for hashing and downloads (0 = one per CPU)
    #[arg(long, short, global = true, default_value_t = 0)]
    jobs: usize,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe a directory as it is on disk
    Inspect {
        /// Directory to inspect
        #[arg(long)]
        dir: PathBuf,
        /// Print the whole package as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a JSON manifest
    Parse {
        /// Path to the manifest
        #[arg(long)]
        manifest: PathBuf,
        /// Print the whole package as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compute the operations turning the current state into a manifest
    Plan {
        #[command(flatten)]
        from: FromArgs,
        /// Manifest describing the wanted state
        #[arg(long)]
        to_manifest: PathBuf,
        /// Write the plan to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Also list every operation
        #[arg(long)]
        list: bool,
    },
    /// List the operations of a stored plan
    Show {
        /// Path to the plan file
        #[arg(long, short)]
        plan: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a stored plan to a directory
    Apply {
        /// Directory to update
        #[arg(long)]
        target: PathBuf,
        /// Path to the plan file
        #[arg(long, short)]
        plan: PathBuf,
        /// Content-addressed blob directory (<mirror>/<sha1>)
        #[arg(long)]
        mirror: PathBuf,
    },
}

/// Where the current state comes from.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct FromArgs {
    /// Inspect this directory
    #[arg(long)]
    from_dir: Option<PathBuf>,
    /// Read this manifest
    #[arg(long)]
    from_manifest: Option<PathBuf>,
    /// Start from nothing
    #[arg(long)]
    from_empty: bool,
}

fn load_from(from: &FromArgs) -> Result<Package> {
    if let Some(dir) = &from.from_dir {
        return Package::try_from_inspected_folder(dir)
            .with_context(|| format!("Failed to inspect {}", dir.display()));
    }
    if let Some(manifest) = &from.from_manifest {
        return load_manifest(manifest);
    }
    Ok(Package::default())
}

fn load_manifest(path: &Path) -> Result<Package> {
    Package::try_from_manifest_file(path)
        .with_context(|| format!("Invalid manifest {}", path.display()))
}

fn print_package(package: &Package, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(package)?);
        return Ok(());
    }
    println!("  Folders: {}", package.folders.len());
    println!("  Files: {}", package.files.len());
    println!("  Symlinks: {}", package.symlinks.len());
    println!("  Sources: {}", package.sources.len());
    println!("  Total file size: {} bytes", package.total_file_bytes());
    Ok(())
}

fn print_plan_summary(plan: &UpdateOperations) {
    let summary = plan.summary();
    println!("  Deletes: {}", summary.deletes);
    println!("  Directories removed: {}", summary.rmdirs);
    println!("  Directories created: {}", summary.mkdirs);
    println!(
        "  Downloads: {} ({} bytes)",
        summary.downloads, summary.download_bytes
    );
    println!("  Links created: {}", summary.mklinks);
    println!("  Permission fixes: {}", summary.executable_fixes);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.quiet, cli.verbose))?;

    if cli.jobs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.jobs)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    match cli.command {
        Commands::Inspect { dir, json } => {
            let start = Instant::now();
            let package = tokio::task::spawn_blocking(move || {
                Package::try_from_inspected_folder(&dir)
                    .with_context(|| format!("Failed to inspect {}", dir.display()))
            })
            .await??;
            if !json {
                println!("Inspected in {:.3}s", start.elapsed().as_secs_f64());
            }
            print_package(&package, json)?;
        }
        Commands::Parse { manifest, json } => {
            let package = load_manifest(&manifest)?;
            if !json {
                println!("Manifest is valid: {}", manifest.display());
            }
            print_package(&package, json)?;
        }
        Commands::Plan {
            from,
            to_manifest,
            output,
            list,
        } => {
            let start = Instant::now();

            // Build both sides concurrently
            let (from, to) = tokio::try_join!(
                tokio::task::spawn_blocking(move || load_from(&from)),
                tokio::task::spawn_blocking(move || load_manifest(&to_manifest)),
            )?;
            let plan = UpdateOperations::resolve(&from?, &to?);
            if !plan.valid {
                bail!("Could not compute an update plan");
            }

            println!("Update plan:");
            print_plan_summary(&plan);
            if list {
                for step in plan.steps() {
                    println!("  {step}");
                }
            }
            if let Some(output) = output {
                plan_format::write_plan(&plan, &output)?;
                println!("  Written to: {}", output.display());
            }
            println!("  Time elapsed: {:.3}s", start.elapsed().as_secs_f64());
        }
        Commands::Show { plan, json } => {
            let operations = plan_format::read_plan(&plan)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&operations)?);
            } else {
                println!("Plan {}:", plan.display());
                print_plan_summary(&operations);
                for step in operations.steps() {
                    println!("  {step}");
                }
            }
        }
        Commands::Apply {
            target,
            plan,
            mirror,
        } => {
            println!("Applying plan...");
            println!("  Target: {}", target.display());
            println!("  Plan: {}", plan.display());
            println!("  Mirror: {}", mirror.display());

            let start = Instant::now();
            let operations = plan_format::read_plan(&plan)?;
            let summary =
                apply::apply_plan(&target, operations, Arc::new(MirrorFetcher::new(mirror))).await?;

            println!("\nPlan applied successfully!");
            println!("  Deleted: {}", summary.deleted);
            println!("  Directories removed: {}", summary.dirs_removed);
            println!("  Directories created: {}", summary.dirs_created);
            println!(
                "  Files downloaded: {} ({} bytes)",
                summary.files_downloaded, summary.bytes_downloaded
            );
            println!("  Links created: {}", summary.links_created);
            println!("  Permissions fixed: {}", summary.permissions_fixed);
            println!("  Time elapsed: {:.3}s", start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}
