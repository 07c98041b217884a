use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use gdrive_path::{
    is_dir, DrivePath, DriveV2Store, Options, RemoteObject, RetryPolicy, SyncOptions, TreeSyncer,
};
use log::warn;

const TOKEN_ENV: &str = "GDRIVE_PATH_TOKEN";

#[derive(Parser, Debug)]
#[command(name = "gdrive-path")]
#[command(about = "Unix-like path operations on Google Drive", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// OAuth2 access token (defaults to $GDRIVE_PATH_TOKEN, then the token file)
    #[arg(long, global = true, env = TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,

    /// File holding the access token
    /// (defaults to <config dir>/gdrive-path/token)
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    /// Seconds a resolved path is trusted without asking Drive again
    #[arg(long, global = true, default_value_t = 60)]
    cache_ttl: u64,

    /// Total attempts for a call failing with a 5xx, including the first
    #[arg(long, global = true, default_value_t = 3)]
    retries: u32,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the object at a path
    Stat { path: String },

    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,

        /// Drive query used to filter children (defaults to "trashed = false")
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Create a directory
    Mkdir {
        path: String,

        /// Create missing parent directories as well
        #[arg(short, long)]
        parents: bool,
    },

    /// Move or rename a file or directory
    Mv { src: String, dst: String },

    /// Upload a local file
    Put {
        local: PathBuf,
        dst: String,

        /// Upload straight to the destination, skipping the temporary folder
        #[arg(long)]
        in_place: bool,
    },

    /// Download a file
    Get { src: String, local: PathBuf },

    /// Set the modification date of a file or directory
    Touch {
        path: String,

        /// RFC 3339 date (defaults to now)
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Upload a local directory tree, skipping files that are up to date
    Sync {
        local_dir: PathBuf,
        remote_dir: String,

        /// Show what would be done without making changes
        #[arg(short, long)]
        dry_run: bool,

        /// Upload straight to the destination, skipping the temporary folder
        #[arg(long)]
        in_place: bool,
    },
}

fn default_token_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gdrive-path").join("token"))
}

fn resolve_token(cli: &Cli) -> Result<String> {
    if let Some(token) = cli.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let token_file = cli
        .token_file
        .clone()
        .or_else(default_token_file)
        .context("Failed to locate the configuration directory; pass --token-file")?;
    log::debug!("Reading access token from {}", token_file.display());

    let token = std::fs::read_to_string(&token_file).with_context(|| {
        format!(
            "No access token found. Pass --token, set {} or write one to {}",
            TOKEN_ENV,
            token_file.display()
        )
    })?;
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("No access token found: {} is empty", token_file.display());
    }
    Ok(token.to_string())
}

fn print_object(out: &mut impl Write, object: &RemoteObject) -> io::Result<()> {
    let kind = if is_dir(object) { 'd' } else { '-' };
    writeln!(
        out,
        "{}\t{}\t{}\t{}",
        kind, object.id, object.modified_date, object.title
    )
}

fn print_details(out: &mut impl Write, object: &RemoteObject) -> io::Result<()> {
    writeln!(out, "Id:       {}", object.id)?;
    writeln!(out, "Title:    {}", object.title)?;
    writeln!(out, "Type:     {}", object.mime_type)?;
    writeln!(out, "Created:  {}", object.created_date)?;
    writeln!(out, "Modified: {}", object.modified_date)?;
    writeln!(out, "Parents:  {}", object.parents.join(", "))
}

fn run(cli: &Cli) -> Result<()> {
    let token = resolve_token(cli)?;
    let store = DriveV2Store::new(&token).context("Failed to create Drive client")?;

    let options = Options {
        cache_ttl: Duration::from_secs(cli.cache_ttl),
        retry: RetryPolicy {
            max_attempts: cli.retries,
            ..Default::default()
        },
        ..Default::default()
    };
    let drive = DrivePath::with_options(store, options);
    let mut out = io::stdout().lock();

    match &cli.command {
        Commands::Stat { path } => {
            let object = drive.stat(path).with_context(|| format!("Failed to stat {path}"))?;
            print_details(&mut out, &object)?;
        }
        Commands::Ls { path, query } => {
            let objects = drive
                .list_dir(path, query.as_deref())
                .with_context(|| format!("Failed to list {path}"))?;
            for object in &objects {
                print_object(&mut out, object)?;
            }
        }
        Commands::Mkdir { path, parents } => {
            let folder = if *parents {
                drive.mkdir_all(path)
            } else {
                drive.mkdir(path)
            }
            .with_context(|| format!("Failed to create directory {path}"))?;
            print_object(&mut out, &folder)?;
        }
        Commands::Mv { src, dst } => {
            let moved = drive
                .move_to(src, dst)
                .with_context(|| format!("Failed to move {src} to {dst}"))?;
            print_object(&mut out, &moved)?;
        }
        Commands::Put { local, dst, in_place } => {
            let object = drive
                .insert_file(dst, local, *in_place)
                .with_context(|| format!("Failed to upload {}", local.display()))?;
            print_object(&mut out, &object)?;
        }
        Commands::Get { src, local } => {
            let written = drive
                .download_to_file(src, local)
                .with_context(|| format!("Failed to download {src}"))?;
            writeln!(out, "{} bytes written to {}", written, local.display())?;
        }
        Commands::Touch { path, date } => {
            let date = match date {
                Some(d) => DateTime::parse_from_rfc3339(d)
                    .with_context(|| format!("Invalid date: {d}"))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };
            let object = drive
                .set_modified_date(path, date)
                .with_context(|| format!("Failed to set modification date of {path}"))?;
            print_object(&mut out, &object)?;
        }
        Commands::Sync { local_dir, remote_dir, dry_run, in_place } => {
            println!("Syncing to Google Drive:");
            println!("  Source: {}", local_dir.display());
            println!("  Target: {}", remote_dir);
            if *dry_run {
                println!("  Mode: DRY RUN (no changes will be made)");
            }
            println!();

            let options = SyncOptions {
                dry_run: *dry_run,
                in_place: *in_place,
            };
            let result = TreeSyncer::new(&drive)
                .sync(local_dir, remote_dir, &options)
                .context("Failed to sync")?;

            println!("\nSync completed:");
            println!("  Files copied: {}", result.files_copied);
            println!("  Files skipped: {}", result.files_skipped);
            println!("  Directories created: {}", result.directories_created);

            if !result.errors.is_empty() {
                println!("\nErrors encountered:");
                for error in &result.errors {
                    warn!("{}", error);
                    eprintln!("  - {}", error);
                }
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.verbose { "info" } else { "warn" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .target(env_logger::Target::Stderr)
        .init();

    run(&cli)
}
