//! dkrutil - Main entry point
//!
//! Docker convenience CLI: volume backup/restore, image tag queries,
//! write-once secrets, and container listing.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dkrutil::container;
use dkrutil::engine::{Engine, DEFAULT_HELPER_IMAGE};
use dkrutil::registry::RegistryClient;
use dkrutil::secret::{create_secret, SecretSource};
use dkrutil::utils;
use dkrutil::volume::backup::{backup, BackupOptions};
use dkrutil::volume::filter::VolumeFilter;
use dkrutil::volume::restore::{restore, RestoreOptions};
use dkrutil::volume::Summary;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Image used for short-lived helper containers
    #[arg(
        long,
        global = true,
        env = "DKRUTIL_HELPER_IMAGE",
        default_value = DEFAULT_HELPER_IMAGE
    )]
    helper_image: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage containers
    #[command(subcommand)]
    Container(ContainerCommand),

    /// Manage volumes
    #[command(subcommand)]
    Volume(VolumeCommand),

    /// Query image registries
    #[command(subcommand)]
    Image(ImageCommand),

    /// Manage secrets stored in dedicated volumes
    #[command(subcommand)]
    Secret(SecretCommand),
}

#[derive(Subcommand, Debug)]
enum ContainerCommand {
    /// List containers
    Ps(PsArgs),
}

#[derive(Args, Debug)]
struct PsArgs {
    /// Show all containers, not just running ones
    #[arg(short, long)]
    all: bool,
}

#[derive(Subcommand, Debug)]
enum VolumeCommand {
    /// Back up volumes into a directory of tar.gz archives
    Backup(BackupArgs),

    /// Restore volumes from a directory of tar.gz archives
    Restore(RestoreArgs),
}

#[derive(Args, Debug)]
struct BackupArgs {
    /// Directory where volume backups will be stored
    #[arg(short = 'd', long = "backup-directory", value_name = "DIR")]
    directory: PathBuf,

    /// Regex pattern to include specific volumes (can be repeated)
    #[arg(short = 'i', long = "include", value_name = "PATTERN")]
    include: Vec<String>,

    /// Regex pattern to ignore specific volumes (can be repeated); ignore
    /// patterns win over includes
    #[arg(short = 'I', long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Show skipped volumes as they are encountered
    #[arg(short, long)]
    verbose: bool,

    /// Number of volumes backed up in parallel; above 1 the output order
    /// is non-deterministic
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,
}

#[derive(Args, Debug)]
struct RestoreArgs {
    /// Directory containing volume backup files
    #[arg(short = 'd', long = "backup-directory", value_name = "DIR")]
    directory: PathBuf,
}

#[derive(Subcommand, Debug)]
enum ImageCommand {
    /// List registry tags for an image
    Tags(TagsArgs),
}

#[derive(Args, Debug)]
struct TagsArgs {
    /// Image name, e.g. `alpine` or `grafana/grafana`
    name: String,

    /// Only print tags matching this digest
    #[arg(short, long, value_name = "DIGEST", conflicts_with = "tag")]
    digest: Option<String>,

    /// Print the digest of this tag instead of listing
    #[arg(short, long, value_name = "TAG")]
    tag: Option<String>,
}

#[derive(Subcommand, Debug)]
enum SecretCommand {
    /// Store a write-once secret in a dedicated volume
    Create(CreateSecretArgs),
}

#[derive(Args, Debug)]
struct CreateSecretArgs {
    /// Secret (and volume) name
    name: String,

    /// File with the secret content; `-` or absent reads standard input
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::logger::init(&cli.log_level)?;

    // Interrupt handling: cancel remaining work, but every already-started
    // helper container still gets removed before the process exits.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing cleanup before exit");
            signal_cancel.cancel();
        }
    });

    match cli.command {
        Command::Container(ContainerCommand::Ps(args)) => {
            let engine = Engine::connect().await?;
            let rows = container::list(&engine, args.all).await?;
            print!("{}", container::render_table(&rows));
        }
        Command::Volume(VolumeCommand::Backup(args)) => {
            // Pattern errors are fatal before any volume is processed.
            let filter = VolumeFilter::compile(&args.include, &args.ignore)?;
            let engine = Engine::connect().await?;
            let options = BackupOptions {
                directory: args.directory,
                verbose: args.verbose,
                jobs: args.jobs,
                helper_image: cli.helper_image,
            };
            let summary = backup(&engine, &filter, &options, &cancel).await?;
            finish(summary)?;
        }
        Command::Volume(VolumeCommand::Restore(args)) => {
            let engine = Engine::connect().await?;
            let options = RestoreOptions {
                directory: args.directory,
                helper_image: cli.helper_image,
            };
            let summary = restore(&engine, &options, &cancel).await?;
            finish(summary)?;
        }
        Command::Image(ImageCommand::Tags(args)) => {
            let client = RegistryClient::new();
            if let Some(tag) = args.tag {
                let digest = client.resolve_tag(&args.name, &tag).await?;
                println!("{digest}");
            } else {
                let tags = client.list_tags(&args.name).await?;
                for tag in tags {
                    if let Some(digest) = &args.digest {
                        if !tag.matches_digest(digest) {
                            continue;
                        }
                    }
                    println!("{}", tag.name);
                }
            }
        }
        Command::Secret(SecretCommand::Create(args)) => {
            let engine = Engine::connect().await?;
            let source = match &args.file {
                Some(path) if path.as_os_str() != "-" => SecretSource::File(path),
                _ => SecretSource::Stdin,
            };
            create_secret(&engine, &args.name, source, &cli.helper_image).await?;
            println!("Secret '{}' created", args.name);
        }
    }

    Ok(())
}

/// Print the run summary. Any failed volume makes the whole run exit
/// non-zero, even when the others succeeded.
fn finish(summary: Summary) -> Result<()> {
    println!(
        "{} succeeded, {} skipped, {} failed",
        summary.succeeded.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    for (name, reason) in &summary.failed {
        eprintln!("  {name}: {reason}");
    }

    if summary.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{} volume(s) failed", summary.failed.len())
    }
}
