//! ec2-autorestore: root volume backup and restore for EC2 instances
//!
//! Snapshots the root volumes of tagged instances under a backup id, and
//! later swaps those roots for fresh volumes cut from the snapshots.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ec2_autorestore::aws::error::classify_anyhow_error;
use ec2_autorestore::aws::{Ec2Client, Ec2Operations};
use ec2_autorestore::confirm::{ConfirmationGate, StdinGate};
use ec2_autorestore::orchestrator::{
    inventory_json, inventory_table, Orchestrator, PruneTarget, WorkflowError,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ec2-autorestore")]
#[command(about = "Backup and restore EC2 instance root volumes")]
#[command(version)]
struct Args {
    /// AWS region (default: from environment or profile)
    #[arg(long, global = true)]
    region: Option<String>,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long, global = true)]
    aws_profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshot the root volume of every instance tagged backup=<TAG_VALUE>
    Backup {
        /// Value of the "backup" tag selecting the instances
        tag_value: String,

        /// Backup id recorded on the snapshots
        backup_id: String,
    },

    /// Swap instance root volumes for volumes restored from a backup
    Restore {
        /// Backup id of the snapshots to restore from
        backup_id: String,

        /// Offer to delete the replaced volumes after the restore
        #[arg(long = "dvols", short = 'd')]
        delete_volumes: bool,
    },

    /// Delete the resources recorded under a backup id
    Prune {
        #[command(subcommand)]
        target: PruneCommand,
    },

    /// Show the snapshots, volumes, and instances of a backup set
    List {
        /// Backup id to inspect
        backup_id: String,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[derive(Subcommand, Debug)]
enum PruneCommand {
    /// Delete the snapshots of a backup set
    Snapshots {
        /// Backup id whose snapshots should be deleted
        backup_id: String,

        /// Show what would be deleted without prompting
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete the detached volumes of a backup set
    Volumes {
        /// Backup id whose volumes should be deleted
        backup_id: String,

        /// Show what would be deleted without prompting
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if matches!(
            e.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::UserCancelled)
        ) {
            eprintln!("Cancelled; nothing was deleted.");
            return;
        }
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    // Print main error message
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    // Print error chain (causes)
    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    // Print a resolution hint for recognized AWS failures
    if let Some(hint) = classify_anyhow_error(e).suggestion() {
        let _ = writeln!(stderr, "\n\x1b[1mHint:\x1b[0m {hint}");
    }

    // Only print backtrace hint if not already showing
    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        // Print backtrace if available and requested
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if let Some(profile) = &args.aws_profile {
        info!(profile = %profile, "Using AWS profile");
    }

    let ec2 = Ec2Client::new(args.region.as_deref(), args.aws_profile.as_deref()).await?;
    let gate = StdinGate;
    let orchestrator = Orchestrator::new(&ec2, &gate);

    match args.command {
        Command::Backup {
            tag_value,
            backup_id,
        } => orchestrator.backup(&tag_value, &backup_id).await,

        Command::Restore {
            backup_id,
            delete_volumes,
        } => orchestrator.restore(&backup_id, delete_volumes).await,

        Command::Prune { target } => match target {
            PruneCommand::Snapshots { backup_id, dry_run } => {
                orchestrator
                    .prune(PruneTarget::Snapshots, &backup_id, dry_run)
                    .await
            }
            PruneCommand::Volumes { backup_id, dry_run } => {
                orchestrator
                    .prune(PruneTarget::Volumes, &backup_id, dry_run)
                    .await
            }
        },

        Command::List { backup_id, format } => {
            handle_list(&orchestrator, &backup_id, &format).await
        }
    }
}

/// Handle the list command
async fn handle_list<E: Ec2Operations, G: ConfirmationGate>(
    orchestrator: &Orchestrator<'_, E, G>,
    backup_id: &str,
    format: &str,
) -> Result<()> {
    let inventory = orchestrator.inventory(backup_id).await?;

    if inventory.is_empty() {
        println!("No resources found with backup id '{backup_id}'.");
        return Ok(());
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&inventory_json(&inventory))?);
    } else {
        println!("{}", inventory_table(&inventory));
    }

    Ok(())
}
