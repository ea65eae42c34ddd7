//! Claims administration utility
//!
//! Commands:
//! - stats: Aggregate claim counts
//! - list: Claim summaries, optionally filtered by status
//! - expire-stale: Expire pending claims whose verification link has lapsed

use anyhow::Result;
use clap::{Parser, Subcommand};
use claims_service::{build_service, Config, StatusKind, StorageBackend};

#[derive(Parser)]
#[command(name = "claims-admin")]
#[command(about = "Listing claims administration utility")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show aggregate claim counts
    Stats,

    /// List claims without contact details
    List {
        /// Only show claims in this status (pending, verified, expired, rejected)
        #[arg(short, long)]
        status: Option<StatusKind>,
    },

    /// Expire pending claims whose verification link is past its lifetime
    ExpireStale,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    if config.storage_backend == StorageBackend::Memory {
        anyhow::bail!("claims-admin needs a shared store; set STORAGE_BACKEND=redis");
    }

    let service = build_service(&config).await?;

    match cli.command {
        Commands::Stats => {
            let stats = service.stats().await?;
            println!("Total claims:   {}", stats.total);
            println!("  verified:     {}", stats.verified);
            println!("  pending:      {}", stats.pending);
            println!("  expired:      {}", stats.expired);
            println!("  rejected:     {}", stats.rejected);

            if !stats.by_country.is_empty() {
                println!("\nVerified by country:");
                for (country, count) in &stats.by_country {
                    println!("  {:<20} {}", country, count);
                }
            }

            if !stats.by_type.is_empty() {
                println!("\nVerified by listing type:");
                for (listing_type, count) in &stats.by_type {
                    println!("  {:<20} {}", listing_type, count);
                }
            }
        }
        Commands::List { status } => {
            let claims = service.list(status).await?;
            for claim in &claims {
                println!(
                    "{}  {:<9} {:<14} {}  created {}",
                    claim.id,
                    claim.kind().as_str(),
                    claim.claimant.role.as_str(),
                    claim.listing,
                    claim.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!("\n{} claims", claims.len());
        }
        Commands::ExpireStale => {
            let expired = service.expire_stale().await?;
            println!("Expired {} stale pending claims", expired);
        }
    }

    Ok(())
}
