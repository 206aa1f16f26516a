//! # Cloud Asset Catalog CLI (`assetctl`)
//!
//! ## Usage
//!
//! ```bash
//! assetctl --config ./config/assetctl.yaml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `assetctl init` | Check the store and create the identity indexes |
//! | `assetctl services` | List services found in the model repository |
//! | `assetctl ingest` | Store every service and operation as an asset |
//! | `assetctl get <type> <id>` | Print one stored asset as JSON |
//! | `assetctl list <type>` | Print one page of assets as JSON |

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use asset_catalog::{config, get, ingest, init, logging, services};

/// Cloud Asset Catalog CLI.
///
/// All commands accept a `--config` flag pointing to a YAML (or `.toml`)
/// settings file. A missing file means defaults; `ASSET_CATALOG_*`
/// environment variables override either.
#[derive(Parser)]
#[command(
    name = "assetctl",
    about = "Cloud Asset Catalog: ingest cloud service metadata into a local asset store",
    version
)]
struct Cli {
    /// Path to the settings file.
    #[arg(long, global = true, default_value = "./config/assetctl.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify store connectivity and create the identity indexes.
    ///
    /// Idempotent: running it again is safe.
    Init,

    /// Ingest the model repository.
    ///
    /// Saves one `aws.product` asset per service and one
    /// `aws.product_action` asset per operation. Items that fail are
    /// logged and skipped.
    Ingest {
        /// Model directory, overriding `catalog.models_dir`.
        #[arg(long)]
        models: Option<PathBuf>,

        /// Dry run: count services and operations without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// List services in the model repository.
    Services {
        /// Model directory, overriding `catalog.models_dir`.
        #[arg(long)]
        models: Option<PathBuf>,
    },

    /// Print a stored asset.
    Get {
        /// Asset type, e.g. `aws.product` or `aws.product_action`.
        asset_type: String,

        /// Asset id, e.g. `s3_2006-03-01` or `s3.PutObject`.
        asset_id: String,

        /// Cloud account id. Catalog assets are account-agnostic.
        #[arg(long, default_value = "")]
        account: String,

        /// Only include these fields (repeatable, dotted paths allowed).
        #[arg(long = "field")]
        fields: Vec<String>,
    },

    /// Print one page of stored assets plus the total count.
    List {
        /// Asset type, e.g. `aws.product`.
        asset_type: String,

        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: u64,

        #[arg(long, default_value_t = 20)]
        page_size: u64,

        /// Only include these fields (repeatable, dotted paths allowed).
        #[arg(long = "field")]
        fields: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let settings = config::load_settings(Some(cli.config.as_path()))?;

    match cli.command {
        Commands::Init => {
            init::run_init(&settings).await?;
        }
        Commands::Ingest { models, dry_run } => {
            ingest::run_ingest(&settings, models, dry_run).await?;
        }
        Commands::Services { models } => {
            services::list_services(&settings, models)?;
        }
        Commands::Get {
            asset_type,
            asset_id,
            account,
            fields,
        } => {
            get::run_get(&settings, &asset_type, &asset_id, &account, &fields).await?;
        }
        Commands::List {
            asset_type,
            page,
            page_size,
            fields,
        } => {
            get::run_list(&settings, &asset_type, page, page_size, &fields).await?;
        }
    }

    Ok(())
}
