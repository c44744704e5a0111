//! # Docket Clusters CLI (`dkc`)
//!
//! ## Usage
//!
//! ```bash
//! dkc --config ./config/dkc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dkc init` | Create the SQLite database and run schema migrations |
//! | `dkc import <file>` | Import one corpus from an upstream JSON export |
//! | `dkc corpora <docket>` | List a docket's corpora and the preferred one |
//! | `dkc stats` | Corpus, document and similarity counts |
//! | `dkc clusters <docket>` | Flat clusters at one cutoff |
//! | `dkc hierarchy <docket>` | Multi-cutoff cluster hierarchy |
//! | `dkc cluster <docket> <cluster>` | A cluster's documents by centrality |
//! | `dkc document <docket> <cluster> <doc>` | A document highlighted against its cluster |
//! | `dkc trace <docket> <doc>` | Every level at which a document clusters |
//! | `dkc node <docket> <doc> --cutoff <c>` | The hierarchy node holding a document |
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docket_clusters::{commands, config, import, migrate, stats};

/// Docket Clusters: similarity clustering for regulatory docket comments.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dkc.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dkc",
    about = "Docket Clusters: near-duplicate and form-letter discovery for regulatory dockets",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dkc.toml")]
    config: PathBuf,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Import a corpus from an upstream JSON export.
    ///
    /// The file is validated first and written in a single transaction.
    Import {
        /// Path to the export file.
        file: PathBuf,
    },

    /// List the corpora built over a docket.
    Corpora {
        docket: String,
    },

    /// Show database statistics.
    Stats,

    /// Flat clusters of a docket at one cutoff.
    Clusters {
        docket: String,

        /// Similarity cutoff in [0, 1]. Defaults to `clustering.default_cutoff`.
        #[arg(long)]
        cutoff: Option<f64>,

        /// Document to preselect if it clusters.
        #[arg(long)]
        prepopulate: Option<i64>,
    },

    /// The docket's multi-cutoff cluster hierarchy.
    Hierarchy {
        docket: String,

        /// Comma-separated ascending cutoffs, e.g. `0.5,0.7,0.9`.
        #[arg(long)]
        cutoffs: Option<String>,

        /// Minimum cluster size. Defaults to a share of the docket size.
        #[arg(long)]
        min_size: Option<usize>,

        /// Attach distinguishing phrases to every node.
        #[arg(long)]
        phrases: bool,

        /// Document to preselect if it clusters at `--cutoff`.
        #[arg(long)]
        prepopulate: Option<i64>,

        /// Level used for `--prepopulate`.
        #[arg(long)]
        cutoff: Option<f64>,
    },

    /// The documents of the cluster containing a document, most central first.
    Cluster {
        docket: String,
        cluster: i64,

        #[arg(long)]
        cutoff: Option<f64>,
    },

    /// A document highlighted by phrase overlap with its cluster.
    Document {
        docket: String,
        cluster: i64,
        document: i64,

        #[arg(long)]
        cutoff: Option<f64>,
    },

    /// Every hierarchy level at which a document clusters.
    Trace {
        docket: String,
        document: i64,
    },

    /// The hierarchy node containing a document at one cutoff.
    Node {
        docket: String,
        document: i64,

        #[arg(long)]
        cutoff: f64,
    },
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
        // sqlx logs every statement at debug
        builder.filter_module("sqlx", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            import::run_import(&cfg, &file).await?;
        }
        Commands::Corpora { docket } => {
            commands::run_corpora(&cfg, &docket).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Clusters {
            docket,
            cutoff,
            prepopulate,
        } => {
            commands::run_clusters(&cfg, &docket, cutoff, prepopulate).await?;
        }
        Commands::Hierarchy {
            docket,
            cutoffs,
            min_size,
            phrases,
            prepopulate,
            cutoff,
        } => {
            commands::run_hierarchy(
                &cfg,
                &docket,
                cutoffs.as_deref(),
                min_size,
                phrases,
                prepopulate,
                cutoff,
            )
            .await?;
        }
        Commands::Cluster {
            docket,
            cluster,
            cutoff,
        } => {
            commands::run_cluster(&cfg, &docket, cluster, cutoff).await?;
        }
        Commands::Document {
            docket,
            cluster,
            document,
            cutoff,
        } => {
            commands::run_document(&cfg, &docket, cluster, document, cutoff).await?;
        }
        Commands::Trace { docket, document } => {
            commands::run_trace(&cfg, &docket, document).await?;
        }
        Commands::Node {
            docket,
            document,
            cutoff,
        } => {
            commands::run_node(&cfg, &docket, document, cutoff).await?;
        }
    }

    Ok(())
}
