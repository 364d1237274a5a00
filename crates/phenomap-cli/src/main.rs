//! CLI for phenomap — gene-group retrieval mAP over consensus profiles.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "phenomap")]
#[command(about = "phenomap — does profile similarity recover shared gene groups?")]
#[command(version = phenomap_core::VERSION)]
struct Cli {
    /// Log debug detail (equivalent to RUST_LOG=debug)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every configured modality and pipeline, writing one combined table
    Run {
        /// JSON configuration (defaults apply to absent fields)
        #[arg(long)]
        config: Option<String>,

        /// Output CSV path (default: {output_dir}/{retrieval_label}_retrieval.csv)
        #[arg(long)]
        output: Option<String>,

        /// Abort on the first failing configuration
        #[arg(long)]
        fail_fast: bool,
    },

    /// Score a single consensus profile table
    Score {
        /// Consensus profiles (CSV/TSV, optionally .gz) with Metadata_ columns
        #[arg(long)]
        profiles: String,

        /// Column holding `|`-separated group labels
        #[arg(long)]
        multilabel_col: String,

        /// Samples per null distribution
        #[arg(long, default_value = "20000")]
        null_size: usize,

        /// Seed for the null distributions
        #[arg(long, default_value = "12527")]
        seed: u64,

        /// FDR level
        #[arg(long, default_value = "0.05")]
        fdr: f64,

        /// Upper bound on item pairs per block
        #[arg(long, default_value = "20000")]
        batch_size: usize,

        /// Group p-value method
        #[arg(long, default_value = "pooled_null", value_parser = ["pooled_null", "fisher"])]
        p_value_method: String,

        /// Directory for ap.csv and map.csv
        #[arg(long, default_value = "output")]
        output: String,
    },

    /// Print the default configuration as JSON
    Config,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Run {
            config,
            output,
            fail_fast,
        } => commands::run::run(config.as_deref(), output.as_deref(), fail_fast),
        Commands::Score {
            profiles,
            multilabel_col,
            null_size,
            seed,
            fdr,
            batch_size,
            p_value_method,
            output,
        } => commands::score::run(commands::score::ScoreCommandConfig {
            profiles: &profiles,
            multilabel_col: &multilabel_col,
            null_size,
            seed,
            fdr,
            batch_size,
            p_value_method: &p_value_method,
            output_dir: &output,
        }),
        Commands::Config => commands::config::run(),
    }
}
