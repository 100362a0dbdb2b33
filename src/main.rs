//! opcluster - cluster PR design suggestions into a structured artifact.
//!
//! Reads the extracted suggestion corpus, embeds each opinion, runs
//! hierarchical clustering and writes two timestamped JSON artifacts:
//! the clustering results and the dendrogram tree for visualization.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use opcluster::{
    cluster::Linkage, config::ClusterConfig, corpus::SuggestionCorpus,
    embedding::FastEmbedProvider, export, pipeline,
};

/// Cluster design suggestions extracted from PR reviews.
#[derive(Parser, Debug)]
#[command(name = "opcluster")]
#[command(version = "0.1.0")]
#[command(about = "Hierarchical semantic clustering of PR design suggestions", long_about = None)]
struct Args {
    /// Input JSON corpus (reviewThreadSuggestions + commentSuggestions)
    input_file: PathBuf,

    /// Directory for the output artifacts
    #[arg(long, default_value = "clustering_output")]
    output_dir: PathBuf,

    /// Configuration file (TOML); CLI flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Embedding model name
    #[arg(long)]
    model_name: Option<String>,

    /// Distance threshold for the flat cut
    #[arg(long)]
    threshold: Option<f64>,

    /// Linkage method
    #[arg(long, value_enum)]
    linkage: Option<Linkage>,

    /// Clusters below this size are flagged as small
    #[arg(long)]
    min_cluster_size: Option<usize>,

    /// Embedding batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    // Config file first, then CLI overrides.
    let mut config = match args.config.as_deref() {
        Some(path) => ClusterConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClusterConfig::default(),
    };
    if let Some(model_name) = args.model_name {
        config.model_name = model_name;
    }
    if let Some(threshold) = args.threshold {
        config.distance_threshold = threshold;
    }
    if let Some(linkage) = args.linkage {
        config.linkage_method = linkage;
    }
    if let Some(min_cluster_size) = args.min_cluster_size {
        config.min_cluster_size = min_cluster_size;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    config.validate()?;

    let corpus = SuggestionCorpus::from_file(&args.input_file)
        .with_context(|| format!("failed to load corpus from {}", args.input_file.display()))?;

    let provider = FastEmbedProvider::new(&config.model_name)
        .await
        .context("failed to initialize embedding provider")?;

    let output = pipeline::run(&config, &provider, &corpus)
        .await
        .context("clustering pipeline failed")?;

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

    let results_path = args
        .output_dir
        .join(format!("clustering_results_{timestamp}.json"));
    export::write_json(&output.result, &results_path).context("failed to export results")?;

    let tree = export::dendrogram_tree(&config, &output.dendrogram, &output.items, &output.labels);
    let tree_path = args
        .output_dir
        .join(format!("dendrogram_tree_{timestamp}.json"));
    export::write_json(&tree, &tree_path).context("failed to export dendrogram tree")?;

    info!(
        "done: {} items in {} clusters -> {}",
        output.result.clustering_info.n_samples,
        output.result.clustering_info.n_clusters,
        results_path.display()
    );
    Ok(())
}
