//! The clustering pipeline.
//!
//! Stages run strictly in sequence, each consuming the complete output
//! of the previous one:
//!
//! flatten -> embed -> distance matrix -> hierarchical clustering ->
//! evaluation -> result assembly
//!
//! The only internal parallelism is inside the embedding stage, where a
//! bounded number of batches may be in flight at once; results are
//! reassembled in the original item order before the next stage starts,
//! so parallelism never changes the output.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::cluster::{Dendrogram, DistanceMatrix, HierarchicalClusterer};
use crate::config::ClusterConfig;
use crate::corpus::{self, FlattenedItem, SuggestionCorpus};
use crate::embedding::EmbeddingProvider;
use crate::error::{PipelineError, Result};
use crate::evaluate;
use crate::export::{self, RunResult, RunStats};

/// Everything a run produces, in memory.
///
/// `result` is the exportable artifact; the dendrogram, surviving items
/// and labels are kept so the caller can also export the merge tree.
#[derive(Debug)]
pub struct PipelineOutput {
    pub result: RunResult,
    pub dendrogram: Dendrogram,
    pub items: Vec<FlattenedItem>,
    pub labels: Vec<usize>,
}

/// Run the full pipeline over a corpus.
///
/// Fatal conditions: zero valid items, an embedding failure rate above
/// the configured ceiling, or a degenerate distance matrix. A single
/// valid item short-circuits to a trivial one-cluster result with null
/// quality metrics.
pub async fn run<P: EmbeddingProvider>(
    config: &ClusterConfig,
    provider: &P,
    corpus: &SuggestionCorpus,
) -> Result<PipelineOutput> {
    config.validate()?;

    // 1. Flatten.
    let flattened = corpus::flatten(corpus);
    let skipped_malformed = flattened.skipped;
    if flattened.items.is_empty() {
        return Err(PipelineError::TooFewItems { n_items: 0 });
    }

    // 2. Embed.
    let attempted = flattened.items.len();
    let (items, vectors, embedding_failures) =
        embed_stage(provider, flattened.items, config).await;

    let failure_rate = embedding_failures as f64 / attempted as f64;
    if failure_rate > config.max_failure_rate {
        return Err(PipelineError::EmbeddingFailureRate {
            failed: embedding_failures,
            total: attempted,
            max_rate: config.max_failure_rate,
        });
    }
    if items.is_empty() {
        return Err(PipelineError::TooFewItems { n_items: 0 });
    }

    let stats = RunStats {
        skipped_malformed,
        embedding_failures,
        clustered_items: items.len(),
    };
    info!(
        "run stats: {} clustered, {} skipped, {} embedding failures",
        stats.clustered_items, stats.skipped_malformed, stats.embedding_failures
    );

    // A lone item cannot be clustered; report it as one trivial cluster.
    if items.len() == 1 {
        let labels = vec![1];
        let result = export::assemble(
            config,
            &items,
            &labels,
            evaluate::trivial_metrics(1),
            stats,
        );
        return Ok(PipelineOutput {
            result,
            dendrogram: Dendrogram::new(1),
            items,
            labels,
        });
    }

    // 3. Pairwise distances.
    let matrix = DistanceMatrix::from_embeddings(&vectors)?;
    info!("distance matrix computed: {0}x{0}", matrix.n());

    // 4. Hierarchical clustering and flat cut.
    let clusterer = HierarchicalClusterer::new(config.linkage_method);
    let dendrogram = clusterer.fit(&matrix, &vectors)?;
    let labels = dendrogram.cut_at_distance(config.distance_threshold);
    info!(
        "clustering done: {} clusters at threshold {} ({} linkage)",
        labels.iter().collect::<std::collections::BTreeSet<_>>().len(),
        config.distance_threshold,
        config.linkage_method
    );

    // 5. Quality metrics.
    let metrics = evaluate::evaluate(&matrix, &vectors, &labels);

    // 6. Assemble the artifact.
    let result = export::assemble(config, &items, &labels, metrics, stats);

    Ok(PipelineOutput {
        result,
        dendrogram,
        items,
        labels,
    })
}

/// Embed all items in bounded-concurrency batches.
///
/// A failed batch is retried item by item; items that still fail are
/// dropped and counted. Returns the surviving items, their vectors (in
/// the same order) and the failure count.
async fn embed_stage<P: EmbeddingProvider>(
    provider: &P,
    items: Vec<FlattenedItem>,
    config: &ClusterConfig,
) -> (Vec<FlattenedItem>, Vec<Vec<f32>>, usize) {
    let texts: Vec<String> = items.iter().map(|item| item.text.clone()).collect();
    let batches: Vec<Vec<String>> = texts
        .chunks(config.batch_size)
        .map(|chunk| chunk.to_vec())
        .collect();
    info!(
        "embedding {} items in {} batches (model {})",
        items.len(),
        batches.len(),
        provider.model_name()
    );

    let per_batch: Vec<Vec<Option<Vec<f32>>>> = stream::iter(
        batches
            .into_iter()
            .map(|batch| embed_batch_lossy(provider, batch)),
    )
    .buffered(config.embed_workers)
    .collect()
    .await;

    let mut survivors = Vec::with_capacity(items.len());
    let mut vectors = Vec::with_capacity(items.len());
    let mut failed = 0usize;
    let mut results = per_batch.into_iter().flatten();
    for item in items {
        match results.next().flatten() {
            Some(vector) => {
                survivors.push(item);
                vectors.push(vector);
            }
            None => {
                warn!("dropping item {} after embedding failure", item.index);
                failed += 1;
            }
        }
    }
    (survivors, vectors, failed)
}

/// Embed one batch, falling back to per-item requests on batch failure.
async fn embed_batch_lossy<P: EmbeddingProvider>(
    provider: &P,
    batch: Vec<String>,
) -> Vec<Option<Vec<f32>>> {
    match provider.embed_batch(&batch).await {
        Ok(vectors) if vectors.len() == batch.len() => vectors.into_iter().map(Some).collect(),
        Ok(vectors) => {
            warn!(
                "provider returned {} vectors for a batch of {}; retrying per item",
                vectors.len(),
                batch.len()
            );
            embed_one_by_one(provider, &batch).await
        }
        Err(err) => {
            warn!("batch embedding failed ({err}); retrying per item");
            embed_one_by_one(provider, &batch).await
        }
    }
}

async fn embed_one_by_one<P: EmbeddingProvider>(
    provider: &P,
    batch: &[String],
) -> Vec<Option<Vec<f32>>> {
    let mut out = Vec::with_capacity(batch.len());
    for text in batch {
        match provider.embed_batch(std::slice::from_ref(text)).await {
            Ok(mut vectors) if vectors.len() == 1 => out.push(Some(vectors.remove(0))),
            Ok(_) => out.push(None),
            Err(err) => {
                warn!("embedding failed for one item: {err}");
                out.push(None);
            }
        }
    }
    out
}
