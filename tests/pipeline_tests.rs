//! End-to-end pipeline tests against a deterministic stub provider.
//!
//! The stub maps each opinion's combined text to a fixed 2-D vector, so
//! every run is reproducible and no model is ever loaded.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};

use opcluster::{
    cluster::Linkage,
    config::ClusterConfig,
    corpus::{CommentGroup, Opinion, SuggestionCorpus, ThreadGroup},
    embedding::EmbeddingProvider,
    error::PipelineError,
    pipeline,
};

/// Deterministic stub: text -> fixed vector; unknown text fails, as do
/// texts placed on the explicit failure list.
struct StubProvider {
    vectors: HashMap<String, Vec<f32>>,
    failing: HashSet<String>,
}

impl StubProvider {
    fn new() -> Self {
        Self {
            vectors: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    fn with_vector(mut self, problem: &str, suggestion: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(combined(problem, suggestion), vector);
        self
    }

    fn with_failure(mut self, problem: &str, suggestion: &str) -> Self {
        self.failing.insert(combined(problem, suggestion));
        self
    }
}

/// The flattener's text construction, mirrored for test fixtures.
fn combined(problem: &str, suggestion: &str) -> String {
    format!("Problem: {problem} Suggestion: {suggestion}")
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn model_name(&self) -> &str {
        "stub-2d"
    }

    async fn embed_batch(&self, texts: &[String]) -> opcluster::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            if self.failing.contains(text) {
                return Err(PipelineError::Embedding(format!(
                    "stub failure for '{text}'"
                )));
            }
            match self.vectors.get(text) {
                Some(vector) => out.push(vector.clone()),
                None => {
                    return Err(PipelineError::Embedding(format!(
                        "stub has no vector for '{text}'"
                    )))
                }
            }
        }
        Ok(out)
    }
}

fn opinion(problem: &str, suggestion: &str) -> Opinion {
    Opinion {
        problem: problem.to_string(),
        suggestion: suggestion.to_string(),
        reasons: Vec::new(),
        contexts: Vec::new(),
        kind: "design".to_string(),
        card_id: String::new(),
    }
}

fn corpus(thread_ops: Vec<Opinion>, comment_ops: Vec<Opinion>) -> SuggestionCorpus {
    SuggestionCorpus {
        review_thread_suggestions: vec![ThreadGroup {
            review_thread_id: "RT_1".to_string(),
            opinions: thread_ops,
        }],
        comment_suggestions: vec![CommentGroup {
            comment_id: "IC_1".to_string(),
            opinions: comment_ops,
        }],
    }
}

/// Six opinions in two tight direction bundles: 0-2 near (1, 0) and
/// 3-5 near (0, 1). Cosine distance across the bundles is ~0.85+.
fn two_bundle_fixture() -> (SuggestionCorpus, StubProvider) {
    let fixtures: Vec<(&str, &str, Vec<f32>)> = vec![
        ("p0", "s0", vec![1.0, 0.0]),
        ("p1", "s1", vec![0.99, 0.14]),
        ("p2", "s2", vec![0.98, 0.17]),
        ("p3", "s3", vec![0.0, 1.0]),
        ("p4", "s4", vec![0.14, 0.99]),
        ("p5", "s5", vec![0.17, 0.98]),
    ];

    let mut provider = StubProvider::new();
    let mut thread_ops = Vec::new();
    for (problem, suggestion, vector) in fixtures {
        provider = provider.with_vector(problem, suggestion, vector);
        thread_ops.push(opinion(problem, suggestion));
    }
    (corpus(thread_ops, Vec::new()), provider)
}

fn config(threshold: f64) -> ClusterConfig {
    ClusterConfig {
        model_name: "stub-2d".to_string(),
        distance_threshold: threshold,
        ..ClusterConfig::default()
    }
}

#[tokio::test]
async fn two_bundles_form_two_clusters_of_three() {
    let (corpus, provider) = two_bundle_fixture();
    let output = pipeline::run(&config(0.4), &provider, &corpus).await.unwrap();

    let info = &output.result.clustering_info;
    assert_eq!(info.n_samples, 6);
    assert_eq!(info.n_clusters, 2);
    assert_eq!(info.cluster_ids, vec![1, 2]);

    let mut sizes: Vec<usize> = output.result.clusters.values().map(|c| c.size).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![3, 3]);
    assert_eq!(output.labels, vec![1, 1, 1, 2, 2, 2]);
}

#[tokio::test]
async fn every_item_lands_in_exactly_one_cluster() {
    let (corpus, provider) = two_bundle_fixture();
    let output = pipeline::run(&config(0.4), &provider, &corpus).await.unwrap();

    let mut indices: Vec<usize> = output
        .result
        .clusters
        .values()
        .flat_map(|c| c.items.iter().map(|i| i.index))
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);

    // Contiguous ids from 1, count matching clustering_info.
    let ids: BTreeSet<usize> = output
        .result
        .clusters
        .values()
        .map(|c| c.cluster_id)
        .collect();
    let expected: BTreeSet<usize> = (1..=output.result.clustering_info.n_clusters).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn identical_runs_produce_identical_assignments() {
    let (corpus, provider) = two_bundle_fixture();
    let cfg = config(0.4);

    let first = pipeline::run(&cfg, &provider, &corpus).await.unwrap();
    let second = pipeline::run(&cfg, &provider, &corpus).await.unwrap();
    assert_eq!(first.labels, second.labels);
    assert_eq!(first.result.clusters, second.result.clusters);
}

#[tokio::test]
async fn lower_threshold_never_yields_fewer_clusters() {
    let (corpus, provider) = two_bundle_fixture();

    let mut previous = usize::MAX;
    for threshold in [0.0, 0.01, 0.1, 0.4, 1.0, 2.0] {
        let output = pipeline::run(&config(threshold), &provider, &corpus)
            .await
            .unwrap();
        let count = output.result.clustering_info.n_clusters;
        assert!(
            count <= previous,
            "threshold {threshold} produced {count} clusters, more than {previous} at a lower threshold"
        );
        previous = count;
    }
}

#[tokio::test]
async fn single_valid_item_reports_trivial_cluster_with_null_metrics() {
    let provider = StubProvider::new().with_vector("p0", "s0", vec![1.0, 0.0]);
    let corpus = corpus(vec![opinion("p0", "s0")], Vec::new());

    let output = pipeline::run(&config(0.4), &provider, &corpus).await.unwrap();
    assert_eq!(output.result.clustering_info.n_clusters, 1);
    assert_eq!(output.result.evaluation_metrics.silhouette_score, None);
    assert_eq!(
        output.result.evaluation_metrics.calinski_harabasz_score,
        None
    );
    assert_eq!(output.labels, vec![1]);

    // Null must be explicit in the serialized artifact.
    let json = serde_json::to_value(&output.result).unwrap();
    assert!(json["evaluation_metrics"]["silhouette_score"].is_null());
}

#[tokio::test]
async fn zero_threshold_yields_all_singletons() {
    let fixtures: Vec<(&str, Vec<f32>)> = vec![
        ("a", vec![1.0, 0.0]),
        ("b", vec![0.8, 0.6]),
        ("c", vec![0.6, 0.8]),
        ("d", vec![0.0, 1.0]),
        ("e", vec![-0.6, 0.8]),
    ];
    let mut provider = StubProvider::new();
    let mut ops = Vec::new();
    for (name, vector) in fixtures {
        provider = provider.with_vector(name, name, vector);
        ops.push(opinion(name, name));
    }
    let corpus = corpus(ops, Vec::new());

    let output = pipeline::run(&config(0.0), &provider, &corpus).await.unwrap();
    assert_eq!(output.result.clustering_info.n_clusters, 5);
    assert_eq!(output.labels, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn malformed_opinions_are_counted_not_fatal() {
    let (mut corpus, provider) = two_bundle_fixture();
    corpus.comment_suggestions[0]
        .opinions
        .push(opinion("", ""));

    let output = pipeline::run(&config(0.4), &provider, &corpus).await.unwrap();
    assert_eq!(output.result.run_stats.skipped_malformed, 1);
    assert_eq!(output.result.run_stats.clustered_items, 6);
    assert_eq!(output.result.clustering_info.n_samples, 6);
}

#[tokio::test]
async fn embedding_failures_below_ceiling_drop_items() {
    let (corpus, provider) = two_bundle_fixture();
    // One of six fails: rate ~0.17, under the 0.2 default ceiling.
    let provider = provider.with_failure("p5", "s5");

    let output = pipeline::run(&config(0.4), &provider, &corpus).await.unwrap();
    assert_eq!(output.result.run_stats.embedding_failures, 1);
    assert_eq!(output.result.run_stats.clustered_items, 5);
    assert_eq!(output.result.clustering_info.n_samples, 5);

    // Dropped item's index never appears in the artifact.
    let indices: Vec<usize> = output
        .result
        .clusters
        .values()
        .flat_map(|c| c.items.iter().map(|i| i.index))
        .collect();
    assert!(!indices.contains(&5));
}

#[tokio::test]
async fn embedding_failures_above_ceiling_are_fatal() {
    let (corpus, provider) = two_bundle_fixture();
    let provider = provider
        .with_failure("p3", "s3")
        .with_failure("p4", "s4")
        .with_failure("p5", "s5");

    let err = pipeline::run(&config(0.4), &provider, &corpus)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::EmbeddingFailureRate {
            failed: 3,
            total: 6,
            ..
        }
    ));
}

#[tokio::test]
async fn empty_corpus_is_fatal() {
    let provider = StubProvider::new();
    let corpus = corpus(Vec::new(), Vec::new());

    let err = pipeline::run(&config(0.4), &provider, &corpus)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::TooFewItems { n_items: 0 }));
}

#[tokio::test]
async fn small_clusters_are_flagged_in_the_artifact() {
    // Two bundled items plus one lone direction -> a singleton cluster.
    let provider = StubProvider::new()
        .with_vector("p0", "s0", vec![1.0, 0.0])
        .with_vector("p1", "s1", vec![0.99, 0.14])
        .with_vector("p2", "s2", vec![-1.0, 0.5]);
    let corpus = corpus(
        vec![opinion("p0", "s0"), opinion("p1", "s1"), opinion("p2", "s2")],
        Vec::new(),
    );

    let output = pipeline::run(&config(0.4), &provider, &corpus).await.unwrap();
    assert_eq!(output.result.clustering_info.n_clusters, 2);

    let pair = &output.result.clusters["cluster_1"];
    let lone = &output.result.clusters["cluster_2"];
    assert!(!pair.small);
    assert_eq!(lone.size, 1);
    assert!(lone.small, "undersized cluster must be flagged");
}

#[tokio::test]
async fn ward_linkage_runs_end_to_end() {
    let (corpus, provider) = two_bundle_fixture();
    let cfg = ClusterConfig {
        linkage_method: Linkage::Ward,
        ..config(0.4)
    };

    let output = pipeline::run(&cfg, &provider, &corpus).await.unwrap();
    assert_eq!(output.result.clustering_info.n_clusters, 2);
    assert_eq!(output.labels, vec![1, 1, 1, 2, 2, 2]);
}

#[tokio::test]
async fn exported_artifact_roundtrips_unchanged() {
    let (corpus, provider) = two_bundle_fixture();
    let output = pipeline::run(&config(0.4), &provider, &corpus).await.unwrap();

    let first = serde_json::to_string_pretty(&output.result).unwrap();
    let parsed: opcluster::RunResult = serde_json::from_str(&first).unwrap();
    let second = serde_json::to_string_pretty(&parsed).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn batched_embedding_preserves_item_order() {
    let (corpus, provider) = two_bundle_fixture();
    // Force several small batches through the bounded-concurrency path.
    let cfg = ClusterConfig {
        batch_size: 2,
        embed_workers: 3,
        ..config(0.4)
    };

    let output = pipeline::run(&cfg, &provider, &corpus).await.unwrap();
    assert_eq!(output.labels, vec![1, 1, 1, 2, 2, 2]);
    let indices: Vec<usize> = output.items.iter().map(|i| i.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
}
