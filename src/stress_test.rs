//! Concurrent reader stress test.
//!
//! A random branching history is committed first. Reader tasks then share
//! the resulting graph and hammer merges, resolved views and cache eviction
//! at the same time, checking every answer against one computed up front.

use async_stream::stream;
use colored::*;
use futures::stream::{Stream, StreamExt};
use lineage_core::{Path, Version, DEFAULT_BRANCH};
use lineage_graph::{GraphConfig, GraphError, Merge, VersionGraph};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Parameters of one stress run.
#[derive(Clone, Debug)]
pub struct StressConfig {
    /// Number of concurrent reader tasks.
    pub readers: usize,
    /// Number of versions in the generated history.
    pub versions: usize,
    /// Number of branches the history is spread over.
    pub branches: usize,
    /// Operations performed by each reader.
    pub rounds: usize,
    /// Each reader evicts every cache once per this many operations.
    pub evict_every: usize,
    /// Distinct paths written by the generated history.
    pub paths: usize,
    /// Seed for the history generator; random when absent.
    pub seed: Option<u64>,
    pub graph: GraphConfig,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            readers: 8,
            versions: 500,
            branches: 4,
            rounds: 200,
            evict_every: 25,
            paths: 16,
            seed: None,
            graph: GraphConfig::default(),
        }
    }
}

/// Statistics collected during a stress run.
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub readers: usize,
    pub versions: usize,
    pub conflicts: usize,
    pub operations: usize,
    pub mismatches: usize,
    pub build_time: Duration,
    pub total_time: Duration,
    pub ops_per_second: f64,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                        ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Readers:                   {:>30} ║", self.readers);
        println!("║  Versions:                  {:>30} ║", self.versions);
        println!("║  Conflicting paths:         {:>30} ║", self.conflicts);
        println!("║  Reader operations:         {:>30} ║", self.operations);
        println!("║  Mismatches:                {:>30} ║", self.mismatches);
        println!("║  Build Time:                {:>29}s ║", format!("{:.3}", self.build_time.as_secs_f64()));
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Operations/Second:         {:>30.0} ║", self.ops_per_second);
        println!("╚════════════════════════════════════════════════════════════╝");

        if self.mismatches == 0 {
            println!("\n  {} {}", "✓".bright_green().bold(), "every reader saw identical results".bright_green());
        } else {
            println!("\n  {} {}", "✗".bright_red().bold(), "readers disagreed".bright_red().bold());
        }
    }
}

/// One step of the generated history.
struct Edit {
    branch: usize,
    /// Branch whose heads are merged into this version, if any.
    merge_from: Option<usize>,
    writes: Vec<(usize, Option<u32>)>,
}

/// Generator that yields random edits spread over the configured branches.
fn edit_generator(config: &StressConfig, seed: u64) -> impl Stream<Item = Edit> {
    let versions = config.versions;
    let branches = config.branches.max(1);
    let paths = config.paths.max(1);
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..versions {
            let branch = rng.gen_range(0..branches);
            let merge_from = rng.gen_bool(0.15).then(|| rng.gen_range(0..branches));
            let writes = (0..rng.gen_range(1..4))
                .map(|_| {
                    let path = rng.gen_range(0..paths);
                    let value = (!rng.gen_bool(0.1)).then(|| rng.gen_range(0..8));
                    (path, value)
                })
                .collect();
            yield Edit { branch, merge_from, writes };
        }
    }
}

fn branch_name(index: usize) -> String {
    if index == 0 {
        DEFAULT_BRANCH.to_string()
    } else {
        format!("branch-{}", index)
    }
}

fn path_for(index: usize) -> Path {
    Path::root().property("fields").index((index % 4) as u64).property(format!("f{}", index))
}

/// Commit the generated history, one version per commit.
async fn build_history(config: &StressConfig, seed: u64) -> Result<VersionGraph, GraphError> {
    let mut graph = VersionGraph::with_config(config.graph);
    let mut edits = Box::pin(edit_generator(config, seed));

    while let Some(edit) = edits.next().await {
        let branch = branch_name(edit.branch);
        let mut parents: Vec<_> = graph.heads(&branch).iter().map(|head| *head.revision()).collect();
        if let Some(other) = edit.merge_from {
            parents.extend(graph.heads(&branch_name(other)).iter().map(|head| *head.revision()));
        }

        let version: Version = Version::builder()
            .with_branch(branch)
            .with_parents(parents)
            .with_changeset(
                edit.writes
                    .into_iter()
                    .map(|(path, value)| (path_for(path), value.map(|v| json!(v)))),
            )
            .build()?;
        graph = graph.commit([version])?;
    }
    Ok(graph)
}

/// Answers every reader must reproduce.
struct Expected {
    branches: Vec<String>,
    all: Merge,
    per_branch: Vec<Merge>,
    tip: BTreeMap<Path, Value>,
}

impl Expected {
    fn compute(graph: &VersionGraph) -> Result<Self, GraphError> {
        let branches: Vec<String> = graph.branches().into_iter().collect();
        let per_branch = branches
            .iter()
            .map(|branch| graph.merge_branches([branch]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expected {
            all: graph.merge_branches(&branches)?,
            per_branch,
            tip: graph.tip().map(|tip| tip.resolved_properties()).unwrap_or_default(),
            branches,
        })
    }
}

/// Run `rounds` random read operations; returns (operations, mismatches).
async fn reader(
    id: usize,
    graph: VersionGraph,
    expected: std::sync::Arc<Expected>,
    rounds: usize,
    evict_every: usize,
) -> Result<(usize, usize), GraphError> {
    let mut rng = StdRng::from_entropy();
    let mut mismatches = 0;

    for round in 0..rounds {
        let matches = match rng.gen_range(0..3) {
            0 => graph.merge_branches(&expected.branches)? == expected.all,
            1 => {
                let pick = rng.gen_range(0..expected.branches.len().max(1));
                match expected.branches.get(pick) {
                    Some(branch) => graph.merge_branches([branch])? == expected.per_branch[pick],
                    None => true,
                }
            }
            _ => graph.tip().map(|tip| tip.resolved_properties()).unwrap_or_default() == expected.tip,
        };
        if !matches {
            mismatches += 1;
        }

        if evict_every > 0 && round % evict_every == evict_every - 1 {
            debug!(reader = id, round, "evicting caches");
            graph.evict_caches();
        }
        if round % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }
    Ok((rounds, mismatches))
}

/// Build a random history and read it concurrently.
pub async fn stress_test_readers(config: StressConfig) -> Result<StressTestStats, Box<dyn std::error::Error>> {
    let seed = config.seed.unwrap_or_else(rand::random);
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Version Graph Stress Test (Async)                   ║");
    println!("║  Readers: {} | Versions: {} | Branches: {} | Seed: {}",
             config.readers, config.versions, config.branches, seed);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();

    println!("\n[Phase 1/2] Committing random history...");
    let graph = build_history(&config, seed).await?;
    let expected = std::sync::Arc::new(Expected::compute(&graph)?);
    graph.evict_caches();
    let build_time = start.elapsed();
    info!(versions = graph.len(), branches = expected.branches.len(), "history committed");
    println!("[Phase 1/2] ✓ Completed");

    println!("[Phase 2/2] Reading concurrently...");
    let handles: Vec<_> = (0..config.readers)
        .map(|id| {
            tokio::spawn(reader(
                id,
                graph.clone(),
                std::sync::Arc::clone(&expected),
                config.rounds,
                config.evict_every,
            ))
        })
        .collect();

    let mut operations = 0;
    let mut mismatches = 0;
    for result in futures::future::join_all(handles).await {
        let (ops, missed) = result??;
        operations += ops;
        mismatches += missed;
    }
    println!("[Phase 2/2] ✓ Completed");

    let total_time = start.elapsed();
    let read_time = total_time.saturating_sub(build_time).as_secs_f64();
    Ok(StressTestStats {
        readers: config.readers,
        versions: graph.len(),
        conflicts: expected.all.conflicts().len(),
        operations,
        mismatches,
        build_time,
        total_time,
        ops_per_second: if read_time > 0.0 { operations as f64 / read_time } else { 0.0 },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> StressConfig {
        StressConfig {
            readers: 4,
            versions: 60,
            branches: 3,
            rounds: 40,
            evict_every: 7,
            seed: Some(7),
            graph: GraphConfig {
                cache_capacity: 24,
                ..GraphConfig::default()
            },
            ..StressConfig::default()
        }
    }

    #[tokio::test]
    async fn test_history_is_deterministic_per_seed() {
        let config = small();
        let a = build_history(&config, 42).await.unwrap();
        let b = build_history(&config, 42).await.unwrap();

        assert_eq!(a.len(), 60);
        assert_eq!(a.branches(), b.branches());
        let merge_a = a.merge_branches(a.branches()).unwrap();
        let merge_b = b.merge_branches(b.branches()).unwrap();
        assert_eq!(merge_a.properties(), merge_b.properties());
    }

    #[tokio::test]
    async fn test_readers_agree() {
        let stats = stress_test_readers(small()).await.unwrap();
        assert_eq!(stats.mismatches, 0);
        assert_eq!(stats.operations, 4 * 40);
        assert_eq!(stats.versions, 60);
    }
}
