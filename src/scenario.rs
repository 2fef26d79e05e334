//! Guided walk-through of branching, merging and conflict reporting.

use colored::*;
use lineage_core::{Path, Revision, Version, DEFAULT_BRANCH};
use lineage_graph::{GraphError, Merge, VersionGraph};
use lineage_store::{DocumentId, DocumentRepository, MemoryVersionStore, StoreError};
use serde_json::{json, Value};
use std::collections::BTreeMap;

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn show_properties(properties: &BTreeMap<Path, Value>) {
    for (path, value) in properties {
        println!("    {:<12} = {}", path.to_string().bright_white(), value);
    }
}

fn show_merge(merge: &Merge, names: &BTreeMap<Revision, &str>) {
    let heads: Vec<&str> = merge
        .merge_heads()
        .iter()
        .map(|revision| names.get(revision).copied().unwrap_or("?"))
        .collect();
    step(&format!("merge heads: {}", heads.join(", ").bright_magenta()));
    show_properties(merge.properties());

    if merge.has_conflicts() {
        for (path, losers) in merge.conflicts() {
            let values: Vec<String> = losers
                .iter()
                .map(|loser| {
                    let value = loser
                        .value
                        .as_ref()
                        .map_or_else(|| "<deleted>".to_string(), Value::to_string);
                    let name = names.get(&loser.revision).copied().unwrap_or("?");
                    format!("{} from {}", value, name)
                })
                .collect();
            println!(
                "  {} conflict on {}: {}",
                "✗".bright_red().bold(),
                path.to_string().bright_white(),
                values.join(", ").bright_red()
            );
        }
    } else {
        println!("  {} {}", "✓".bright_green().bold(), "no conflicts".bright_green());
    }
}

fn version(branch: &str, parents: &[&Version], changes: &[(&str, Value)]) -> Result<Version, GraphError> {
    let mut builder = Version::builder()
        .with_branch(branch)
        .with_parents(parents.iter().map(|parent| *parent.revision()));
    for (path, value) in changes {
        let path = Path::parse(path)?;
        builder = if value.is_null() {
            builder.with_tombstone(path)
        } else {
            builder.with_value(path, value.clone())
        };
    }
    Ok(builder.build()?)
}

// ─── Walk-through ──────────────────────────────────────────────────────────

/// Run the walk-through, printing every step.
pub fn run_scenario() -> Result<(), StoreError> {
    header("SCENARIO — Branches, Merges and Conflicts");

    section("Phase 1: Build a history with two branches");
    let v1 = version(
        DEFAULT_BRANCH,
        &[],
        &[("firstName", json!("John")), ("lastName", json!("Doe"))],
    )?;
    let v2 = version(DEFAULT_BRANCH, &[&v1], &[("status", json!("Single"))])?;
    let v3 = version("alt", &[&v1], &[("mood", json!("Lonely"))])?;
    let v4 = version(
        "alt",
        &[&v3],
        &[
            ("lastName", json!("Foe")),
            ("status", json!("Just married")),
            ("mood", json!("Ecstatic")),
            ("married", json!("2013-10-12")),
        ],
    )?;
    step("V1 (default): firstName = John, lastName = Doe");
    step("V2 (default, parent V1): status = Single");
    step("V3 (alt, parent V1): mood = Lonely");
    step("V4 (alt, parent V3): lastName = Foe, status = Just married, mood = Ecstatic, married");

    let mut names = BTreeMap::new();
    for (name, v) in [("V1", &v1), ("V2", &v2), ("V3", &v3), ("V4", &v4)] {
        names.insert(*v.revision(), name);
    }

    let repo: DocumentRepository<MemoryVersionStore> = DocumentRepository::new(MemoryVersionStore::new());
    let id = DocumentId::new();
    let graph = repo.commit_versions(
        &id,
        &VersionGraph::new(),
        vec![v1.clone(), v2.clone(), v3.clone(), v4.clone()],
    )?;

    section("Phase 2: Merge V2 with V4");
    let merge = graph.merge_revisions([*v2.revision(), *v4.revision()])?;
    show_merge(&merge, &names);
    step("lastName: Doe was seen by V4 before it wrote Foe, so it is not a conflict");

    section("Phase 3: Merge the branches in a new version");
    let v5 = version(DEFAULT_BRANCH, &[&v2], &[("mood", json!("Ecstatic"))])?;
    let v6 = version(
        DEFAULT_BRANCH,
        &[&v5, &v4],
        &[("mood", Value::Null), ("married", Value::Null)],
    )?;
    names.insert(*v5.revision(), "V5");
    names.insert(*v6.revision(), "V6");
    step("V5 (default, parent V2): mood = Ecstatic");
    step("V6 (default, parents V5 + V4): delete mood and married");
    let graph = repo.commit_versions(&id, &graph, vec![v5, v6.clone()])?;

    let node = graph.get_version_node(v6.revision())?;
    step("V6 resolves to:");
    show_properties(&node.resolved_properties());

    let merge = graph.merge_branches([DEFAULT_BRANCH, "alt"])?;
    show_merge(&merge, &names);

    section("Phase 4: Settle the conflict");
    let v7 = version(DEFAULT_BRANCH, &[&v6], &[("status", json!("Married"))])?;
    names.insert(*v7.revision(), "V7");
    step("V7 (default, parent V6): status = Married");
    let graph = repo.commit_versions(&id, &graph, vec![v7])?;
    show_merge(&graph.merge_branches([DEFAULT_BRANCH, "alt"])?, &names);

    section("Phase 5: Reload from the store");
    let reloaded = repo.load_graph(&id)?;
    step(&format!("{} versions reloaded", reloaded.len()));
    let document = repo.read_document(&reloaded, [DEFAULT_BRANCH, "alt"])?;
    step(&format!("document: {}", document.to_string().bright_white()));

    let before = graph.merge_branches([DEFAULT_BRANCH, "alt"])?;
    let after = reloaded.merge_branches([DEFAULT_BRANCH, "alt"])?;
    if before == after {
        println!("  {} {}", "✓".bright_green().bold(), "reloaded graph merges identically".bright_green());
    } else {
        println!("  {} {}", "✗".bright_red().bold(), "reloaded graph differs".bright_red().bold());
    }
    Ok(())
}
