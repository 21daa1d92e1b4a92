//! Artifact Graph CLI
//!
//! Query the dependency graph of a metadata namespace.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use artifact_graph::{
    describe_failure, Artifact, ArtifactKind, ArtifactRef, ArtifactRegistry, DependencyGraph,
    GraphConfig, RegistryCache,
};

#[derive(Parser)]
#[command(name = "artifact-graph")]
#[command(about = "Query artifact dependencies and their users")]
struct Cli {
    /// Config file to load (optional)
    #[arg(short, long)]
    config: Option<String>,

    /// Metadata root, overriding the configured one
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Namespace to load (defaults to the configured namespace)
    #[arg(short, long, default_value = "")]
    namespace: String,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List what an artifact references (e.g. `service:createParty`)
    Refs { artifact: String },

    /// List the artifacts that reference an artifact
    Users { artifact: String },

    /// Fuzzy search over loaded artifacts
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Case-sensitive substring search over loaded artifact names
    Find { partial: String },

    /// Transitive dependents of an artifact (or dependencies with --forward)
    Impact {
        artifact: String,
        #[arg(short, long)]
        depth: Option<usize>,
        #[arg(long)]
        forward: bool,
    },

    /// List reference cycles
    Cycles,

    /// Show registry statistics
    Stats,
}

fn main() {
    let cli = Cli::parse();

    let config = match GraphConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli, mut config: GraphConfig) -> anyhow::Result<()> {
    if let Some(root) = cli.root {
        config.metadata.root = root;
    }
    let search_limit = config.search.limit;
    let namespace = config.resolve_namespace(&cli.namespace).to_string();

    let cache = RegistryCache::new(config);
    let registry = cache
        .get(&namespace)
        .with_context(|| format!("could not build dependency graph for namespace {}", namespace))?;

    match cli.command {
        Commands::Refs { artifact } => {
            let artifact = resolve(&registry, &artifact)?;
            let refs: Vec<String> = artifact.references().iter().map(|r| r.to_string()).collect();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&refs)?);
            } else {
                println!("{} references {} artifact(s)", artifact, refs.len());
                for r in refs {
                    println!("  → {}", r);
                }
            }
        }

        Commands::Users { artifact } => {
            let artifact = resolve(&registry, &artifact)?;
            let users = registry.all_referrers(&artifact.artifact_ref());
            if cli.json {
                let summaries: Vec<_> = users.iter().map(Artifact::summary).collect();
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                println!("{} is used by {} artifact(s)", artifact, users.len());
                for user in users {
                    println!("  ← {}", user);
                }
            }
        }

        Commands::Search { query, limit } => {
            let hits = registry.search(&query, limit.unwrap_or(search_limit));
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for hit in hits {
                    println!("{:>5}  {}:{}", hit.score, hit.artifact.kind, hit.artifact.id);
                }
            }
        }

        Commands::Find { partial } => {
            let found = registry.find_by_partial_name(&partial);
            if cli.json {
                let summaries: Vec<_> = found.iter().map(Artifact::summary).collect();
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for artifact in found {
                    println!("{}", artifact);
                }
            }
        }

        Commands::Impact { artifact, depth, forward } => {
            let artifact = resolve(&registry, &artifact)?;
            let graph = DependencyGraph::from_registry(&registry);
            let target = artifact.artifact_ref();
            let closure = if forward {
                graph.dependencies(&target, depth)
            } else {
                graph.dependents(&target, depth)
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&closure)?);
            } else {
                let label = if forward { "dependencies" } else { "dependents" };
                println!("{} {} of {}", closure.len(), label, artifact);
                for node in closure {
                    let marker = if node.in_cycle { " (cycle)" } else { "" };
                    let indent = "  ".repeat(node.depth);
                    println!("{}{}:{}{}", indent, node.kind, node.id, marker);
                }
            }
        }

        Commands::Cycles => {
            let cycles = DependencyGraph::from_registry(&registry).cycles();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&cycles)?);
            } else if cycles.is_empty() {
                println!("No reference cycles");
            } else {
                for (i, cycle) in cycles.iter().enumerate() {
                    println!("Cycle {} ({} artifacts)", i + 1, cycle.members.len());
                    for member in &cycle.members {
                        println!("  {}", member);
                    }
                }
            }
        }

        Commands::Stats => {
            let stats = registry.stats();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Namespace: {}", stats.namespace);
                println!("Built at: {}", stats.built_at.to_rfc3339());
                if let Some(digest) = &stats.source_digest {
                    println!("Source digest: {}", digest);
                }
                for count in &stats.counts {
                    println!("  {:<20} {}", count.kind.to_string(), count.count);
                }
                println!("  {:<20} {}", "total", stats.total);
                println!("Referenced targets: {}", stats.reverse_entries);
            }
        }
    }

    Ok(())
}

/// Parse `kind:id` and resolve it through the registry, constructing it if needed
fn resolve(registry: &ArtifactRegistry, input: &str) -> anyhow::Result<Artifact> {
    let (kind, id) = input
        .split_once(':')
        .ok_or_else(|| anyhow!("expected kind:id, got '{}'", input))?;
    let kind: ArtifactKind = kind.parse().map_err(|e: String| anyhow!(e))?;
    let target = ArtifactRef::named(kind, id)
        .ok_or_else(|| anyhow!("{} artifacts are reached through their service", kind))?;

    registry
        .artifact(&target)
        .map_err(|e| anyhow!(describe_failure(&target, &e)))
}
