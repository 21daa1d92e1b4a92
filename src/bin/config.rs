//! Artifact Graph Config CLI
//!
//! View and manage artifact graph configuration.

use clap::{Parser, Subcommand};
use artifact_graph::GraphConfig;

#[derive(Parser)]
#[command(name = "artifact-config")]
#[command(about = "View and manage artifact graph configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Show {
        /// Config file to load (optional)
        #[arg(short, long)]
        config: Option<String>,

        /// Output as TOML
        #[arg(long)]
        toml: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Initialize a new config file
    Init {
        /// Output path
        #[arg(short, long, default_value = "artifact-graph.toml")]
        output: String,
    },

    /// Validate configuration and check namespace directories
    Validate {
        /// Config file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Show { config, toml, json } => {
            let cfg = GraphConfig::load_from(config.as_deref())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else if toml {
                println!("{}", ::toml::to_string_pretty(&cfg)?);
            } else {
                println!("Artifact Graph Configuration\n");
                println!("Metadata:");
                println!("  Root: {:?}", cfg.metadata.root);
                println!("  Default namespace: {}", cfg.metadata.default_namespace);

                if !cfg.namespaces.is_empty() {
                    println!("\nNamespaces:");
                    for (name, dir) in &cfg.namespaces {
                        println!("  {} -> {:?}", name, dir);
                    }
                }

                println!("\nSearch:");
                println!("  Limit: {}", cfg.search.limit);

                println!("\nLogging:");
                println!("  Filter: {}", cfg.logging.filter);
            }
        }

        Commands::Init { output } => {
            let cfg = GraphConfig::default();
            cfg.save(&output)?;
            println!("✅ Created config file: {}", output);
        }

        Commands::Validate { config } => match GraphConfig::load_from(config.as_deref()) {
            Ok(cfg) => {
                println!("✅ Configuration is valid");
                let mut missing = 0;
                let default_dir = cfg.namespace_dir("");
                let named = cfg.namespaces.keys().map(|ns| (ns.as_str(), cfg.namespace_dir(ns)));
                for (name, dir) in std::iter::once((cfg.metadata.default_namespace.as_str(), default_dir)).chain(named) {
                    if dir.is_dir() {
                        println!("   {}: {:?}", name, dir);
                    } else {
                        println!("   ⚠️  {}: {:?} (missing)", name, dir);
                        missing += 1;
                    }
                }
                if missing > 0 {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("❌ Configuration error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
