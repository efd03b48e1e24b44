//! labs: verify and replay pipeline journals shipped from field devices

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use labs_model::{Sop, SopId};
use labs_pipeline::{CategoryResolver, LabsPipeline, PipelineConfig, PipelineSummary};
use labs_store::{Journal, SopRegistry};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "labs", version)]
#[command(about = "Field knowledge pipeline journal tooling")]
struct Cli {
    /// Pipeline configuration (TOML); defaults apply when omitted
    #[arg(short, long, env = "LABS_CONFIG")]
    config: Option<PathBuf>,

    /// Procedure catalog as a JSON array of SOPs
    #[arg(long, env = "LABS_SOPS")]
    sops: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check a journal's hash chain
    Verify {
        /// Journal file (JSON lines)
        journal: PathBuf,
    },
    /// Rebuild pipeline state from a journal and print a summary
    Replay {
        /// Journal file (JSON lines)
        journal: PathBuf,
        /// Also print every knowledge item
        #[arg(long)]
        items: bool,
        /// Print evidence badges for a procedure (repeatable)
        #[arg(long = "badges", value_name = "SOP_ID")]
        badges: Vec<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::load(path)?),
        None => Ok(PipelineConfig::new()),
    }
}

fn load_catalog(path: Option<&Path>) -> anyhow::Result<SopRegistry> {
    let registry = SopRegistry::new();
    if let Some(path) = path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading procedures from {}", path.display()))?;
        let sops: Vec<Sop> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing procedures in {}", path.display()))?;
        for sop in sops {
            registry
                .register(sop)
                .with_context(|| format!("registering procedures from {}", path.display()))?;
        }
    }
    Ok(registry)
}

fn replay(
    config: PipelineConfig,
    catalog: SopRegistry,
    journal: &Path,
) -> anyhow::Result<LabsPipeline> {
    let pipeline =
        LabsPipeline::replay_file(config, Arc::new(catalog), Arc::new(CategoryResolver), journal)
            .with_context(|| format!("replaying {}", journal.display()))?;
    Ok(pipeline)
}

fn verify(journal: &Path) -> anyhow::Result<usize> {
    let entries =
        Journal::read_from(journal).with_context(|| format!("verifying {}", journal.display()))?;
    Ok(entries.len())
}

fn render_summary(summary: &PipelineSummary) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Verify { journal } => {
            let entries = verify(&journal)?;
            info!(entries, path = %journal.display(), "journal verified");
            println!("ok: {entries} entries");
        }
        Command::Replay {
            journal,
            items,
            badges,
        } => {
            let catalog = load_catalog(cli.sops.as_deref())?;
            let pipeline = replay(config, catalog, &journal)?;
            println!("{}", render_summary(&pipeline.summary())?);
            if items {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&pipeline.knowledge_items())?
                );
            }
            for sop_id in badges {
                let badges = pipeline.evidence_badges(&SopId::new(sop_id));
                println!("{}", serde_json::to_string_pretty(&badges)?);
            }
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use labs_model::Outcome;
    use labs_test_utils::{observe_many, pipeline_with, tile_sop, TILE};

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from([
            "labs", "--sops", "sops.json", "replay", "j.jsonl", "--items", "--badges", "tile-floor",
        ]);
        assert_eq!(cli.sops, Some(PathBuf::from("sops.json")));
        match cli.command {
            Command::Replay { items, badges, .. } => {
                assert!(items);
                assert_eq!(badges, vec!["tile-floor".to_string()]);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["labs", "verify", "j.jsonl"]);
        assert!(matches!(cli.command, Command::Verify { .. }));
    }

    #[test]
    fn test_catalog_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sops.json");
        std::fs::write(&path, serde_json::to_string(&vec![tile_sop()]).unwrap()).unwrap();

        let registry = load_catalog(Some(&path)).unwrap();
        assert_eq!(registry.ids(), vec![tile_sop().id]);
        assert!(load_catalog(None).unwrap().ids().is_empty());
    }

    #[test]
    fn test_catalog_with_gapped_steps_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sops.json");
        let mut raw = serde_json::to_value(vec![tile_sop()]).unwrap();
        raw[0]["steps"][0]["order"] = 5.into();
        raw[0]["steps"][1]["order"] = 0.into();
        std::fs::write(&path, raw.to_string()).unwrap();

        let err = load_catalog(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("sops.json"), "{err:#}");
        assert!(format!("{err:#}").contains("order 5"), "{err:#}");
    }

    #[test]
    fn test_journal_replays_through_the_cli_path() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("journal.jsonl");
        let sops = dir.path().join("sops.json");
        std::fs::write(&sops, serde_json::to_string(&vec![tile_sop()]).unwrap()).unwrap();

        let live = pipeline_with(PipelineConfig::new().with_journal_path(&journal));
        observe_many(&live, TILE, 2, Outcome::Confirmed, 5);
        live.persist_journal().unwrap();

        assert_eq!(verify(&journal).unwrap(), live.store().journal.len());
        let catalog = load_catalog(Some(&sops)).unwrap();
        let replayed = replay(PipelineConfig::new(), catalog, &journal).unwrap();
        assert_eq!(replayed.summary(), live.summary());
        assert_eq!(
            replayed.evidence_badges(&tile_sop().id),
            live.evidence_badges(&tile_sop().id)
        );

        let rendered = render_summary(&replayed.summary()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["observations"], 5);
    }

    #[test]
    fn test_missing_journal_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = verify(&dir.path().join("absent.jsonl")).unwrap_err();
        assert!(err.to_string().contains("absent.jsonl"));
    }

    #[test]
    fn test_default_config_renders() {
        let config = load_config(None).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&rendered).unwrap(), config);
    }
}
