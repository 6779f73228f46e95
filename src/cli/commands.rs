use crate::cli::Commands;
use crate::config::{AppConfig, Definitions};
use crate::dif::Topology;
use crate::metrics::{encode_text, EngineMetrics};
use crate::query::{MetricQuerier, StaticQuerier};
use crate::reconcile::ReconcilerRegistry;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Collect {
            config,
            output,
            pretty,
            replay,
            self_metrics,
            show_skipped,
        } => {
            handle_collect(CollectArgs {
                config,
                output,
                pretty,
                replay,
                self_metrics,
                show_skipped,
            })
            .await
        }
        Commands::CheckConfig { config } => handle_check_config(&config),
    }
}

struct CollectArgs {
    config: PathBuf,
    output: Option<PathBuf>,
    pretty: bool,
    replay: Option<PathBuf>,
    self_metrics: Option<PathBuf>,
    show_skipped: bool,
}

fn load_definitions(config: &AppConfig, replay: Option<&Path>) -> Result<Definitions> {
    match replay {
        Some(path) => {
            info!("Replaying captured responses from {}", path.display());
            let contents = std::fs::read_to_string(path)?;
            let querier: Arc<dyn MetricQuerier> =
                Arc::new(StaticQuerier::from_replay_json("replay", &contents)?);
            config.build_with(&ReconcilerRegistry::default(), |_, _| Ok(querier.clone()))
        }
        None => config.build(),
    }
}

async fn handle_collect(args: CollectArgs) -> Result<()> {
    let config = AppConfig::load(&args.config)?;
    let metrics = Arc::new(EngineMetrics::new()?);
    let provider = load_definitions(&config, args.replay.as_deref())?
        .into_provider()
        .with_metrics(metrics.clone());

    let report = provider.get_entity_metrics().await;

    if args.show_skipped {
        for diag in &report.diagnostics {
            eprintln!("skipped {}", diag);
        }
    }

    let mut topology = Topology::new(report.entities);
    if let Some(scope) = &config.scope {
        topology = topology.with_scope(scope.clone());
    }
    let json = topology.to_json(args.pretty)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("Wrote {} entities to {}", topology.topology.len(), path.display());
        }
        None => println!("{}", json),
    }

    if let Some(path) = &args.self_metrics {
        std::fs::write(path, encode_text(metrics.registry())?)?;
    }

    Ok(())
}

fn handle_check_config(path: &Path) -> Result<()> {
    let config = AppConfig::load(path)?;
    let definitions = load_definitions(&config, None)?;

    println!("Configuration {} is valid", path.display());
    println!("  servers:   {}", definitions.sources.len());
    println!("  exporters: {}", definitions.exporters.len());
    println!("  entities:  {}", definitions.entity_def_count());
    println!("  queries:   {}", definitions.query_count());

    for (name, server) in &config.servers {
        for exporter in &server.exporters {
            if !definitions.exporters.contains_key(exporter) {
                println!("  note: server {} references undefined exporter {}", name, exporter);
            }
        }
    }
    Ok(())
}
