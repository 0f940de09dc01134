//! podpack — simulate node provisioning for pending pods.
//!
//! Reads a scenario file, routes every pod to the first provisioner that
//! admits it, then runs one first-fit pass per provisioner and prints the
//! candidate nodes that would be launched.
//!
//! # Usage
//!
//! ```text
//! podpack simulate --config demos/zonal-spread.toml --format json
//! podpack catalog --config demos/zonal-spread.toml
//! ```

mod config;
mod report;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use podpack_api::Pod;
use podpack_cloudprovider::CloudProvider;
use podpack_scheduling::{Scheduler, select_provisioner};

use crate::config::ScenarioConfig;
use crate::report::{Catalog, ProvisionerReport, SimulationReport, UnschedulablePod};

#[derive(Parser)]
#[command(name = "podpack", about = "Simulate node provisioning for pending pods")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pack the scenario's pods onto candidate nodes.
    Simulate {
        /// Scenario file.
        #[arg(short, long)]
        config: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// List the scenario's instance types.
    Catalog {
        /// Scenario file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,podpack=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Simulate { config, format } => simulate(&config, format).await,
        Command::Catalog { config } => catalog(&config),
    }
}

async fn simulate(path: &Path, format: Format) -> anyhow::Result<()> {
    let scenario = ScenarioConfig::from_file(path)?;
    let instance_types = scenario.catalog()?.instance_types()?;
    let provisioners = scenario.provisioners();
    let pods = scenario.pods();
    info!(
        path = %path.display(),
        provisioners = provisioners.len(),
        instance_types = instance_types.len(),
        pods = pods.len(),
        "scenario loaded"
    );

    let mut routed: BTreeMap<String, Vec<Pod>> = BTreeMap::new();
    let mut unroutable = Vec::new();
    for pod in pods {
        match select_provisioner(&provisioners, &pod) {
            Ok(provisioner) => routed.entry(provisioner.name.clone()).or_default().push(pod),
            Err(e) => {
                warn!(pod = %pod.key(), error = %e, "no provisioner for pod");
                unroutable.push(UnschedulablePod::new(&pod, &e));
            }
        }
    }

    // Passes share nothing, so each runs on its own blocking thread.
    let mut passes = Vec::new();
    for provisioner_config in &scenario.provisioners {
        let name = provisioner_config.provisioner.name.clone();
        let Some(pods) = routed.remove(&name) else {
            continue;
        };
        let scheduler = Scheduler::new(
            provisioner_config.provisioner.clone(),
            instance_types.clone(),
            provisioner_config.daemon_overhead.clone(),
        );
        passes.push(tokio::task::spawn_blocking(move || {
            let schedule = scheduler.solve(&pods);
            ProvisionerReport::from_schedule(&name, &schedule)
        }));
    }

    let mut reports = Vec::with_capacity(passes.len());
    for pass in passes {
        reports.push(pass.await?);
    }

    let report = SimulationReport {
        provisioners: reports,
        unroutable,
    };
    info!(
        nodes = report.node_count(),
        unschedulable = report.unschedulable_count(),
        "simulation complete"
    );

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => println!("{report}"),
    }
    Ok(())
}

fn catalog(path: &Path) -> anyhow::Result<()> {
    let scenario = ScenarioConfig::from_file(path)?;
    let catalog = scenario.catalog()?;
    info!(provider = catalog.name(), "catalog loaded");
    print!("{}", Catalog(&catalog.instance_types()?));
    Ok(())
}
