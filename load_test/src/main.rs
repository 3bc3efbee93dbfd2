use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use load_test::cli::{Cli, Mode};
use load_test::metrics::{reporter, MetricsCollector};
use load_test::{PhaseOrchestrator, RunContext};

fn init_tracing(verbose: bool) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.mode {
        Mode::Plan(args) => {
            init_tracing(args.config.verbose)?;
            let config = args.config.load()?;

            for phase in config.phases() {
                println!("{} [{}] failure policy {:?}", phase.name, phase.scenario, phase.failure_policy);
                print!("{}", phase.injection.plan());
            }
        }

        Mode::Run(args) => {
            init_tracing(args.config.verbose)?;
            let config = args.load()?;

            let run_id = Uuid::new_v4();
            tracing::info!("RADAR-base Load Test Starting...");
            tracing::info!("Run: {}", run_id);
            tracing::info!("Base URL: {}", config.base_url);
            tracing::info!("Project: {} / {}", config.organization_name, config.project_name);
            tracing::info!("Participants: {}", config.participants);
            tracing::info!(
                "Payload: {} x {} answers, {} format",
                config.data.messages_per_request,
                config.data.answers_per_message,
                config.data.format
            );

            let metrics = MetricsCollector::new();
            let context = Arc::new(RunContext::from_config(config, metrics.clone())?);
            let phases = context.config.phases();

            let live = (args.report_interval > 0).then(|| {
                tokio::spawn(reporter::start_periodic_reporter(metrics.clone(), args.report_interval))
            });

            let result = PhaseOrchestrator::new(context)
                .run(&phases)
                .instrument(tracing::info_span!("run", %run_id))
                .await;

            if let Some(live) = live {
                live.abort();
            }
            metrics.update_system_metrics();
            reporter::print_final_report(&metrics);

            let reports = result?;
            for report in &reports {
                tracing::info!(
                    "{}: {} sessions, {} failed, {:.1}s",
                    report.name,
                    report.outcome.started,
                    report.outcome.failed,
                    report.elapsed.as_secs_f64()
                );
            }
            tracing::info!("Load test complete");
        }
    }

    Ok(())
}
