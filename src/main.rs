use anyhow::Result;
use std::sync::Arc;

use chronobench::bench::{
    compute_overhead, BenchmarkHarness, BenchmarkReport, MockLlmServer, MockServerConfig,
};
use chronobench::config::Config;
use chronobench::error::HarnessError;
use chronobench::logsvc::{LogService, MemoryLogService, Session};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let mut config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("🚀 Chronobench starting...");

    // Standalone mode: serve the workload locally
    let mut mock_server = None;
    if config.standalone {
        let mut server = MockLlmServer::new(MockServerConfig::default());
        server.start().await?;
        config.server_url = server.url();
        tracing::info!("✅ Mock LLM server started at {}", server.url());
        mock_server = Some(server);
    }

    let workload = config.build_workload()?;
    let harness = BenchmarkHarness::new(config.harness_config());
    tracing::info!(
        workload = workload.name(),
        model = %config.model,
        server_url = %config.server_url,
        iterations = config.iterations,
        logging = config.logging_enabled,
        "Benchmark configured"
    );

    let without = harness.run_without_logging(workload.as_ref()).await;
    let mut report = BenchmarkReport::new(workload.name(), &without);
    let mut setup_failed = false;

    if config.logging_enabled {
        let service: Arc<dyn LogService> = Arc::new(MemoryLogService::new());
        let mut session = Session::new(config.client_config(), service);
        let target = config.stream_target()?;

        report = match harness.run_logged(workload.as_ref(), &mut session, &target).await {
            Ok(run) => match compute_overhead(&run.result, &without) {
                Ok(overhead) => report.with_logged_run(&run.result, &without, &overhead, &run.cleanup),
                Err(e) => report.with_logging_error(e),
            },
            Err(e @ HarnessError::Setup(_)) => {
                tracing::error!("❌ Logging setup failed: {}", e);
                setup_failed = true;
                report.with_logging_error(e)
            }
            Err(e) => {
                tracing::error!("❌ Logged run aborted: {}", e);
                let report = match &e {
                    HarnessError::Append {
                        cleanup: Some(cleanup),
                        ..
                    } => report.with_cleanup(cleanup),
                    _ => report,
                };
                report.with_logging_error(e)
            }
        };
    } else {
        tracing::info!("Logging disabled, skipping logged run");
    }

    if config.json {
        println!("{}", report.to_json());
    } else {
        report.print_table();
    }

    if let Some(mut server) = mock_server {
        server.stop();
    }

    if setup_failed {
        std::process::exit(1);
    }

    tracing::info!("👋 Benchmark complete");
    Ok(())
}
