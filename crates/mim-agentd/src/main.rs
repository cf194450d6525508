mod config;
mod worker;
mod workload;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mim_core::ImageAllocator;
use mim_model::{DeviceId, LabelId};
use mim_observe::{LoggerTimeZone, init_local_offset, init_logger};
use mim_prometheus::{PrometheusMetrics, TextEncoder};

use crate::{
    config::{AgentConfig, Cli},
    worker::{Timing, run_device},
    workload::Workload,
};

fn main() -> anyhow::Result<()> {
    // 1) config
    let cli = Cli::parse();
    let mut cfg = AgentConfig::load(&cli.config)?;
    cli.apply(&mut cfg.logger);

    // 2) logger; the local offset must be read before any thread starts
    if cfg.logger.tz == LoggerTimeZone::Local {
        init_local_offset();
    }
    init_logger(&cfg.logger)?;
    info!(config = %cli.config.display(), "logger initialized");

    // 3) runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(cli, cfg))
}

async fn run(cli: Cli, cfg: AgentConfig) -> anyhow::Result<()> {
    // 4) allocator + initial plan
    let metrics = PrometheusMetrics::new()?;
    let mut allocator =
        ImageAllocator::from_pool(&cfg.pool)?.with_metrics(Arc::new(metrics.clone()));
    let bound = allocator
        .initialize()
        .context("cannot schedule every label on this pool")?;
    info!(
        bound,
        labels = allocator.labels().len(),
        devices = allocator.devices().len(),
        "pool planned"
    );

    let workload = Arc::new(Workload::new(&allocator, &cfg.workload));
    let allocator = Arc::new(allocator);

    // 5) shutdown on ctrl-c
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping device workers");
                cancel.cancel();
            }
        });
    }

    // 6) one worker per device
    let timing = Timing {
        flash: cfg.flash_time(),
        run: cfg.run_time(),
    };
    let mut workers = JoinSet::new();
    for d in 0..allocator.devices().len() {
        workers.spawn(run_device(
            allocator.clone(),
            workload.clone(),
            DeviceId::new(d),
            timing,
            cancel.clone(),
        ));
    }

    let mut runs = 0;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(report) => {
                info!(
                    device = report.device,
                    images = report.images.len(),
                    runs = report.runs,
                    "device finished"
                );
                runs += report.runs;
            }
            Err(err) => error!(error = %err, "device worker failed"),
        }
    }

    // 7) summary
    for event in allocator.ledger().events() {
        debug!(
            seq = event.seq,
            label = allocator.label(event.label).name(),
            device = allocator.device(event.device).name(),
            source = event.source.as_label(),
            "ledger"
        );
    }
    for (i, label) in allocator.labels().iter().enumerate() {
        let id = LabelId::new(i);
        info!(
            label = label.name(),
            reimages = allocator.reimage_count(id),
            unfinished = workload.remaining(id),
            "label summary"
        );
    }
    info!(runs, reimages = allocator.ledger().len(), "session done");

    if cli.metrics {
        let text = TextEncoder::new()
            .encode_to_string(&metrics.gather())
            .context("failed to encode metrics")?;
        print!("{text}");
    }
    Ok(())
}
