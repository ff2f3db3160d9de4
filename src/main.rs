//! Neurochain demo host
//!
//! Builds the default pipeline from the configuration file, runs the
//! scheduler for a few seconds while changing parameters halfway through,
//! then prints a JSON snapshot of the pipeline.
//!
//! Usage: `neurochain [CONFIG_PATH] [SECONDS]`

use anyhow::Context;
use neurochain::{
    config::PipelineConfig,
    logging,
    pipeline::{PipelineBuilder, Scheduler, SchedulerEvent},
};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_RUN_SECONDS: f64 = 3.0;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from).or_else(PipelineConfig::default_path);
    let run_for = match args.next() {
        Some(s) => s.parse::<f64>().context("SECONDS must be a number")?,
        None => DEFAULT_RUN_SECONDS,
    };

    let config = PipelineConfig::load_or_default(config_path.as_ref());
    let _log_guard = logging::init(&config.logging).context("Failed to initialize logging")?;

    tracing::info!("Starting Neurochain demo");
    if let Some(path) = &config_path {
        tracing::debug!("Config path: {}", path.display());
    }

    let (mut pipeline, ids, chunks) = PipelineBuilder::new(config.clone())
        .gain(2.0)
        .build()
        .context("Failed to build pipeline")?;
    pipeline
        .initialize_all()
        .context("Failed to initialize pipeline")?;

    let mut scheduler = Scheduler::new(pipeline, config.scheduler.clone())?;
    let events = scheduler.events();

    // Host side of the sink: count what arrives.
    let consumer = std::thread::spawn(move || {
        let mut received = 0u64;
        while let Ok(chunk) = chunks.recv() {
            received += 1;
            if received == 1 {
                tracing::info!(
                    "First chunk on '{}': {} x {}",
                    chunk.stream_name,
                    chunk.data.rows(),
                    chunk.data.columns()
                );
            }
        }
        received
    });

    scheduler.start()?;
    let half = Duration::from_secs_f64(run_for.max(0.0) / 2.0);
    std::thread::sleep(half);

    // Gain applies on the next chunk; channel_count resets the source and
    // reinitializes everything observing its layout.
    scheduler.with_pipeline(|p| -> neurochain::Result<()> {
        p.set_parameter(ids.gain, "gain", 0.5)?;
        p.set_parameter(ids.source, "channel_count", 4i64)?;
        Ok(())
    })??;

    std::thread::sleep(half);
    scheduler.stop()?;

    for event in events.try_iter() {
        match event {
            SchedulerEvent::TickFailed(report) => {
                tracing::warn!("Tick {} had {} failure(s)", report.tick, report.failures.len());
            }
            SchedulerEvent::Stats(stats) => {
                tracing::debug!("{} ticks, mean interval {:?}", stats.ticks, stats.mean_interval);
            }
            SchedulerEvent::Stopped => {}
        }
    }

    let stats = scheduler.stats()?;
    let snapshot = scheduler.with_pipeline(|p| p.snapshot())?;
    let limits = scheduler.with_pipeline(|p| {
        (
            p.parameter(ids.limits, "lower").ok(),
            p.parameter(ids.limits, "upper").ok(),
        )
    })?;

    // Dropping the scheduler drops the pipeline and with it the sink sender.
    drop(scheduler);
    let received = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("consumer thread panicked"))?;

    tracing::info!(
        "Ran {} ticks ({} overruns), host received {} chunks, limits {:?}",
        stats.ticks,
        stats.overruns,
        received,
        limits
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
