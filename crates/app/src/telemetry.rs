//! Tracing subscriber and Prometheus recorder setup.

use std::{fs, path::Path, sync::OnceLock, thread, time::Duration};

use anyhow::{Context, Result, anyhow};
use frame_pipeline::spawn_thread;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{
    filter::{EnvFilter, filter_fn},
    fmt,
    prelude::*,
};

use crate::config::TelemetryOptions;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Keeps the subscriber installed and flushes the Chrome trace on drop.
pub(crate) struct TelemetryGuard {
    _default_guard: tracing::subscriber::DefaultGuard,
    _chrome_guard: Option<tracing_chrome::FlushGuard>,
}

/// Install the Prometheus recorder once and return its handle.
pub(crate) fn init_metrics_recorder() -> Result<&'static PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle);
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|_| anyhow!("a metrics recorder is already installed"))?;
    describe_metrics();

    let upkeep = handle.clone();
    spawn_thread("prometheus-upkeep", move || loop {
        thread::sleep(Duration::from_secs(5));
        upkeep.run_upkeep();
    })
    .context("failed to spawn prometheus upkeep thread")?;

    Ok(PROM_HANDLE.get_or_init(|| handle))
}

/// Render current metrics in Prometheus text format to `path`.
pub(crate) fn write_metrics(path: &Path) -> Result<()> {
    let Some(handle) = PROM_HANDLE.get() else {
        return Ok(());
    };
    fs::write(path, handle.render())
        .with_context(|| format!("failed to write metrics to {}", path.display()))
}

fn describe_metrics() {
    metrics::describe_counter!(
        "framepool_frames_enqueued_total",
        "Frames read from the input and queued for workers"
    );
    metrics::describe_counter!(
        "framepool_frames_emitted_total",
        "Frames written to the output in order"
    );
    metrics::describe_counter!(
        "framepool_item_failures_total",
        "Frames whose transform failed"
    );
    metrics::describe_histogram!(
        "framepool_transform_seconds",
        metrics::Unit::Seconds,
        "Time spent in the per-frame transform"
    );
    metrics::describe_gauge!(
        "framepool_reorder_pending",
        "Finished frames waiting for an earlier frame"
    );
    metrics::describe_counter!(
        "framepool_placeholder_frames_total",
        "Frames written in place of failed transforms"
    );
}

/// Install the subscriber for the current thread. Pipeline threads inherit
/// it through [`spawn_thread`].
pub(crate) fn enter_runtime(opts: &TelemetryOptions) -> TelemetryGuard {
    let default_level = if opts.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (chrome_layer, chrome_guard) = match opts.chrome_trace_path.as_deref() {
        Some(path) => match build_chrome_layer(path) {
            Ok((layer, guard)) => (Some(layer), Some(guard)),
            Err(err) => {
                eprintln!(
                    "failed to initialise chrome trace writer at {}: {err}",
                    path.display()
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let span_only = filter_fn(|metadata| metadata.is_span());
    let default_guard = tracing::subscriber::set_default(
        tracing_subscriber::registry()
            .with(chrome_layer.map(|layer| layer.with_filter(span_only)))
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_names(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            )
            .with(tracing_error::ErrorLayer::default()),
    );

    TelemetryGuard {
        _default_guard: default_guard,
        _chrome_guard: chrome_guard,
    }
}

fn build_chrome_layer(
    path: &Path,
) -> std::io::Result<(
    tracing_chrome::ChromeLayer<tracing_subscriber::Registry>,
    tracing_chrome::FlushGuard,
)> {
    let file = fs::File::create(path)?;
    let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .writer(file)
        .include_args(true)
        .trace_style(tracing_chrome::TraceStyle::Threaded)
        .build();
    Ok((layer, guard))
}
