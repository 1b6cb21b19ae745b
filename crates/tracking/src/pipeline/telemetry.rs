//! Telemetry helpers for tracing spans and Prometheus metrics.

use std::{
    io,
    path::{Path, PathBuf},
    sync::OnceLock,
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{
    filter::{EnvFilter, filter_fn},
    fmt,
    layer::SubscriberExt,
    prelude::*,
};

use crate::pipeline::config::TelemetryOptions;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static PROM_UPKEEP_THREAD: OnceLock<thread::JoinHandle<()>> = OnceLock::new();

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Guard returned when a telemetry subscriber has been installed for the current thread.
///
/// Threads started through [`spawn_thread`] while the guard is alive log into
/// the same subscriber. Dropping it flushes the Chrome trace, if any.
pub struct TelemetryGuard {
    _default_guard: tracing::dispatcher::DefaultGuard,
    chrome_guard: Option<tracing_chrome::FlushGuard>,
    chrome_trace_path: Option<PathBuf>,
}

/// Ensure the global metrics recorder is installed and return the Prometheus handle.
pub fn init_metrics_recorder() -> Result<&'static PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle);
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|err| anyhow::anyhow!("metrics recorder already installed: {err}"))?;

    let upkeep_handle = handle.clone();
    let upkeep = spawn_thread("prometheus-upkeep", move || {
        loop {
            thread::sleep(UPKEEP_INTERVAL);
            upkeep_handle.run_upkeep();
        }
    })
    .context("failed to spawn prometheus upkeep thread")?;
    let _ = PROM_UPKEEP_THREAD.set(upkeep);

    Ok(PROM_HANDLE.get_or_init(|| handle))
}

/// Access the Prometheus handle when already initialised.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE.get()
}

/// Prometheus text exposition of every metric recorded so far.
pub fn render_metrics() -> Option<String> {
    prometheus_handle().map(PrometheusHandle::render)
}

/// Install tracing subscribers for the current thread.
///
/// `RUST_LOG` wins over the default directive, which is `info` or `debug`
/// when `verbose` is set. The first call also installs the subscriber as the
/// global default so threads the rig does not spawn itself, such as the
/// Ctrl+C handler, still log.
pub fn enter_runtime(opts: &TelemetryOptions, verbose: bool) -> TelemetryGuard {
    let default_directive = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let (chrome_layer, chrome_guard) = match opts.chrome_trace_path.as_ref() {
        Some(path) => match build_chrome_layer(path) {
            Ok((layer, guard)) => (Some(layer), Some(guard)),
            Err(err) => {
                tracing::warn!(
                    "failed to initialise chrome trace writer at {}: {err}",
                    path.display()
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let span_only_filter = filter_fn(|metadata| metadata.is_span());

    let dispatch = tracing::Dispatch::new(
        tracing_subscriber::registry()
            .with(chrome_layer.map(|layer| layer.with_filter(span_only_filter)))
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_names(true)
                    .with_timer(fmt::time::uptime())
                    .with_filter(env_filter),
            )
            .with(tracing_error::ErrorLayer::default()),
    );
    // Only the first caller in a process wins; later ones stay thread-scoped.
    let _ = tracing::dispatcher::set_global_default(dispatch.clone());
    let default_guard = tracing::dispatcher::set_default(&dispatch);

    TelemetryGuard {
        _default_guard: default_guard,
        chrome_guard,
        chrome_trace_path: opts.chrome_trace_path.clone(),
    }
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

fn build_chrome_layer(
    path: &Path,
) -> io::Result<(
    tracing_chrome::ChromeLayer<tracing_subscriber::Registry>,
    tracing_chrome::FlushGuard,
)> {
    let file = std::fs::File::create(path)?;
    // Every rig worker is an OS thread, so spans open and close on the same
    // thread and render as plain durations.
    let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .writer(file)
        .include_args(true)
        .include_locations(false)
        .trace_style(tracing_chrome::TraceStyle::Threaded)
        .build();
    Ok((layer, guard))
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(guard) = self.chrome_guard.take() {
            guard.flush();
            drop(guard);
            if let Some(path) = self.chrome_trace_path.as_ref() {
                tracing::debug!("chrome trace written to {}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_threads_inherit_dispatcher() {
        let _guard = enter_runtime(&TelemetryOptions::default(), false);
        let handle = spawn_thread("worker", || {
            !tracing::info_span!("tracking.worker").is_disabled()
        })
        .unwrap();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn foreign_threads_fall_back_to_the_global_subscriber() {
        let _guard = enter_runtime(&TelemetryOptions::default(), false);
        let handle = thread::spawn(|| {
            !tracing::info_span!("tracking.signal_handler").is_disabled()
        });
        assert!(handle.join().unwrap());
    }

    #[test]
    fn chrome_trace_is_flushed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        {
            let _guard = enter_runtime(
                &TelemetryOptions {
                    chrome_trace_path: Some(path.clone()),
                },
                true,
            );
            let span = tracing::info_span!("tracking.frame", sequence = 1u64);
            let _entered = span.enter();
        }
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("tracking.frame"));
    }
}
