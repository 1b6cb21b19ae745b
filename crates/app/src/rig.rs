//! `turret track`: wires capture, inference and the stepper axes together
//! and runs them until Ctrl+C or a fatal detector error.

#[cfg(not(all(feature = "camera", feature = "with-tch")))]
pub fn run(
    _config: tracking::TrackingConfig,
    _steppers: motion::StepperSettings,
) -> anyhow::Result<()> {
    anyhow::bail!("`turret track` needs a build with the `camera` and `with-tch` features")
}

#[cfg(all(feature = "camera", feature = "with-tch"))]
pub use live::run;

#[cfg(all(feature = "camera", feature = "with-tch"))]
mod live {
    use std::{sync::Arc, thread, time::Duration};

    use anyhow::{Context, Result, anyhow};
    use crossbeam_channel::{Sender, bounded};
    use ml_core::{
        ClassNames, TorchDetector,
        tch::{Cuda, Device},
    };
    use motion::{Axis, LogDriver, StepperDispatcher, StepperSettings, spawn_steppers};
    use tracing::{debug, error, info, warn};
    use tracking::{
        ControlLoop, ExitReason, FrameExchange, LoopReport, PromptConfirmer, Shutdown,
        ShutdownSignal, TrackingConfig, pipeline::telemetry,
    };
    use video_ingest::{CaptureError, CaptureSettings, CaptureStats, publish_camera_frames};

    use crate::signals::install_ctrlc;

    type DetectorInit = std::result::Result<String, String>;

    pub fn run(config: TrackingConfig, steppers: StepperSettings) -> Result<()> {
        let _telemetry_guard = telemetry::enter_runtime(&config.telemetry, config.verbose);
        if let Err(err) = telemetry::init_metrics_recorder() {
            warn!("metrics disabled: {err}");
        }
        let rig_span = tracing::info_span!(
            "turret.rig",
            source = %config.camera_uri,
            width = config.width,
            height = config.height,
            input_size = config.input_size,
            target_class = config.target_class,
            device = tracing::field::Empty
        );
        let _rig_guard = rig_span.enter();

        let device = if config.use_cpu {
            Device::Cpu
        } else {
            Device::cuda_if_available()
        };
        rig_span.record("device", tracing::field::debug(device));
        debug!(
            "CUDA available: {} (devices: {})",
            Cuda::is_available(),
            Cuda::device_count()
        );

        let names = match config.labels_path.as_ref() {
            Some(path) => ClassNames::load(path)
                .with_context(|| format!("failed to read labels from {}", path.display()))?,
            None => ClassNames::generic(),
        };

        let shutdown = Shutdown::new();
        install_ctrlc(&shutdown);
        let exchange = Arc::new(FrameExchange::new());

        let (dispatcher, steppers) = spawn_steppers(
            &shutdown,
            steppers,
            LogDriver::new(Axis::X),
            LogDriver::new(Axis::Y),
        )
        .context("failed to start stepper workers")?;

        let capture = spawn_capture(&config, &shutdown, Arc::clone(&exchange))?;

        let (init_tx, init_rx) = bounded::<DetectorInit>(1);
        let inference = spawn_inference(
            &config,
            device,
            names,
            &shutdown,
            Arc::clone(&exchange),
            dispatcher,
            init_tx,
        )?;

        let init = init_rx
            .recv()
            .unwrap_or_else(|_| Err("inference thread exited before loading the detector".into()));
        match &init {
            Ok(message) => {
                info!("{message}");
                info!("Running turret rig, press Ctrl+C to stop");
            }
            Err(err) => {
                error!("{err}");
                shutdown.request_stop();
            }
        }

        let report = inference
            .join()
            .map_err(|_| anyhow!("inference thread panicked"))?;

        shutdown.request_stop();
        let timeout = Duration::from_millis(config.exit_timeout_ms);
        if !shutdown.wait_for_exit(timeout) {
            warn!(
                "Workers still running after {:?}: {:?}",
                timeout,
                shutdown.pending_workers()
            );
        }

        let capture = capture
            .join()
            .map_err(|_| anyhow!("capture thread panicked"))?;
        let (x, y) = steppers.join()?;
        debug!(
            "Stepper travel: x={} step(s), y={} step(s)",
            x.position_steps(),
            y.position_steps()
        );
        info!("Frames published: {}", exchange.published());
        if let Some(snapshot) = telemetry::render_metrics() {
            debug!("metrics snapshot:\n{snapshot}");
        }

        init.map_err(anyhow::Error::msg)?;
        if let Some(LoopReport { exit, stats }) = report {
            info!(
                "Inference loop: {} frame(s), {} detection(s), {} command(s), {} recoverable error(s)",
                stats.frames, stats.detections, stats.commands, stats.recoverable_errors
            );
            if let ExitReason::Fatal(err) = exit {
                return Err(anyhow::Error::new(err).context("inference loop stopped"));
            }
        }
        let stats = capture.context("capture failed")?;
        debug!(
            "Capture: {} frame(s) published, {} empty read(s)",
            stats.published, stats.empty
        );
        Ok(())
    }

    fn spawn_capture(
        config: &TrackingConfig,
        shutdown: &Shutdown,
        exchange: Arc<FrameExchange>,
    ) -> Result<thread::JoinHandle<Result<CaptureStats, CaptureError>>> {
        let handle = shutdown.register("capture");
        let uri = config.camera_uri.clone();
        let settings = CaptureSettings {
            width: config.width,
            height: config.height,
            fps: config.capture_fps,
        };
        telemetry::spawn_thread("capture", move || {
            let result =
                publish_camera_frames(&uri, &settings, &*exchange, || handle.is_stop_requested());
            if let Err(err) = &result {
                error!("Capture stopped: {err}");
                handle.request_stop();
            }
            handle.signal_exit_ready();
            result
        })
        .context("failed to spawn capture thread")
    }

    fn spawn_inference(
        config: &TrackingConfig,
        device: Device,
        names: ClassNames,
        shutdown: &Shutdown,
        exchange: Arc<FrameExchange>,
        dispatcher: StepperDispatcher,
        init_tx: Sender<DetectorInit>,
    ) -> Result<thread::JoinHandle<Option<LoopReport>>> {
        let handle = shutdown.register("inference");
        let model_path = config.model_path.clone();
        let settings = config.loop_settings();
        telemetry::spawn_thread("inference", move || {
            let detector = match TorchDetector::load(&model_path, device, names) {
                Ok(detector) => {
                    let _ = init_tx.send(Ok(format!(
                        "Detector {} loaded on {:?}",
                        model_path.display(),
                        detector.device()
                    )));
                    detector
                }
                Err(err) => {
                    let _ = init_tx.send(Err(format!("failed to load detector: {err}")));
                    handle.signal_exit_ready();
                    return None;
                }
            };

            let mut control = ControlLoop::new(
                exchange,
                detector,
                PromptConfirmer::terminal(),
                dispatcher,
                settings,
            );
            Some(control.run(&handle))
        })
        .context("failed to spawn inference thread")
    }
}
