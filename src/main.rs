use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};

use imu_monitor_rs::parser::ImuBlockParser;
use imu_monitor_rs::processor::{PipelineEvent, ProcessorConfig, SampleProcessor};
use imu_monitor_rs::server::{self, AppState, ControlMsg, ImuFrame, SignalLostFrame};
use imu_monitor_rs::types::ImuSample;

#[derive(Parser, Debug)]
#[command(name = "imu_monitor")]
#[command(about = "IMU motion-state monitor - classifies a live orientation stream", long_about = None)]
struct Args {
    /// Port for the web interface
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Read IMU text from a file instead of stdin (replay)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Override the smoothing time constant, seconds
    #[arg(long)]
    tau: Option<f64>,

    /// Minimum gap between broadcast frames, milliseconds (20 Hz default)
    #[arg(long, default_value = "50")]
    broadcast_ms: u64,
}

/// Seconds since process start. One monotonic clock drives every timer in
/// the pipeline: smoothing dt, dwell, debounce, and signal loss.
fn mono_secs(epoch: Instant) -> f64 {
    epoch.elapsed().as_secs_f64()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let epoch = Instant::now();

    println!("[{}] IMU Monitor starting", ts_now());
    println!("  Port: {}", args.port);
    match &args.input {
        Some(path) => println!("  Input: {}", path.display()),
        None => println!("  Input: stdin (pipe the ZED sensor dump in)"),
    }

    let mut config = ProcessorConfig::default();
    if let Some(tau) = args.tau {
        config.smoothing_tau = tau;
    }

    // Ordered SPSC hand-off into the processing loop; reordering here would
    // corrupt the dwell-time accounting.
    let (sample_tx, sample_rx) = mpsc::channel::<ImuSample>(512);
    let (control_tx, control_rx) = mpsc::channel::<ControlMsg>(16);
    let (frame_tx, _) = broadcast::channel::<String>(64);

    let state = AppState { frames: frame_tx.clone(), control: control_tx };

    tokio::spawn(reader_loop(args.input.clone(), sample_tx, epoch));
    tokio::spawn(processing_loop(
        config,
        sample_rx,
        control_rx,
        frame_tx,
        epoch,
        Duration::from_millis(args.broadcast_ms),
    ));

    server::serve(state, args.port).await
}

/// Read the raw text stream line by line and feed the block parser.
async fn reader_loop(input: Option<PathBuf>, tx: mpsc::Sender<ImuSample>, epoch: Instant) {
    let mut parser = ImuBlockParser::new();

    match input {
        Some(path) => {
            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    log::error!("cannot open {}: {}", path.display(), e);
                    return;
                }
            };
            let mut lines = BufReader::new(file).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !feed_line(&mut parser, &line, &tx, epoch).await {
                    return;
                }
            }
        }
        None => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !feed_line(&mut parser, &line, &tx, epoch).await {
                    return;
                }
            }
        }
    }

    log::info!(
        "input ended: {} samples parsed, {} blocks rejected",
        parser.samples_emitted(),
        parser.blocks_rejected()
    );
}

/// Returns false once the processing loop is gone.
async fn feed_line(
    parser: &mut ImuBlockParser,
    line: &str,
    tx: &mpsc::Sender<ImuSample>,
    epoch: Instant,
) -> bool {
    match parser.push_line(line, mono_secs(epoch)) {
        Ok(Some(sample)) => {
            // Preserve ordering; if the processor ever falls behind, wait
            // rather than drop or reorder.
            if tx.send(sample).await.is_err() {
                log::warn!("processing loop gone, stopping reader");
                return false;
            }
            true
        }
        Ok(None) => true,
        Err(e) => {
            log::warn!("rejected IMU block: {}", e);
            true
        }
    }
}

/// Owns the single `SampleProcessor` for this source. Samples, control
/// messages, and the signal-loss tick are serialized through one select
/// loop, so the pipeline state has exactly one writer.
async fn processing_loop(
    config: ProcessorConfig,
    mut samples: mpsc::Receiver<ImuSample>,
    mut control: mpsc::Receiver<ControlMsg>,
    frames: broadcast::Sender<String>,
    epoch: Instant,
    min_broadcast_gap: Duration,
) {
    let mut processor = SampleProcessor::new(config);
    let mut loss_check = interval(Duration::from_secs(1));
    let mut last_broadcast: Option<Instant> = None;
    let mut signal_was_lost = false;
    let mut sample_count = 0u64;

    loop {
        tokio::select! {
            sample = samples.recv() => {
                let Some(sample) = sample else { break };
                let now = mono_secs(epoch);
                let (result, events) = processor.process_sample(&sample, now);
                sample_count += 1;
                signal_was_lost = false;

                for event in events {
                    log_event(&event);
                }

                if sample_count % 1000 == 0 {
                    log::info!("{} samples processed, state {}", sample_count, result.state.as_str());
                }

                // 20 Hz cap: processing runs on every sample, emission does not.
                if last_broadcast.map_or(true, |t| t.elapsed() >= min_broadcast_gap) {
                    let frame = ImuFrame { r#type: "imu_data", sample: &result };
                    if let Ok(json) = serde_json::to_string(&frame) {
                        let _ = frames.send(json); // no subscribers is fine
                    }
                    last_broadcast = Some(Instant::now());
                }
            }
            msg = control.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    ControlMsg::Recalibrate => {
                        log::info!("manual recalibration requested");
                        log_event(&processor.recalibrate());
                    }
                    ControlMsg::UpdateSettings(update) => {
                        log::info!("settings update: {:?}", update);
                        processor.update_settings(&update);
                    }
                }
            }
            _ = loss_check.tick() => {
                let now = mono_secs(epoch);
                if processor.is_signal_lost(now) {
                    if !signal_was_lost {
                        log::warn!("signal lost: no sample for over {:.0} ms",
                            processor.config().signal_loss_timeout * 1000.0);
                    }
                    signal_was_lost = true;
                    let frame = SignalLostFrame { r#type: "signal_lost", timestamp: now };
                    if let Ok(json) = serde_json::to_string(&frame) {
                        let _ = frames.send(json);
                    }
                }
            }
        }
    }

    log::info!("processing loop finished after {} samples", sample_count);
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::CalibrationStarted { auto: true } => {
            log::info!("auto-calibration started (platform is quiet)");
        }
        PipelineEvent::CalibrationStarted { auto: false } => {
            log::info!("calibration restarted");
        }
        PipelineEvent::CalibrationComplete { baseline_roll, baseline_pitch } => {
            log::info!(
                "calibration complete: roll offset {:.2} deg, pitch offset {:.2} deg",
                baseline_roll,
                baseline_pitch
            );
        }
        PipelineEvent::StateChanged { from, to } => {
            log::info!("state {} -> {}", from.as_str(), to.as_str());
        }
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
