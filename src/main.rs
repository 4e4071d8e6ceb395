use anyhow::Context;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use wayfinder::kernel::speech::output::SpeechEngine;
use wayfinder::outputs::{CommandSpeechEngine, MockSpeechEngine};
use wayfinder::sensors::{
    BatterySource, BoundingBox, RawDetection, ScriptedDetector, ScriptedRange, ScriptedSigns,
    SimulatedBattery, SysfsBattery,
};
use wayfinder::{PipelineConfig, Reactor, Sources};

/// How long a Critical battery announcement gets to play before teardown.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

fn load_config() -> anyhow::Result<PipelineConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let doc = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path))?;
            PipelineConfig::from_json_str(&doc).with_context(|| format!("parsing config {}", path))
        }
        None => Ok(PipelineConfig::default()),
    }
}

/// A walk towards a wall and back, repeated.
fn demo_sources() -> Sources {
    let walk = [320.0, 250.0, 180.0, 120.0, 95.0, 70.0, 60.0, 70.0, 110.0, 180.0, 260.0];
    let range = ScriptedRange::new(walk.iter().flat_map(|d| std::iter::repeat(*d).take(10))).looping();

    let frames = (0..50).map(|i| {
        if i % 10 == 0 {
            vec![RawDetection::new("person", 0.82, BoundingBox::new(100.0, 80.0, 140.0, 200.0))]
        } else {
            Vec::new()
        }
    });
    let signs = (0..50).map(|i| {
        (i == 25).then(|| RawDetection::new("stop", 0.91, BoundingBox::new(0.0, 0.0, 40.0, 40.0)))
    });

    let battery: Box<dyn BatterySource> = match SysfsBattery::discover() {
        Some(battery) => Box::new(battery),
        None => {
            tracing::info!("No system battery found, simulating one");
            Box::new(SimulatedBattery::new(60.0, 0.5))
        }
    };

    let speech: Arc<dyn SpeechEngine> = match CommandSpeechEngine::detect() {
        Some(engine) => {
            tracing::info!("Speaking through {}", engine.program());
            Arc::new(engine)
        }
        None => {
            tracing::warn!("No TTS program on PATH, announcements will only be logged");
            Arc::new(MockSpeechEngine::new(Duration::from_millis(300)))
        }
    };

    Sources {
        range: vec![Box::new(range)],
        detector: Arc::new(ScriptedDetector::new(frames)),
        signs: Some(Arc::new(ScriptedSigns::new(signs))),
        battery,
        speech,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wayfinder=info")),
        )
        .init();

    let config = load_config()?;
    let reactor = Reactor::new(config, demo_sources()).context("building pipeline")?;
    let arbiter = reactor.arbiter();
    let shutdown_request = reactor.shutdown_request();
    let shutdown = reactor.shutdown_handle();

    let pipeline = tokio::spawn(reactor.run());
    tracing::info!("Pipeline active. Press Ctrl+C to stop.");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl+C")?;
            tracing::info!("Interrupted");
        }
        _ = shutdown_request.cancelled() => {
            tracing::warn!("Critical battery, draining announcements before shutdown");
            let deadline = Instant::now() + DRAIN_GRACE;
            // The Critical event is submitted just after the request fires.
            loop {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let idle = arbiter.in_flight().is_none() && arbiter.pending() == 0;
                if idle || Instant::now() >= deadline {
                    break;
                }
            }
        }
    }

    shutdown.cancel();
    let report = pipeline.await.context("pipeline task panicked")?;
    tracing::info!("Final report:\n{}", report.to_json().context("rendering report")?);
    Ok(())
}
