use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use caption_realtime_client::aggregator::StateSnapshot;
use caption_realtime_client::config::ConfigSet;
use caption_realtime_client::session::SessionController;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match ConfigSet::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };
    info!(
        root = ?config.root(),
        endpoint = config.stream.endpoint().unwrap_or("<none>"),
        demo_mode = config.session.demo_mode,
        "configuration loaded"
    );

    let controller = match SessionController::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!(error = %e, "failed to create session controller");
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.start_session().await {
        error!(error = %e, "failed to start session");
        controller.shutdown().await;
        return;
    }

    let mut updates = controller.subscribe();
    let mut previous = controller.snapshot();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("session runtime stopped unexpectedly");
                    break;
                }
                let current = updates.borrow_and_update().clone();
                log_changes(&previous, &current);
                previous = current;
            }
        }
    }

    if let Err(e) = controller.pause_session().await {
        warn!(error = %e, "failed to pause session");
    }
    let last = controller.snapshot();
    info!(
        transcript = last.transcript.len(),
        alerts = last.alerts.len(),
        "session paused, shutting down"
    );
    controller.shutdown().await;
}

fn log_changes(previous: &Arc<StateSnapshot>, current: &Arc<StateSnapshot>) {
    if previous.connection_state != current.connection_state {
        info!(state = ?current.connection_state, "connection state");
    }
    if previous.current_caption != current.current_caption {
        if let Some(caption) = &current.current_caption {
            info!(
                text = %caption.text,
                confidence = caption.confidence,
                level = ?caption.confidence_level,
                "caption"
            );
        }
    }
    if previous.partial_caption != current.partial_caption {
        if let Some(caption) = &current.partial_caption {
            info!(text = %caption.text, "partial caption");
        }
    }
    if previous.alerts.first().map(|a| &a.id) != current.alerts.first().map(|a| &a.id) {
        if let Some(alert) = current.alerts.first() {
            info!(level = ?alert.level, message = %alert.message, "alert");
        }
    }
    if previous.metrics != current.metrics {
        let metrics = current.metrics;
        info!(
            fps = metrics.fps,
            latency_ms = metrics.latency_ms,
            hands_detected = metrics.hands_detected,
            queue_depth = metrics.queue_depth,
            "metrics"
        );
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}
