use scale_model::{Frame, SessionConfig, StabilityState};
use scale_stability::StabilityMonitor;
use scale_transport::Transport;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why baseline capture stopped. `Disconnected` is distinguished from a
/// plain empty capture (timeout or cancellation with zero frames) so
/// callers can route the two differently.
#[derive(Debug)]
pub enum BaselineOutcome {
    Captured(Vec<Frame>),
    Disconnected,
}

/// Subscribes to the transport's data stream, feeds every chunk through the
/// Stability Monitor, and retains whatever `filter()` lets through as an
/// ordered, bounded buffer of frames.
///
/// Stops once `minimum_frames_for_analysis` frames accumulate, the baseline
/// timeout elapses, or the link is classified `Disconnected` — in which
/// case the buffer is cleared and `BaselineOutcome::Disconnected` is
/// returned instead of an (indistinguishable) empty capture.
pub async fn capture_baseline(
    transport: &dyn Transport,
    stability: &StabilityMonitor,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> BaselineOutcome {
    let mut rx = transport.subscribe_data();
    let mut frames: VecDeque<Frame> = VecDeque::new();
    let deadline = tokio::time::Instant::now() + config.baseline_capture_timeout;

    loop {
        if frames.len() >= config.minimum_frames_for_analysis {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("baseline capture cancelled");
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                debug!(frames = frames.len(), "baseline capture timed out");
                break;
            }
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let valid_hint = !ev.bytes.is_empty();
                        stability.add_sample(&ev.bytes, valid_hint);
                        stability.analyze();
                        if stability.current_state() == StabilityState::Disconnected {
                            warn!("link disconnected during baseline capture, aborting with zero frames");
                            return BaselineOutcome::Disconnected;
                        }
                        if let Some(filtered) = stability.filter(&ev.bytes) {
                            if frames.len() >= config.max_buffered_frames {
                                frames.pop_front();
                            }
                            frames.push_back(Frame::new(filtered, true));
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }

    BaselineOutcome::Captured(frames.into_iter().collect())
}
