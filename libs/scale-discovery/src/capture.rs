use scale_transport::Transport;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Captures raw bytes from the transport for `capture_time_ms`, then decodes
/// them as ASCII and splits into non-empty, trimmed lines. Returns both the
/// lines (for scoring) and the untrimmed raw bytes (for delimiter
/// detection during synthesis).
pub async fn capture_step(
    transport: &dyn Transport,
    capture_time_ms: u64,
    cancel: &CancellationToken,
) -> (Vec<String>, Vec<u8>) {
    let mut rx = transport.subscribe_data();
    let mut raw = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_millis(capture_time_ms);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => break,
            event = rx.recv() => {
                match event {
                    Ok(ev) => raw.extend_from_slice(&ev.bytes),
                    Err(_) => break,
                }
            }
        }
    }

    let decoded: String = raw.iter().map(|&b| b as char).collect();
    let lines = decoded
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    (lines, raw)
}
