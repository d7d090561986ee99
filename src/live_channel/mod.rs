// Live event channel: long-lived WebSocket to the telemetry source.
// Connect, send the join handshake, forward events to the aggregator, reconnect forever with
// backoff until cancelled. Stale state is never cleared here; only the connection status flips.

mod backoff;
mod frame;

pub use backoff::Backoff;
pub use frame::{
    AUDIENCE_UPDATE, EventError, LiveEvent, STATION_STATUS_UPDATE, join_frame, parse_frame,
};

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::Update;
use crate::config::LiveConfig;

type LiveStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on sending the close frame at shutdown.
pub const CLOSE_SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct LiveChannelConfig {
    pub endpoint_url: String,
    pub join_event: String,
    pub reconnect_delay: Duration,
    pub reconnect_delay_max: Duration,
    pub randomization_factor: f64,
    pub connect_timeout: Duration,
}

impl From<&LiveConfig> for LiveChannelConfig {
    fn from(c: &LiveConfig) -> Self {
        Self {
            endpoint_url: c.endpoint_url.clone(),
            join_event: c.join_event.clone(),
            reconnect_delay: Duration::from_millis(c.reconnect_delay_ms),
            reconnect_delay_max: Duration::from_millis(c.reconnect_delay_max_ms),
            randomization_factor: c.randomization_factor,
            connect_timeout: Duration::from_millis(c.connect_timeout_ms),
        }
    }
}

/// How one connected session ended.
#[derive(Debug)]
enum SessionEnd {
    Cancelled,
    UpdatesClosed,
    Disconnected(String),
}

/// Spawns the channel task. It only stops when `cancel` fires or the aggregator goes away.
pub fn spawn(
    config: LiveChannelConfig,
    updates: mpsc::Sender<Update>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(config, updates, cancel))
}

#[instrument(name = "live_channel", skip_all, fields(endpoint = %config.endpoint_url))]
async fn run(config: LiveChannelConfig, updates: mpsc::Sender<Update>, cancel: CancellationToken) {
    let mut backoff = Backoff::new(
        config.reconnect_delay,
        config.reconnect_delay_max,
        config.randomization_factor,
    );

    loop {
        let connect = tokio::time::timeout(
            config.connect_timeout,
            connect_async(config.endpoint_url.as_str()),
        );
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            r = connect => r,
        };

        match result {
            Ok(Ok((stream, _response))) => {
                info!(
                    after_attempts = backoff.attempts(),
                    "Live channel connected"
                );
                backoff.reset();
                match session(stream, &config, &updates, &cancel).await {
                    SessionEnd::Cancelled | SessionEnd::UpdatesClosed => break,
                    SessionEnd::Disconnected(reason) => {
                        warn!(reason = %reason, "Live channel disconnected");
                        if updates
                            .send(Update::Disconnected { reason })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    operation = "connect",
                    attempt = backoff.attempts() + 1,
                    "Live channel connect failed"
                );
            }
            Err(_) => {
                warn!(
                    operation = "connect",
                    timeout_ms = config.connect_timeout.as_millis() as u64,
                    attempt = backoff.attempts() + 1,
                    "Live channel connect timed out"
                );
            }
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Live channel reconnect scheduled");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!("Live channel shutting down");
}

async fn session(
    stream: LiveStream,
    config: &LiveChannelConfig,
    updates: &mpsc::Sender<Update>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    if updates.send(Update::Connected).await.is_err() {
        return SessionEnd::UpdatesClosed;
    }
    if let Err(e) = write
        .send(Message::text(join_frame(&config.join_event)))
        .await
    {
        return SessionEnd::Disconnected(format!("join handshake failed: {e}"));
    }
    debug!(join_event = %config.join_event, "Join handshake sent");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // A peer that stopped reading must not hold up shutdown.
                if tokio::time::timeout(CLOSE_SEND_TIMEOUT, write.send(Message::Close(None)))
                    .await
                    .is_err()
                {
                    debug!("close frame not sent before timeout");
                }
                return SessionEnd::Cancelled;
            }
            msg = read.next() => {
                let update = match msg {
                    Some(Ok(Message::Text(text))) => decode(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => decode(text),
                        Err(_) => Some(Update::Rejected {
                            reason: "binary frame is not UTF-8".into(),
                        }),
                    },
                    // tungstenite answers pings itself
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => None,
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "close frame received".into());
                        return SessionEnd::Disconnected(reason);
                    }
                    Some(Err(e)) => return SessionEnd::Disconnected(format!("ws error: {e}")),
                    None => return SessionEnd::Disconnected("stream ended".into()),
                };
                if let Some(update) = update
                    && updates.send(update).await.is_err()
                {
                    return SessionEnd::UpdatesClosed;
                }
            }
        }
    }
}

/// Frame -> aggregator update. Unknown events are ignored; malformed ones are reported, never applied.
fn decode(text: &str) -> Option<Update> {
    match parse_frame(text) {
        Ok(Some(event)) => Some(Update::Event(event)),
        Ok(None) => {
            debug!("ignoring unhandled live event");
            None
        }
        Err(e) => {
            warn!(error = %e, operation = "parse_frame", "dropping live event");
            Some(Update::Rejected {
                reason: e.to_string(),
            })
        }
    }
}
