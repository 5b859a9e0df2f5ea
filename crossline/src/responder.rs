//! A well-behaved stream peer: answers every push with a pong.

use std::time::Duration;

use crossline_core::unix_millis;
use crossline_transport::{ClientStream, RpcError};
use tokio_util::sync::CancellationToken;

/// Answer every message on `stream` with `"pong <unix-millis>"` after
/// `delay`, echoing its correlation id.
///
/// Returns the number of pongs sent once the server ends the stream, or once
/// `stop` is cancelled and the server has acknowledged the close.
///
/// # Errors
///
/// Any failure of the underlying stream, including a failure status from the
/// server.
pub async fn answer_pings(
    mut stream: ClientStream,
    delay: Duration,
    stop: CancellationToken,
) -> Result<usize, RpcError> {
    let mut answered = 0;
    loop {
        let ping = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            received = stream.recv() => match received? {
                Some(ping) => ping,
                None => {
                    tracing::info!(answered, "server ended the stream");
                    return Ok(answered);
                }
            },
        };
        tracing::info!(message = %ping.message, correlation_id = ?ping.correlation_id, "ping received");

        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let pong = ping.reply(format!("pong {}", unix_millis()));
        tracing::info!(message = %pong.message, "sending pong");
        stream.send(pong).await?;
        answered += 1;
    }

    tracing::debug!(answered, "closing stream");
    stream.close_send().await?;
    while stream.recv().await?.is_some() {}
    Ok(answered)
}
