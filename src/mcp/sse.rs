//! Legacy HTTP+SSE transport.
//!
//! The server announces a POST endpoint with an `endpoint` event on the SSE
//! stream; requests go to that endpoint and responses come back as `message`
//! events. The pair of channels returned here plugs into rmcp as a
//! sink/stream transport.

use std::collections::HashMap;

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use reqwest_eventsource::{Event, EventSource};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::transport::header_client;
use crate::error::{Result, StrideError};

const CHANNEL_CAPACITY: usize = 32;

pub(crate) type SseTransport = (mpsc::Sender<ClientJsonRpcMessage>, mpsc::Receiver<ServerJsonRpcMessage>);

/// Open the SSE stream at `url` and wait for the server's POST endpoint.
pub(crate) async fn connect(url: &str, headers: Option<&HashMap<String, String>>) -> Result<SseTransport> {
    let http = header_client(headers)?;
    let base = Url::parse(url).map_err(|e| StrideError::Configuration(format!("invalid SSE url '{url}': {e}")))?;
    let mut source = EventSource::new(http.get(base.clone()))
        .map_err(|e| StrideError::provider("mcp", format!("cannot open SSE stream: {e}")))?;

    let endpoint = loop {
        match source.next().await {
            Some(Ok(Event::Message(event))) if event.event == "endpoint" => {
                break resolve_endpoint(&base, &event.data)?;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                source.close();
                return Err(StrideError::provider("mcp", format!("SSE connection failed: {e}")));
            }
            None => {
                return Err(StrideError::provider(
                    "mcp",
                    "SSE stream closed before the endpoint event",
                ))
            }
        }
    };
    debug!(%endpoint, "SSE endpoint announced");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientJsonRpcMessage>(CHANNEL_CAPACITY);
    let (mut inbound_tx, inbound_rx) = mpsc::channel::<ServerJsonRpcMessage>(CHANNEL_CAPACITY);
    let shutdown = CancellationToken::new();

    let reader_shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = reader_shutdown.cancelled() => break,
                event = source.next() => event,
            };
            match event {
                Some(Ok(Event::Message(event))) if event.event == "message" => {
                    match serde_json::from_str::<ServerJsonRpcMessage>(&event.data) {
                        Ok(message) => {
                            if inbound_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping malformed SSE message"),
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "SSE stream ended");
                    break;
                }
                None => break,
            }
        }
        source.close();
    });

    tokio::spawn(async move {
        while let Some(message) = outbound_rx.next().await {
            let sent = http
                .post(endpoint.clone())
                .json(&message)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            if let Err(e) = sent {
                warn!(error = %e, "failed to post MCP message");
            }
        }
        shutdown.cancel();
    });

    Ok((outbound_tx, inbound_rx))
}

fn resolve_endpoint(base: &Url, announced: &str) -> Result<Url> {
    base.join(announced.trim())
        .map_err(|e| StrideError::provider("mcp", format!("invalid SSE endpoint '{announced}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_endpoint_resolves_against_stream_url() {
        let base = Url::parse("http://localhost:8931/sse").unwrap();
        let endpoint = resolve_endpoint(&base, "/messages?session_id=abc\n").unwrap();
        assert_eq!(endpoint.as_str(), "http://localhost:8931/messages?session_id=abc");
    }

    #[test]
    fn absolute_endpoint_is_kept() {
        let base = Url::parse("http://localhost:8931/sse").unwrap();
        let endpoint = resolve_endpoint(&base, "https://other.example/rpc").unwrap();
        assert_eq!(endpoint.host_str(), Some("other.example"));
    }
}
