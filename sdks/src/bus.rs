// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Remote bus transport.
//
// Agents do not run a broker of their own: they publish through
// `POST /bus/topics/{topic}` and subscribe to the server-sent-event stream at
// `GET /bus/topics/{topic}/events`, one `data:` line per serialized event.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Method;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use crewlink_core::domain::error::FabricError;
use crewlink_core::infrastructure::event_bus::{BusTransport, EventBus, TransportError, WireStream};

use crate::client::FabricClient;

#[derive(Clone)]
pub struct RemoteBusTransport {
    client: FabricClient,
}

impl RemoteBusTransport {
    pub fn new(client: FabricClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct PublishAck {
    #[serde(default)]
    delivered: usize,
}

#[async_trait]
impl BusTransport for RemoteBusTransport {
    async fn publish(&self, topic: &str, message: String) -> Result<usize, TransportError> {
        let response = self
            .client
            .streaming(Method::POST, &format!("/bus/topics/{topic}"))
            .timeout(std::time::Duration::from_secs(10))
            .header("content-type", "application/json")
            .body(message)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected(format!("{status}: {text}")));
        }

        let ack: PublishAck = response
            .json()
            .await
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        Ok(ack.delivered)
    }

    async fn subscribe(&self, topic: &str) -> Result<WireStream, TransportError> {
        let response = self
            .client
            .streaming(Method::GET, &format!("/bus/topics/{topic}/events"))
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(format!(
                "subscribe to '{topic}' returned {status}"
            )));
        }

        debug!(topic, "Subscribed to remote bus");
        let bytes = response.bytes_stream().boxed();
        Ok(sse_data_lines(bytes))
    }
}

struct SseReader {
    bytes: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    buffer: BytesMut,
    ready: VecDeque<String>,
}

impl SseReader {
    /// Move complete `data:` lines from the buffer to the ready queue.
    ///
    /// Lines are decoded only once their newline has arrived, so a character
    /// split across chunks is reassembled before decoding.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line.trim_end_matches(['\n', '\r']),
                Err(e) => {
                    warn!(error = %e, "Dropping non-UTF-8 line from remote bus");
                    continue;
                }
            };
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.strip_prefix(' ').unwrap_or(data);
                if !data.is_empty() {
                    self.ready.push_back(data.to_string());
                }
            }
        }
    }
}

/// Turn an SSE byte stream into its `data:` payloads. Comments and
/// keep-alives are skipped. Ends when the connection closes.
pub(crate) fn sse_data_lines(bytes: BoxStream<'static, Result<Bytes, reqwest::Error>>) -> WireStream {
    let reader = SseReader {
        bytes,
        buffer: BytesMut::new(),
        ready: VecDeque::new(),
    };

    Box::pin(stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(data) = reader.ready.pop_front() {
                return Some((data, reader));
            }
            match reader.bytes.next().await {
                Some(Ok(chunk)) => {
                    reader.buffer.extend_from_slice(&chunk);
                    reader.drain_lines();
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Remote bus stream failed");
                    return None;
                }
                None => return None,
            }
        }
    }))
}

/// Build an `EventBus` for `url`: `memory://` is an in-process broker,
/// `http(s)://` goes through the orchestrator at that address.
pub fn connect_bus(
    url: &str,
    api_key: Option<String>,
    capacity: usize,
    sender_id: impl Into<String>,
) -> Result<EventBus, FabricError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| FabricError::Validation(format!("invalid bus url '{url}': {e}")))?;

    match parsed.scheme() {
        "memory" => Ok(EventBus::in_memory(capacity, sender_id)),
        "http" | "https" => {
            let client = FabricClient::new(url)
                .map_err(|e| FabricError::Internal(e.to_string()))?
                .with_api_key(api_key);
            Ok(EventBus::new(Arc::new(RemoteBusTransport::new(client)), sender_id))
        }
        other => Err(FabricError::Validation(format!("unsupported bus scheme '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> BoxStream<'static, Result<Bytes, reqwest::Error>> {
        raw_chunks(parts.iter().map(|p| p.as_bytes().to_vec()).collect())
    }

    fn raw_chunks(parts: Vec<Vec<u8>>) -> BoxStream<'static, Result<Bytes, reqwest::Error>> {
        let owned: Vec<Result<Bytes, reqwest::Error>> =
            parts.into_iter().map(|p| Ok(Bytes::from(p))).collect();
        stream::iter(owned).boxed()
    }

    #[tokio::test]
    async fn test_sse_lines_split_across_chunks() {
        let lines: Vec<String> = sse_data_lines(chunks(&[
            ": keep-alive\n\ndata: {\"a\":",
            "1}\n\ndata: {\"b\":2}\r\n\n",
            "data: trailing-without-newline",
        ]))
        .collect()
        .await;

        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[tokio::test]
    async fn test_sse_multibyte_character_split_across_chunks() {
        let frame = "data: {\"mission\":\"café\"}\n\n".as_bytes().to_vec();
        // Split between the two bytes of 'é'.
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let lines: Vec<String> = sse_data_lines(raw_chunks(vec![
            frame[..split].to_vec(),
            frame[split..].to_vec(),
        ]))
        .collect()
        .await;

        assert_eq!(lines, vec![r#"{"mission":"café"}"#]);
    }

    #[tokio::test]
    async fn test_sse_invalid_utf8_line_is_dropped() {
        let mut bad = b"data: {\"x\":\"".to_vec();
        bad.extend_from_slice(&[0xFF, 0xFE]);
        bad.extend_from_slice(b"\"}\n");
        let lines: Vec<String> = sse_data_lines(raw_chunks(vec![bad, b"data: {\"ok\":1}\n".to_vec()]))
            .collect()
            .await;

        assert_eq!(lines, vec![r#"{"ok":1}"#]);
    }

    #[test]
    fn test_connect_bus_schemes() {
        assert!(connect_bus("memory://", None, 16, "coder").is_ok());
        assert!(connect_bus("http://localhost:8000", None, 16, "coder").is_ok());
        let err = connect_bus("redis://localhost:6379", None, 16, "coder").err().unwrap();
        assert_eq!(err.kind(), "validation");
    }
}
