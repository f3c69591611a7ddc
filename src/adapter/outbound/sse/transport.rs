//! HTTP push transport: the client side of the relay's event stream.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use tracing::debug;
use url::Url;

use super::decoder::SseDecoder;
use crate::error::{Result, TransportError};
use crate::port::{PushConnection, PushTransport};

const EVENT_STREAM: &str = "text/event-stream";

/// Opens `GET <endpoint>[?fromSequence=N]` event streams.
pub struct HttpPushTransport {
    http: HttpClient,
    endpoint: Url,
}

impl HttpPushTransport {
    /// Create a transport for the relay at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if `endpoint` is not an absolute URL.
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(),
            endpoint: Url::parse(endpoint)?,
        })
    }

    /// URL for a connection resuming after `from_sequence`.
    #[must_use]
    pub fn url_for(&self, from_sequence: Option<u64>) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(sequence) = from_sequence {
            url.query_pairs_mut()
                .append_pair("fromSequence", &sequence.to_string());
        }
        url
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn open(
        &self,
        from_sequence: Option<u64>,
    ) -> std::result::Result<Box<dyn PushConnection>, TransportError> {
        let url = self.url_for(from_sequence);
        debug!(url = %url, "Opening push stream");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with(EVENT_STREAM) {
            return Err(TransportError::Protocol(format!(
                "unexpected content type '{content_type}'"
            )));
        }

        Ok(Box::new(HttpPushConnection {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }))
    }
}

/// One open event stream.
struct HttpPushConnection {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
}

#[async_trait]
impl PushConnection for HttpPushConnection {
    async fn next_frame(&mut self) -> std::result::Result<String, TransportError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(frame);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    self.pending.extend(
                        self.decoder
                            .feed(&chunk)
                            .into_iter()
                            .filter(|event| event.is_message())
                            .map(|event| event.data),
                    );
                }
                Some(Err(err)) => return Err(TransportError::Io(err.to_string())),
                None => return Err(TransportError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_without_resume() {
        let transport = HttpPushTransport::new("http://localhost:8080/streams/oss/api/stream").unwrap();
        assert_eq!(
            transport.url_for(None).as_str(),
            "http://localhost:8080/streams/oss/api/stream"
        );
    }

    #[test]
    fn test_url_with_resume() {
        let transport = HttpPushTransport::new("http://localhost:8080/stream").unwrap();
        assert_eq!(
            transport.url_for(Some(41)).as_str(),
            "http://localhost:8080/stream?fromSequence=41"
        );
    }

    #[test]
    fn test_rejects_relative_endpoint() {
        assert!(HttpPushTransport::new("/stream").is_err());
    }
}
