//! Where the bytes come from.
//!
//! [`StreamSource`] is the seam between the capture loop and the network. The
//! production implementation is [`HttpSource`]; tests substitute scripted
//! sources.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client, Proxy};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{RecordError, RecorderConfig};

/// A live byte stream. Yields chunks until the server closes the connection
/// or a transport error occurs.
pub type ByteStream = BoxStream<'static, Result<Bytes, RecordError>>;

#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Connect to `url` and return the body as a stream of chunks.
    async fn open(&self, url: &Url) -> Result<ByteStream, RecordError>;
}

/// Build the reqwest client shared by all attempts of a session.
pub fn create_client(config: &RecorderConfig) -> Result<Client, RecordError> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.as_str())
        .default_headers(config.headers.clone());

    if let Some(proxy_url) = &config.proxy {
        let proxy = Proxy::all(proxy_url)
            .map_err(|e| RecordError::configuration(format!("invalid proxy `{proxy_url}`: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| RecordError::configuration(format!("failed to build HTTP client: {e}")))
}

/// Plain HTTP(S) radio stream (Icecast, Shoutcast and friends).
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &RecorderConfig) -> Result<Self, RecordError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }
}

#[async_trait]
impl StreamSource for HttpSource {
    #[instrument(skip(self), level = "debug")]
    async fn open(&self, url: &Url) -> Result<ByteStream, RecordError> {
        debug!(url = %url, "Sending stream request");
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Stream request rejected");
            return Err(RecordError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }

        if let Some(content_type) = response.headers().get(reqwest::header::CONTENT_TYPE)
            && let Ok(ct) = content_type.to_str()
        {
            info!(url = %url, content_type = %ct, "Connected to stream");
        } else {
            info!(url = %url, "Connected to stream");
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(RecordError::from))
            .boxed())
    }
}
