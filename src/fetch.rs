//! The network fetch capability consumed by the feed parser and the completers.
//!
//! A fetch is a stream of byte chunks. Every chunk is data becoming
//! available, the end of the stream means the whole document arrived, an
//! `Err` item reports a network failure, and dropping the stream interrupts
//! the request. Redirects are followed by the implementation and never
//! surface to the caller.

use crate::error::FetchError;
use futures::TryFutureExt;
use futures::stream::{LocalBoxStream, StreamExt, TryStreamExt};
use std::time::Duration;
use tracing::{debug, instrument};

pub type ByteStream = LocalBoxStream<'static, Result<Vec<u8>, FetchError>>;

pub trait NetworkFetch {
    /// Start downloading `url`.
    fn get_file(&self, url: &str) -> ByteStream;
}

/// [`NetworkFetch`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    /// Build a client that follows redirects and identifies itself with `user_agent`.
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

impl NetworkFetch for HttpFetch {
    fn get_file(&self, url: &str) -> ByteStream {
        debug!(%url, "GET");
        let request = self.client.get(url);
        async move {
            let response = request.send().await?.error_for_status()?;
            Ok::<_, FetchError>(response.bytes_stream().map_ok(|b| b.to_vec()).map_err(FetchError::from))
        }
        .try_flatten_stream()
        .boxed_local()
    }
}

/// Download `url` completely.
#[instrument(level = "debug", skip(fetch))]
pub async fn fetch_all(fetch: &dyn NetworkFetch, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut stream = fetch.get_file(url);
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    debug!(bytes = body.len(), "Download finished");
    Ok(body)
}
