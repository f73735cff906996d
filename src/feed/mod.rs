//! Feed download and parse.
//!
//! [`fetch_and_parse`] streams the channel's RSS document through a
//! [`FeedParser`], chunk by chunk, so items show up in the channel while the
//! rest of the document is still downloading.

pub mod date;
pub mod parser;

pub use parser::{FeedParser, FeedStats, ParseState};

use crate::channel::SharedChannel;
use crate::error::NewsResult;
use crate::fetch::NetworkFetch;
use futures::StreamExt;
use tracing::{info, instrument};

/// Download the channel's feed and parse it into the channel.
///
/// The channel is borrowed only while a chunk is being parsed, never
/// across an await.
///
/// # Errors
///
/// Network failures and feed errors end the fetch. Whatever was parsed
/// before the failure stays in the channel.
#[instrument(level = "info", skip_all, fields(url = tracing::field::Empty))]
pub async fn fetch_and_parse(channel: &SharedChannel, fetch: &dyn NetworkFetch) -> NewsResult<FeedStats> {
    let (url, schema) = {
        let channel = channel.borrow();
        (channel.feed_url().to_string(), channel.item_schema())
    };
    tracing::Span::current().record("url", url.as_str());

    let mut parser = FeedParser::new(schema);
    let mut stream = fetch.get_file(&url);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        parser.feed(&chunk, &mut channel.borrow_mut())?;
    }
    let stats = parser.finish(&mut channel.borrow_mut())?;
    info!(parsed = stats.parsed, added = stats.added, "Feed parsed");
    Ok(stats)
}
