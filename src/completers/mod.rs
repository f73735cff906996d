//! Completers enrich a channel or its items with data the feed lacks.
//!
//! A completer is built for one target and resolves the future returned by
//! `complete` exactly once per run, when it is done. Calling `complete`
//! again re-runs it. Completers never own the channel; they share it as a
//! [`SharedChannel`] and borrow it only between awaits.

pub mod all_items;
pub mod ilribelle;

pub use all_items::AllItemsCompleter;

use crate::channel::SharedChannel;
use crate::news::ItemId;
use crate::records::roles::news;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tracing::{debug, warn};

/// Completes a single news item.
pub trait ItemCompleter {
    fn complete(&mut self) -> LocalBoxFuture<'_, ()>;
}

/// Completes the channel itself, before its items.
pub trait ChannelCompleter {
    fn complete(&mut self) -> LocalBoxFuture<'_, ()>;
}

/// Builds a fresh [`ItemCompleter`] for one item of a channel.
pub trait ItemCompleterFactory {
    fn create(&self, channel: SharedChannel, item: ItemId) -> Box<dyn ItemCompleter>;
}

impl<F> ItemCompleterFactory for F
where
    F: Fn(SharedChannel, ItemId) -> Box<dyn ItemCompleter>,
{
    fn create(&self, channel: SharedChannel, item: ItemId) -> Box<dyn ItemCompleter> {
        self(channel, item)
    }
}

/// Mark an item complete. A vanished item is logged, not fatal.
pub(crate) fn mark_complete(channel: &SharedChannel, item: ItemId) {
    if let Err(e) = channel.borrow_mut().set_item_role(item, news::COMPLETE, true) {
        warn!(%item, error = %e, "Could not mark item complete");
    }
}

/// Channel completer for feeds that need no channel-level enrichment.
#[derive(Debug, Default)]
pub struct DefaultChannelCompleter;

impl ChannelCompleter for DefaultChannelCompleter {
    fn complete(&mut self) -> LocalBoxFuture<'_, ()> {
        futures::future::ready(()).boxed_local()
    }
}

/// Item completer for feeds whose items are complete as delivered.
pub struct DefaultItemCompleter {
    channel: SharedChannel,
    item: ItemId,
}

impl DefaultItemCompleter {
    pub fn new(channel: SharedChannel, item: ItemId) -> Self {
        Self { channel, item }
    }
}

impl ItemCompleter for DefaultItemCompleter {
    fn complete(&mut self) -> LocalBoxFuture<'_, ()> {
        async move {
            debug!(item = %self.item, "Nothing to complete");
            mark_complete(&self.channel, self.item);
        }
        .boxed_local()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultItemCompleterFactory;

impl ItemCompleterFactory for DefaultItemCompleterFactory {
    fn create(&self, channel: SharedChannel, item: ItemId) -> Box<dyn ItemCompleter> {
        Box::new(DefaultItemCompleter::new(channel, item))
    }
}
