//! # Ribelle News
//!
//! The core of an RSS news reader: a channel keeps the feed's news items
//! sorted newest first and free of duplicates, a streaming parser fills it
//! while the feed downloads, and completers enrich each item by scraping its
//! article page (www.ilribelle.com has a dedicated one).
//!
//! ## Architecture
//!
//! Everything runs on one thread. The [`channel::Channel`] is shared as an
//! `Rc<RefCell<_>>` and only borrowed between awaits:
//! 1. **Fetch**: [`feed::fetch_and_parse`] streams the feed into the channel
//! 2. **Complete**: [`completers::AllItemsCompleter`] runs a bounded number
//!    of item completers at once
//! 3. **Orchestrate**: [`updater::ChannelUpdater`] sequences both and
//!    coalesces update and clear requests that arrive meanwhile
//! 4. **Persist**: [`store`] saves and restores the channel document

pub mod channel;
pub mod cli;
pub mod completers;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod news;
pub mod records;
pub mod store;
pub mod updater;
pub mod utils;

#[cfg(test)]
mod testing;

pub use channel::{Channel, ChannelEvent, SharedChannel};
pub use error::{NewsError, NewsResult};
pub use news::{ItemId, NewsItem};
