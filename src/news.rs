//! News items: a record with identity and a (pubDate, title) ordering key.

use crate::records::roles::news;
use crate::records::{RecordStore, Schema};
use chrono::{DateTime, FixedOffset};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a news item. Never reused and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    fn fresh() -> Self {
        ItemId(NEXT_ITEM_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A news item.
///
/// Two items are equal when both their publication date and title match,
/// regardless of any other role. Ordering follows the same key: by date,
/// then by title, with an unset date sorting below every set one. Channels
/// keep their items in descending order.
#[derive(Debug)]
pub struct NewsItem {
    id: ItemId,
    store: RecordStore,
}

impl NewsItem {
    pub fn new(schema: &'static Schema) -> Self {
        Self {
            id: ItemId::fresh(),
            store: RecordStore::new(schema),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut RecordStore {
        &mut self.store
    }

    pub fn title(&self) -> &str {
        self.store.text(news::TITLE)
    }

    pub fn link(&self) -> &str {
        self.store.url(news::LINK)
    }

    pub fn pub_date(&self) -> Option<DateTime<FixedOffset>> {
        self.store.date(news::PUB_DATE)
    }

    pub fn is_complete(&self) -> bool {
        self.store.flag(news::COMPLETE)
    }

    pub fn attached_files(&self) -> &[String] {
        self.store.list(news::ATTACHED_FILES)
    }

    fn key(&self) -> (Option<DateTime<FixedOffset>>, &str) {
        (self.pub_date(), self.title())
    }
}

impl PartialEq for NewsItem {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for NewsItem {}

impl PartialOrd for NewsItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NewsItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
