//! The channel: channel metadata plus the ordered, deduplicated news list.
//!
//! Items are kept sorted newest first by their (pubDate, title) key. Two
//! maps shadow the list, one from item id to list index and one from link
//! URL to item id; both are rebuilt from the first touched index on every
//! insert and removal.
//!
//! # Notifications
//!
//! Listeners receive [`ChannelEvent`]s. Collection mutations are always
//! bracketed by an "about to" event and a "done" event, with nothing else
//! happening to the collection in between. Listeners run synchronously and
//! must not call back into the channel.
//!
//! # Files
//!
//! Every item and the channel itself own a list of files (`attachedFiles`)
//! inside the channel's private data directory. The channel mints names as
//! `<dataDir>/<N>.<ext>` from a counter that only grows, deletes an item's
//! files when the item goes away, and can sweep files nobody owns.

mod document;

use crate::error::{NewsError, NewsResult};
use crate::news::{ItemId, NewsItem};
use crate::records::roles::{CHANNEL_SCHEMA, channel, news};
use crate::records::{ObserverId, RecordStore, Role, Schema, Value};
use chrono::{DateTime, FixedOffset};
use itertools::Itertools;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, error, info, instrument, warn};

/// Default soft limit of the temporary item cache.
pub const DEFAULT_TEMPORARY_CACHE_SIZE: usize = 5;

/// Change notifications produced by a [`Channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    ItemsAboutToInsert { index: usize },
    ItemsInserted,
    /// Inclusive range of indices about to go away.
    ItemsAboutToRemove { start: usize, end: usize },
    ItemsRemoved,
    ItemUpdated { index: usize, roles: Vec<usize> },
    AboutToRefresh,
    Refreshed,
}

type Listener = Box<dyn FnMut(&ChannelEvent)>;

/// A channel shared between the updater and the completers working on it.
/// Borrows must never be held across an await.
pub type SharedChannel = Rc<RefCell<Channel>>;

pub struct Channel {
    store: RecordStore,
    item_schema: &'static Schema,
    items: Vec<NewsItem>,
    index_by_id: HashMap<ItemId, usize>,
    id_by_link: HashMap<String, ItemId>,
    data_dir: PathBuf,
    file_creation_index: u64,
    temporary: VecDeque<NewsItem>,
    temporary_limit: usize,
    listeners: Vec<(ObserverId, Listener)>,
    next_listener: u64,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("site_url", &self.store.url(channel::SITE_URL))
            .field("items", &self.items.len())
            .field("temporary", &self.temporary.len())
            .field("data_dir", &self.data_dir)
            .field("file_creation_index", &self.file_creation_index)
            .finish()
    }
}

impl Channel {
    /// Create a channel for `feed_url` whose items follow `item_schema`.
    ///
    /// # Arguments
    ///
    /// * `feed_url` - URL of the RSS document, stored as the `siteUrl` role
    /// * `data_dir` - Private directory for the files items and channel own;
    ///   created if absent
    /// * `item_schema` - Schema of the items, the standard news roles plus
    ///   any site extension
    ///
    /// # Errors
    ///
    /// Fails if the data directory cannot be created or resolved.
    pub fn new(
        feed_url: &str,
        data_dir: impl AsRef<Path>,
        item_schema: &'static Schema,
    ) -> NewsResult<Self> {
        fs::create_dir_all(data_dir.as_ref())?;
        let data_dir = std::path::absolute(data_dir.as_ref())?;
        let mut store = RecordStore::new(&CHANNEL_SCHEMA);
        store.set_quiet(channel::SITE_URL, feed_url);
        info!(%feed_url, data_dir = %data_dir.display(), "Channel created");
        Ok(Self {
            store,
            item_schema,
            items: Vec::new(),
            index_by_id: HashMap::new(),
            id_by_link: HashMap::new(),
            data_dir,
            file_creation_index: 0,
            temporary: VecDeque::new(),
            temporary_limit: DEFAULT_TEMPORARY_CACHE_SIZE,
            listeners: Vec::new(),
            next_listener: 0,
        })
    }

    pub fn with_temporary_limit(mut self, limit: usize) -> Self {
        self.temporary_limit = limit;
        self
    }

    pub fn feed_url(&self) -> &str {
        self.store.url(channel::SITE_URL)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn file_creation_index(&self) -> u64 {
        self.file_creation_index
    }

    pub fn item_schema(&self) -> &'static Schema {
        self.item_schema
    }

    // ---- channel roles ----

    pub fn roles(&self) -> &RecordStore {
        &self.store
    }

    /// Set a channel role, notifying role observers.
    pub fn set_role(&mut self, role: Role, value: impl Into<Value>) -> bool {
        self.store.set(role, value)
    }

    pub fn add_role_observer(&mut self, observer: impl FnMut(usize) + 'static) -> ObserverId {
        self.store.add_observer(observer)
    }

    pub fn remove_role_observer(&mut self, id: ObserverId) -> bool {
        self.store.remove_observer(id)
    }

    // ---- notifications ----

    pub fn add_listener(&mut self, listener: impl FnMut(&ChannelEvent) + 'static) -> ObserverId {
        let id = ObserverId::from_raw(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ObserverId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(k, _)| *k != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: ChannelEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    pub fn begin_refresh(&mut self) {
        self.emit(ChannelEvent::AboutToRefresh);
    }

    pub fn end_refresh(&mut self) {
        self.emit(ChannelEvent::Refreshed);
    }

    // ---- lookup ----

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[NewsItem] {
        &self.items
    }

    pub fn index_of(&self, id: ItemId) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    pub fn id_at(&self, index: usize) -> Option<ItemId> {
        self.items.get(index).map(NewsItem::id)
    }

    /// Id of the listed item whose link is `url`.
    pub fn id_for_link(&self, url: &str) -> Option<ItemId> {
        self.id_by_link.get(url).copied()
    }

    /// Look an item up by id, in the list or in the temporary cache.
    pub fn item(&self, id: ItemId) -> Option<&NewsItem> {
        match self.index_of(id) {
            Some(index) => self.items.get(index),
            None => self.temporary.iter().find(|i| i.id() == id),
        }
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut NewsItem> {
        match self.index_of(id) {
            Some(index) => self.items.get_mut(index),
            None => self.temporary.iter_mut().find(|i| i.id() == id),
        }
    }

    /// Ids of listed items that have not been completed yet, newest first.
    pub fn incomplete_ids(&self) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|i| !i.is_complete())
            .map(NewsItem::id)
            .collect()
    }

    // ---- insertion ----

    /// Insert a new item built from `fields`.
    ///
    /// The item gets a fresh id and a copy of every role the two schemas
    /// share. Unset `qmlItem` and `complete` roles get their defaults
    /// without notification.
    ///
    /// # Returns
    ///
    /// The new item's id, or `None` if an equal item is already listed.
    pub fn add_item(&mut self, fields: &RecordStore) -> Option<ItemId> {
        let mut item = NewsItem::new(self.item_schema);
        item.store_mut().copy_from(fields);
        match self.insert_item(item) {
            Ok((id, _)) => Some(id),
            Err(duplicate) => {
                debug!(title = %duplicate.title(), "Item already listed");
                None
            }
        }
    }

    /// Find where `item` belongs in the descending list.
    ///
    /// Head and tail are checked before falling back to a binary search.
    /// `None` means an equal item is already listed.
    fn insertion_point(&self, item: &NewsItem) -> Option<usize> {
        let (Some(head), Some(tail)) = (self.items.first(), self.items.last()) else {
            return Some(0);
        };
        if item > head {
            return Some(0);
        }
        if item < tail {
            return Some(self.items.len());
        }
        if item == head || item == tail {
            return None;
        }
        self.items.binary_search_by(|other| item.cmp(other)).err()
    }

    fn insert_item(&mut self, mut item: NewsItem) -> Result<(ItemId, usize), NewsItem> {
        let Some(index) = self.insertion_point(&item) else {
            return Err(item);
        };
        apply_item_defaults(&mut item);
        let id = item.id();
        let link = item.link().to_string();

        self.emit(ChannelEvent::ItemsAboutToInsert { index });
        self.items.insert(index, item);
        if !link.is_empty() {
            if let Some(previous) = self.id_by_link.insert(link.clone(), id) {
                warn!(%link, %previous, %id, "Two listed items share a link");
            }
        }
        self.reindex_from(index);
        self.emit(ChannelEvent::ItemsInserted);
        Ok((id, index))
    }

    fn reindex_from(&mut self, start: usize) {
        for (offset, item) in self.items[start..].iter().enumerate() {
            self.index_by_id.insert(item.id(), start + offset);
        }
    }

    /// Remove `start..end` from the list with one notification bracket.
    /// Attached files are deleted first when `delete_files` is set.
    fn remove_range(&mut self, start: usize, end: usize, delete_files: bool) -> Vec<NewsItem> {
        if start >= end {
            return Vec::new();
        }
        if delete_files {
            for item in &mut self.items[start..end] {
                delete_attached_files(item.store_mut(), news::ATTACHED_FILES);
            }
        }
        self.emit(ChannelEvent::ItemsAboutToRemove { start, end: end - 1 });
        let removed: Vec<NewsItem> = self.items.drain(start..end).collect();
        for item in &removed {
            self.index_by_id.remove(&item.id());
            if self.id_by_link.get(item.link()) == Some(&item.id()) {
                self.id_by_link.remove(item.link());
            }
        }
        self.reindex_from(start);
        self.emit(ChannelEvent::ItemsRemoved);
        removed
    }

    // ---- item updates ----

    /// Change one role of an item, listed or temporary.
    ///
    /// For a listed item a change of `pubDate` or `title` moves the item:
    /// it is removed and reinserted with the usual notifications. If the
    /// new key collides with another listed item the moved item is dropped
    /// and its files deleted. A change of `link` relocates the link map
    /// entry. Every other change is reported as
    /// [`ChannelEvent::ItemUpdated`].
    ///
    /// # Errors
    ///
    /// [`NewsError::UnknownItem`] if no item has this id.
    pub fn set_item_role(&mut self, id: ItemId, role: Role, value: impl Into<Value>) -> NewsResult<()> {
        let value = value.into();
        let Some(index) = self.index_of(id) else {
            let item = self
                .temporary
                .iter_mut()
                .find(|i| i.id() == id)
                .ok_or(NewsError::UnknownItem(id))?;
            item.store_mut().set(role, value);
            return Ok(());
        };

        if role == news::PUB_DATE || role == news::TITLE {
            let mut item = self.remove_range(index, index + 1, false).remove(0);
            item.store_mut().set(role, value);
            match self.insert_item(item) {
                Ok((_, new_index)) => self.emit(ChannelEvent::ItemUpdated {
                    index: new_index,
                    roles: vec![role.index],
                }),
                Err(mut duplicate) => {
                    warn!(%id, title = %duplicate.title(), "Item now equals another listed item; dropping it");
                    delete_attached_files(duplicate.store_mut(), news::ATTACHED_FILES);
                }
            }
            return Ok(());
        }

        if role == news::LINK {
            let old = self.items[index].link().to_string();
            if self.id_by_link.get(&old) == Some(&id) {
                self.id_by_link.remove(&old);
            }
            self.items[index].store_mut().set(role, value);
            let new = self.items[index].link().to_string();
            if !new.is_empty() {
                self.id_by_link.insert(new, id);
            }
        } else {
            self.items[index].store_mut().set(role, value);
        }
        self.emit(ChannelEvent::ItemUpdated { index, roles: vec![role.index] });
        Ok(())
    }

    /// Observe role changes of one item.
    pub fn add_item_observer(
        &mut self,
        id: ItemId,
        observer: impl FnMut(usize) + 'static,
    ) -> NewsResult<ObserverId> {
        let item = self.item_mut(id).ok_or(NewsError::UnknownItem(id))?;
        Ok(item.store_mut().add_observer(observer))
    }

    pub fn remove_item_observer(&mut self, id: ItemId, observer: ObserverId) -> bool {
        self.item_mut(id)
            .is_some_and(|item| item.store_mut().remove_observer(observer))
    }

    // ---- deletion ----

    /// Remove every item published at or before `date`, deleting their files.
    ///
    /// Items without a publication date sort last and are removed too.
    #[instrument(level = "debug", skip(self), fields(%date))]
    pub fn delete_older_than(&mut self, date: DateTime<FixedOffset>) -> usize {
        let start = self
            .items
            .partition_point(|item| item.pub_date().is_some_and(|d| d > date));
        let removed = self.remove_range(start, self.items.len(), true).len();
        if removed > 0 {
            info!(removed, "Deleted old news");
        }
        removed
    }

    /// Remove every listed item, deleting their files.
    pub fn clear_all(&mut self) {
        let removed = self.remove_range(0, self.items.len(), true).len();
        info!(removed, "Cleared all news");
    }

    // ---- files ----

    fn mint_file_name(&mut self, ext: &str) -> String {
        let path = self
            .data_dir
            .join(format!("{}.{}", self.file_creation_index, ext));
        self.file_creation_index += 1;
        path.to_string_lossy().into_owned()
    }

    /// Reserve a new file name for item `id` and record it as attached.
    /// The file itself is not created.
    pub fn create_file_for_item(&mut self, id: ItemId, ext: &str) -> NewsResult<PathBuf> {
        if self.item(id).is_none() {
            return Err(NewsError::UnknownItem(id));
        }
        let path = self.mint_file_name(ext);
        let item = self.item_mut(id).ok_or(NewsError::UnknownItem(id))?;
        attach_file(item.store_mut(), news::ATTACHED_FILES, &path);
        Ok(PathBuf::from(path))
    }

    /// Reserve a new file name owned by the channel itself.
    pub fn create_file_for_channel(&mut self, ext: &str) -> PathBuf {
        let path = self.mint_file_name(ext);
        attach_file(&mut self.store, channel::ATTACHED_FILES, &path);
        PathBuf::from(path)
    }

    pub fn delete_all_files_for_item(&mut self, id: ItemId) -> NewsResult<()> {
        let item = self.item_mut(id).ok_or(NewsError::UnknownItem(id))?;
        delete_attached_files(item.store_mut(), news::ATTACHED_FILES);
        Ok(())
    }

    pub fn delete_all_files_for_channel(&mut self) {
        delete_attached_files(&mut self.store, channel::ATTACHED_FILES);
    }

    /// Delete the files of every item, temporary items included, and of the channel.
    pub fn delete_all_external_files(&mut self) {
        for item in self.items.iter_mut().chain(self.temporary.iter_mut()) {
            delete_attached_files(item.store_mut(), news::ATTACHED_FILES);
        }
        self.delete_all_files_for_channel();
    }

    /// Delete every plain file in the data directory that no item and not
    /// the channel lists as attached.
    ///
    /// # Returns
    ///
    /// The number of files removed.
    #[instrument(level = "debug", skip(self))]
    pub fn delete_files_not_owned(&self) -> NewsResult<usize> {
        let owned: HashSet<PathBuf> = self
            .items
            .iter()
            .chain(self.temporary.iter())
            .flat_map(|item| item.attached_files().iter())
            .chain(self.store.list(channel::ATTACHED_FILES).iter())
            .map(PathBuf::from)
            .collect();

        let mut removed = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if owned.contains(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove orphan file"),
            }
        }
        if !removed.is_empty() {
            debug!(files = %removed.iter().map(|p| p.display()).join(", "), "Removed orphan files");
        }
        Ok(removed.len())
    }

    // ---- temporary items ----

    /// Look up a temporary item by link and mark it most recently used.
    pub fn temporary_item(&mut self, url: &str) -> Option<ItemId> {
        let position = self.temporary.iter().position(|i| i.link() == url)?;
        let item = self.temporary.remove(position)?;
        let id = item.id();
        self.temporary.push_front(item);
        Some(id)
    }

    /// Create a temporary item from `fields` at the front of the cache.
    /// The cache may exceed its limit until [`Channel::trim_temporary_cache`] runs.
    pub fn add_temporary_item(&mut self, fields: &RecordStore) -> ItemId {
        let mut item = NewsItem::new(self.item_schema);
        item.store_mut().copy_from(fields);
        apply_item_defaults(&mut item);
        let id = item.id();
        self.temporary.push_front(item);
        id
    }

    pub fn temporary_len(&self) -> usize {
        self.temporary.len()
    }

    /// Evict least recently used temporary items beyond the limit, deleting their files.
    pub fn trim_temporary_cache(&mut self) {
        while self.temporary.len() > self.temporary_limit {
            if let Some(mut evicted) = self.temporary.pop_back() {
                debug!(link = %evicted.link(), "Evicting temporary item");
                delete_attached_files(evicted.store_mut(), news::ATTACHED_FILES);
            }
        }
    }

    /// Check the list order and both maps. Used by tests and debug assertions.
    pub fn is_consistent(&self) -> bool {
        let sorted = self.items.windows(2).all(|w| w[0] > w[1]);
        let ids = self.index_by_id.len() == self.items.len()
            && self
                .items
                .iter()
                .enumerate()
                .all(|(i, item)| self.index_by_id.get(&item.id()) == Some(&i));
        let links = self
            .id_by_link
            .iter()
            .all(|(link, id)| self.item_at_id(*id).is_some_and(|item| item.link() == link))
            && self
                .items
                .iter()
                .filter(|item| !item.link().is_empty())
                .all(|item| self.id_by_link.contains_key(item.link()));
        if !(sorted && ids && links) {
            error!(sorted, ids, links, "Channel maps out of sync with the list");
        }
        sorted && ids && links
    }

    fn item_at_id(&self, id: ItemId) -> Option<&NewsItem> {
        self.index_of(id).and_then(|i| self.items.get(i))
    }
}

fn apply_item_defaults(item: &mut NewsItem) {
    let store = item.store_mut();
    if !store.is_set(news::QML_ITEM) {
        store.set_quiet(news::QML_ITEM, news::DEFAULT_DISPLAY_TEMPLATE);
    }
    if !store.is_set(news::COMPLETE) {
        store.set_quiet(news::COMPLETE, false);
    }
}

fn attach_file(store: &mut RecordStore, role: Role, path: &str) {
    let mut files = store.list(role).to_vec();
    files.push(path.to_string());
    store.set_quiet(role, files);
}

/// Remove each listed file, then empty the list. Failures are logged.
fn delete_attached_files(store: &mut RecordStore, role: Role) {
    for path in store.list(role) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(%path, error = %e, "Failed to remove attached file");
            }
        }
    }
    store.set_quiet(role, Vec::<String>::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{channel_in, date, fields};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    fn record_events(channel: &mut Channel) -> Rc<RefCell<Vec<ChannelEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        channel.add_listener(move |e| sink.borrow_mut().push(e.clone()));
        events
    }

    fn titles(channel: &Channel) -> Vec<&str> {
        channel.items().iter().map(NewsItem::title).collect()
    }

    #[test]
    fn test_insertion_keeps_newest_first() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        channel.add_item(&fields("A", "http://a", Some(date(2013, 1, 3, 10))));
        channel.add_item(&fields("B", "http://b", Some(date(2013, 1, 1, 10))));
        channel.add_item(&fields("C", "http://c", Some(date(2013, 1, 2, 10))));
        assert_eq!(titles(&channel), vec!["A", "C", "B"]);
        assert!(channel.is_consistent());
    }

    #[test]
    fn test_insert_brackets_notifications() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        channel.add_item(&fields("A", "http://a", Some(date(2013, 1, 3, 10))));
        let events = record_events(&mut channel);
        channel.add_item(&fields("B", "http://b", Some(date(2013, 1, 1, 10))));
        assert_eq!(
            *events.borrow(),
            vec![ChannelEvent::ItemsAboutToInsert { index: 1 }, ChannelEvent::ItemsInserted]
        );
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let when = Some(date(2013, 1, 2, 10));
        for title in ["A", "B", "C", "D", "E"] {
            channel.add_item(&fields(title, &format!("http://{title}"), when));
        }
        for title in ["A", "C", "E"] {
            assert!(channel.add_item(&fields(title, "http://other", when)).is_none());
        }
        assert_eq!(channel.len(), 5);
        assert_eq!(titles(&channel), vec!["E", "D", "C", "B", "A"]);
        assert!(channel.is_consistent());
    }

    #[test]
    fn test_defaults_are_quiet() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let id = channel.add_item(&fields("A", "http://a", None)).unwrap();
        let item = channel.item(id).unwrap();
        assert_eq!(item.store().url(news::QML_ITEM), news::DEFAULT_DISPLAY_TEMPLATE);
        assert_eq!(item.store().get(news::COMPLETE), &Value::Bool(false));
    }

    #[test]
    fn test_maps_follow_every_insert_and_delete() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        for day in [5, 1, 3, 9, 7, 2] {
            let link = format!("http://x/{day}");
            channel.add_item(&fields(&format!("T{day}"), &link, Some(date(2013, 1, day, 8))));
            assert!(channel.is_consistent());
        }
        channel.delete_older_than(date(2013, 1, 3, 8));
        assert!(channel.is_consistent());
        assert_eq!(titles(&channel), vec!["T9", "T7", "T5"]);
        assert_eq!(channel.id_for_link("http://x/1"), None);
        let id9 = channel.id_for_link("http://x/9").unwrap();
        assert_eq!(channel.index_of(id9), Some(0));
    }

    #[test]
    fn test_delete_older_than_removes_suffix_with_files() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        channel.add_item(&fields("A", "http://a", Some(date(2013, 1, 3, 10))));
        let b = channel.add_item(&fields("B", "http://b", Some(date(2013, 1, 1, 10)))).unwrap();
        channel.add_item(&fields("C", "http://c", Some(date(2013, 1, 2, 10))));

        let file = channel.create_file_for_item(b, "jpg").unwrap();
        fs::write(&file, b"jpeg").unwrap();

        let events = record_events(&mut channel);
        let removed = channel.delete_older_than(date(2013, 1, 2, 0));
        assert_eq!(removed, 1);
        assert_eq!(titles(&channel), vec!["A", "C"]);
        assert_eq!(
            *events.borrow(),
            vec![ChannelEvent::ItemsAboutToRemove { start: 2, end: 2 }, ChannelEvent::ItemsRemoved]
        );
        assert!(!file.exists());
    }

    #[test]
    fn test_clear_all_is_one_bracket() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        for day in 1..=3 {
            channel.add_item(&fields("T", "", Some(date(2013, 1, day, 10))));
        }
        let events = record_events(&mut channel);
        channel.clear_all();
        assert!(channel.is_empty());
        assert_eq!(
            *events.borrow(),
            vec![ChannelEvent::ItemsAboutToRemove { start: 0, end: 2 }, ChannelEvent::ItemsRemoved]
        );
    }

    #[test]
    fn test_file_names_are_minted_in_order() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let id = channel.add_item(&fields("A", "http://a", None)).unwrap();
        let first = channel.create_file_for_item(id, "png").unwrap();
        let second = channel.create_file_for_channel("xml");
        assert_eq!(first, channel.data_dir().join("0.png"));
        assert_eq!(second, channel.data_dir().join("1.xml"));
        assert_eq!(channel.file_creation_index(), 2);
        assert_eq!(channel.item(id).unwrap().attached_files().len(), 1);
        assert!(!first.exists());
    }

    #[test]
    fn test_delete_all_files_for_item() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let id = channel.add_item(&fields("A", "http://a", None)).unwrap();
        let paths: Vec<PathBuf> = (0..3)
            .map(|_| channel.create_file_for_item(id, "bin").unwrap())
            .collect();
        for p in &paths[..2] {
            fs::write(p, b"x").unwrap();
        }
        channel.delete_all_files_for_item(id).unwrap();
        assert!(channel.item(id).unwrap().attached_files().is_empty());
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_delete_files_not_owned() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let id = channel.add_item(&fields("A", "http://a", None)).unwrap();
        let owned = channel.create_file_for_item(id, "png").unwrap();
        let temp = channel.add_temporary_item(&fields("T", "http://t", None));
        let temp_file = channel.create_file_for_item(temp, "png").unwrap();
        let stray = channel.data_dir().join("stray.png");
        fs::create_dir(channel.data_dir().join("subdir")).unwrap();
        for p in [&owned, &temp_file, &stray] {
            fs::write(p, b"x").unwrap();
        }

        assert_eq!(channel.delete_files_not_owned().unwrap(), 1);
        assert!(owned.exists());
        assert!(temp_file.exists());
        assert!(!stray.exists());
        assert!(channel.data_dir().join("subdir").exists());
    }

    #[test]
    fn test_pub_date_change_moves_item() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let a = channel.add_item(&fields("A", "http://a", Some(date(2013, 1, 3, 10)))).unwrap();
        channel.add_item(&fields("B", "http://b", Some(date(2013, 1, 2, 10))));
        let events = record_events(&mut channel);

        channel.set_item_role(a, news::PUB_DATE, date(2013, 1, 1, 10)).unwrap();
        assert_eq!(titles(&channel), vec!["B", "A"]);
        assert_eq!(channel.index_of(a), Some(1));
        assert!(channel.is_consistent());
        assert_eq!(
            *events.borrow(),
            vec![
                ChannelEvent::ItemsAboutToRemove { start: 0, end: 0 },
                ChannelEvent::ItemsRemoved,
                ChannelEvent::ItemsAboutToInsert { index: 1 },
                ChannelEvent::ItemsInserted,
                ChannelEvent::ItemUpdated { index: 1, roles: vec![news::PUB_DATE.index] },
            ]
        );
    }

    #[test]
    fn test_link_change_relocates_lookup() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let a = channel.add_item(&fields("A", "http://old", None)).unwrap();
        channel.set_item_role(a, news::LINK, "http://new").unwrap();
        assert_eq!(channel.id_for_link("http://old"), None);
        assert_eq!(channel.id_for_link("http://new"), Some(a));
    }

    #[test]
    fn test_title_collision_drops_moved_item() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let when = Some(date(2013, 1, 2, 10));
        channel.add_item(&fields("A", "http://a", when));
        let b = channel.add_item(&fields("B", "http://b", when)).unwrap();
        let file = channel.create_file_for_item(b, "png").unwrap();
        fs::write(&file, b"x").unwrap();

        channel.set_item_role(b, news::TITLE, "A").unwrap();
        assert_eq!(titles(&channel), vec!["A"]);
        assert!(channel.item(b).is_none());
        assert_eq!(channel.id_for_link("http://b"), None);
        assert!(!file.exists());
        assert!(channel.is_consistent());
    }

    #[test]
    fn test_delete_all_external_files() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let id = channel.add_item(&fields("A", "http://a", None)).unwrap();
        let temp = channel.add_temporary_item(&fields("T", "http://t", None));
        let files = [
            channel.create_file_for_item(id, "png").unwrap(),
            channel.create_file_for_item(temp, "png").unwrap(),
            channel.create_file_for_channel("png"),
        ];
        for f in &files {
            fs::write(f, b"x").unwrap();
        }

        channel.delete_all_external_files();
        assert!(files.iter().all(|f| !f.exists()));
        assert!(channel.item(id).unwrap().attached_files().is_empty());
        assert!(channel.item(temp).unwrap().attached_files().is_empty());
        assert!(channel.roles().list(channel::ATTACHED_FILES).is_empty());
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn test_item_observers_and_updates() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir);
        let a = channel.add_item(&fields("A", "http://a", None)).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let handle = channel.add_item_observer(a, move |r| sink.borrow_mut().push(r)).unwrap();
        let events = record_events(&mut channel);

        channel.set_item_role(a, news::DESCRIPTION, "body").unwrap();
        assert_eq!(*seen.borrow(), vec![news::DESCRIPTION.index]);
        assert_eq!(
            *events.borrow(),
            vec![ChannelEvent::ItemUpdated { index: 0, roles: vec![news::DESCRIPTION.index] }]
        );
        assert!(channel.remove_item_observer(a, handle));
    }

    #[test]
    fn test_unknown_item_is_an_error() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir).with_temporary_limit(0);
        let id = channel.add_temporary_item(&fields("T", "http://t", None));
        channel.trim_temporary_cache();
        let err = channel.set_item_role(id, news::TITLE, "x").unwrap_err();
        assert!(matches!(err, NewsError::UnknownItem(i) if i == id));
    }

    #[test]
    fn test_temporary_cache_recency_and_trim() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir).with_temporary_limit(2);
        let first = channel.add_temporary_item(&fields("1", "http://1", None));
        let file = channel.create_file_for_item(first, "png").unwrap();
        fs::write(&file, b"x").unwrap();
        channel.add_temporary_item(&fields("2", "http://2", None));
        channel.add_temporary_item(&fields("3", "http://3", None));
        assert_eq!(channel.temporary_len(), 3);

        // Touching the oldest entry saves it from eviction.
        assert_eq!(channel.temporary_item("http://1"), Some(first));
        channel.trim_temporary_cache();
        assert_eq!(channel.temporary_len(), 2);
        assert!(channel.temporary_item("http://2").is_none());
        assert!(channel.temporary_item("http://3").is_some());
        assert!(file.exists());

        assert_eq!(channel.temporary_item("http://missing"), None);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_temporary_eviction_deletes_files() {
        let dir = tempdir().unwrap();
        let mut channel = channel_in(&dir).with_temporary_limit(1);
        let old = channel.add_temporary_item(&fields("1", "http://1", None));
        let file = channel.create_file_for_item(old, "png").unwrap();
        fs::write(&file, b"x").unwrap();
        channel.add_temporary_item(&fields("2", "http://2", None));
        channel.trim_temporary_cache();
        assert!(!file.exists());
    }
}
