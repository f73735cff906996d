//! Conversion of a whole channel to and from its persisted JSON document.
//!
//! The document holds every channel role by name, `fileCreationIndex`, and
//! `news`: the listed items in order, each as an object of its roles.
//! Temporary items are not persisted.

use super::Channel;
use crate::error::{NewsError, NewsResult};
use crate::news::NewsItem;
use crate::records::roles::channel;
use serde_json::{Map, Value as Json};
use tracing::{info, warn};

const FILE_CREATION_INDEX: &str = "fileCreationIndex";
const NEWS: &str = "news";

impl Channel {
    /// Serialize the channel. Every declared role of the channel and of
    /// each item is written, unset roles as their empty representation.
    pub fn to_document(&self) -> Json {
        let mut doc = self.store.to_document();
        doc.insert(FILE_CREATION_INDEX.to_string(), Json::from(self.file_creation_index));
        doc.insert(
            NEWS.to_string(),
            Json::Array(
                self.items
                    .iter()
                    .map(|item| Json::Object(item.store().to_document()))
                    .collect(),
            ),
        );
        Json::Object(doc)
    }

    /// Replace channel roles and listed items with the content of `doc`.
    ///
    /// The load is wrapped in a refresh notification pair. Files on disk
    /// are left alone, so the files of the restored items stay valid.
    ///
    /// # Errors
    ///
    /// Fails on an unknown role name, on a missing or malformed `news`
    /// list, or on a value of the wrong type. The channel is then left
    /// partially loaded and callers should treat it as having no prior
    /// state.
    pub fn load_document(&mut self, doc: &Json) -> NewsResult<()> {
        let doc = doc
            .as_object()
            .ok_or_else(|| NewsError::MalformedDocument("document is not an object".into()))?;

        self.begin_refresh();
        let result = self.load_fields(doc);
        self.end_refresh();
        if result.is_ok() {
            info!(items = self.items.len(), file_creation_index = self.file_creation_index, "Channel restored");
        }
        result
    }

    fn load_fields(&mut self, doc: &Map<String, Json>) -> NewsResult<()> {
        let feed_url = self.feed_url().to_string();
        self.remove_range(0, self.items.len(), false);
        self.store.load_document(doc, &[FILE_CREATION_INDEX, NEWS])?;
        if !self.store.is_set(channel::SITE_URL) {
            self.store.set_quiet(channel::SITE_URL, feed_url);
        }

        if let Some(json) = doc.get(FILE_CREATION_INDEX) {
            let stored = json.as_u64().ok_or_else(|| {
                NewsError::MalformedDocument(format!("{FILE_CREATION_INDEX} is not an unsigned integer"))
            })?;
            self.file_creation_index = self.file_creation_index.max(stored);
        }

        let news = doc
            .get(NEWS)
            .ok_or_else(|| NewsError::MalformedDocument("missing news list".into()))?
            .as_array()
            .ok_or_else(|| NewsError::MalformedDocument("news is not a list".into()))?;

        for entry in news {
            let fields = entry
                .as_object()
                .ok_or_else(|| NewsError::MalformedDocument("news entry is not an object".into()))?;
            let mut item = NewsItem::new(self.item_schema);
            item.store_mut().load_document(fields, &[])?;
            if let Err(duplicate) = self.insert_item(item) {
                warn!(title = %duplicate.title(), "Dropping duplicate stored item");
            }
        }
        Ok(())
    }
}
