//! On-disk persistence of the channel document.
//!
//! The whole channel (its roles, the file counter and every listed item)
//! is stored as one JSON file, by default `storednews.json` in the data
//! directory. Temporary items are never stored.

use crate::channel::SharedChannel;
use crate::error::NewsResult;
use serde_json::Value as Json;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Load a stored channel document into `channel`.
///
/// # Returns
///
/// `Ok(true)` if a document was loaded, `Ok(false)` if there is no file
/// at `path`.
///
/// # Errors
///
/// Unreadable files, invalid JSON and documents the channel rejects. The
/// channel may be partially loaded afterwards; callers should treat it as
/// having no prior state.
#[instrument(level = "info", skip(channel), fields(path = %path.display()))]
pub async fn load_channel(channel: &SharedChannel, path: &Path) -> NewsResult<bool> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No stored news");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };
    let document: Json = serde_json::from_str(&text)?;
    channel.borrow_mut().load_document(&document)?;
    info!(items = channel.borrow().len(), "Loaded stored news");
    Ok(true)
}

/// Write the channel document to `path`, creating its directory if needed.
///
/// The document goes to a sibling temporary file first and is renamed
/// over `path`, so a crash never leaves a half-written store.
#[instrument(level = "info", skip(channel), fields(path = %path.display()))]
pub async fn save_channel(channel: &SharedChannel, path: &Path) -> NewsResult<()> {
    let (json, items) = {
        let channel = channel.borrow();
        (serde_json::to_string_pretty(&channel.to_document())?, channel.len())
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create store directory");
            return Err(e.into());
        }
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    info!(items, "Wrote stored news");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NewsError;
    use crate::records::roles::news;
    use crate::testing::{channel_in, date, fields};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_then_load_restores_items() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store/storednews.json");
        let channel = Rc::new(RefCell::new(channel_in(&dir)));
        let id = channel
            .borrow_mut()
            .add_item(&fields("Editoriale", "http://www.ilribelle.com/e", Some(date(2013, 1, 3, 9))))
            .unwrap();
        channel.borrow_mut().set_item_role(id, news::DESCRIPTION, "<p>testo</p>").unwrap();
        channel.borrow_mut().create_file_for_item(id, "jpg").unwrap();

        save_channel(&channel, &path).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let restored = Rc::new(RefCell::new(channel_in(&dir)));
        assert!(load_channel(&restored, &path).await.unwrap());
        let restored = restored.borrow();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.file_creation_index(), 1);
        let item = &restored.items()[0];
        assert_eq!(item.title(), "Editoriale");
        assert_eq!(item.store().text(news::DESCRIPTION), "<p>testo</p>");
        assert_eq!(item.attached_files().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_store_is_not_an_error() {
        let dir = tempdir().unwrap();
        let channel = Rc::new(RefCell::new(channel_in(&dir)));
        let loaded = load_channel(&channel, &dir.path().join("absent.json")).await.unwrap();
        assert!(!loaded);
        assert!(channel.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_store_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storednews.json");
        std::fs::write(&path, "{\"news\": [").unwrap();
        let channel = Rc::new(RefCell::new(channel_in(&dir)));
        let err = load_channel(&channel, &path).await.unwrap_err();
        assert!(matches!(err, NewsError::Json(_)));
    }
}
