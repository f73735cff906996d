//! Item completer for www.ilribelle.com articles.
//!
//! The feed only carries a teaser, so each item is completed by scraping its
//! page: the article body is extracted (following a continuation stub once),
//! images are downloaded next to the channel data, and audio and livestream
//! links are recorded in the site's extension roles. Requests run one at a
//! time. A failed request is logged and ends the scrape: the requests it
//! would have led to are not made, and the item ends up complete anyway.

pub mod page;

use super::{ItemCompleter, ItemCompleterFactory, mark_complete};
use crate::channel::SharedChannel;
use crate::fetch::{NetworkFetch, fetch_all};
use crate::news::ItemId;
use crate::records::{Role, Value};
use crate::records::roles::{ilribelle, news};
use crate::utils::{last_path_segment, truncate_for_log};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use page::{AudioInfo, BodyScan, ImageDownload};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, instrument, warn};

/// Folder under the downloads directory that receives audio files.
pub const AUDIO_DOWNLOAD_FOLDER: &str = "IlRibelle.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    NotStarted,
    FetchMainPage,
    FetchContinuationPage,
    FetchImage,
    FetchAudioPage,
    Complete,
}

pub struct IlRibelleCompleter {
    channel: SharedChannel,
    item: ItemId,
    fetch: Rc<dyn NetworkFetch>,
    downloads_dir: PathBuf,
    state: ScrapeState,
}

impl IlRibelleCompleter {
    /// # Arguments
    ///
    /// * `channel` - Channel owning the item; files are minted through it
    /// * `item` - The item to complete
    /// * `fetch` - Network capability used for every request
    /// * `downloads_dir` - Base directory for audio downloads
    pub fn new(
        channel: SharedChannel,
        item: ItemId,
        fetch: Rc<dyn NetworkFetch>,
        downloads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            channel,
            item,
            fetch,
            downloads_dir: downloads_dir.into(),
            state: ScrapeState::NotStarted,
        }
    }

    pub fn state(&self) -> ScrapeState {
        self.state
    }

    /// Set a role of the item, logging if the item is gone.
    fn set(&self, role: Role, value: impl Into<Value>) {
        if let Err(e) = self.channel.borrow_mut().set_item_role(self.item, role, value) {
            warn!(item = %self.item, role = role.name, error = %e, "Could not update item");
        }
    }

    /// Download a page as text. Network errors are logged and yield `None`.
    async fn fetch_page(&self, url: &str) -> Option<String> {
        match fetch_all(self.fetch.as_ref(), url).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!(item = %self.item, %url, state = ?self.state, error = %e, "Request failed");
                None
            }
        }
    }

    #[instrument(level = "debug", skip(self), fields(item = %self.item))]
    async fn run(&mut self) {
        self.state = ScrapeState::NotStarted;
        let (link, title) = {
            let channel = self.channel.borrow();
            match channel.item(self.item) {
                Some(item) => (item.link().to_string(), item.title().to_string()),
                None => {
                    warn!(item = %self.item, "Item vanished before completion");
                    self.state = ScrapeState::Complete;
                    return;
                }
            }
        };
        self.set(news::QML_ITEM, ilribelle::DISPLAY_TEMPLATE);

        self.state = ScrapeState::FetchMainPage;
        let mut page_text = self.fetch_page(&link).await;
        let continuation = page_text
            .as_deref()
            .and_then(page::extract_body)
            .and_then(page::continuation_url);
        if let Some(url) = continuation {
            debug!(%url, "Article continues on another page");
            self.state = ScrapeState::FetchContinuationPage;
            page_text = self.fetch_page(&url).await;
        }

        if let Some(text) = page_text {
            let body = page::extract_body(&text).unwrap_or_default();
            let scan = self.scan(&title, body);
            self.store_scan(&scan);
            let images_done = self.download_images(&scan.images).await;
            match &scan.audio_page {
                Some(audio_page) if images_done => self.fetch_audio(audio_page).await,
                Some(audio_page) => debug!(url = %audio_page, "Audio page skipped after failed download"),
                None => {}
            }
        }

        mark_complete(&self.channel, self.item);
        self.state = ScrapeState::Complete;
        info!(item = %self.item, %title, "Item completed");
    }

    fn scan(&self, title: &str, body: &str) -> BodyScan {
        debug!(body = %truncate_for_log(body, 200), "Scanning article body");
        let mut reserve = |ext: &str| -> Option<String> {
            match self.channel.borrow_mut().create_file_for_item(self.item, ext) {
                Ok(path) => Some(path.to_string_lossy().into_owned()),
                Err(e) => {
                    warn!(item = %self.item, error = %e, "Could not reserve image file");
                    None
                }
            }
        };
        page::scan_body(title, body, &mut reserve)
    }

    fn store_scan(&self, scan: &BodyScan) {
        self.set(news::DESCRIPTION, scan.html.as_str());
        if let Some(main) = scan.main_image() {
            self.set(ilribelle::MAIN_IMAGE_URL, main.url.as_str());
            self.set(ilribelle::MAIN_IMAGE_FILE, main.file.as_str());
        }
        self.set(ilribelle::HAS_AUDIO_RESOURCE, scan.audio_page.is_some());
        self.set(ilribelle::HAS_LIVESTREAM_LINK, scan.livestream.is_some());
        if let Some(url) = &scan.livestream {
            self.set(ilribelle::LIVESTREAM_URL, url.as_str());
        }
        if !scan.iframes.is_empty() {
            self.set(ilribelle::IFRAME_URLS, scan.iframes.clone());
        }
    }

    /// Download the images in order. Returns `false` as soon as one
    /// download fails; the images after it are not requested.
    async fn download_images(&mut self, images: &[ImageDownload]) -> bool {
        for (done, image) in images.iter().enumerate() {
            self.state = ScrapeState::FetchImage;
            let bytes = match fetch_all(self.fetch.as_ref(), &image.url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        item = %self.item,
                        url = %image.url,
                        error = %e,
                        skipped = images.len() - done - 1,
                        "Image download failed"
                    );
                    return false;
                }
            };
            if let Err(e) = tokio::fs::write(&image.file, &bytes).await {
                warn!(file = %image.file, error = %e, "Could not write image");
            }
        }
        true
    }

    async fn fetch_audio(&mut self, audio_page: &str) {
        self.state = ScrapeState::FetchAudioPage;
        if let Some(text) = self.fetch_page(audio_page).await {
            match page::parse_audio_page(&text) {
                Some(info) => self.store_audio(&info).await,
                None => debug!(url = %audio_page, "No audio block on audio page"),
            }
        }
    }

    async fn store_audio(&self, info: &AudioInfo) {
        self.set(ilribelle::AUDIO_RESOURCE_URL, info.url.as_str());
        self.set(ilribelle::AUDIO_RESOURCE_TITLE, info.title.as_str());
        self.set(ilribelle::AUDIO_RESOURCE_AUTHOR, info.author.as_str());
        self.set(ilribelle::AUDIO_RESOURCE_DURATION, info.duration_ms);

        let folder = self.downloads_dir.join(AUDIO_DOWNLOAD_FOLDER);
        if let Err(e) = tokio::fs::create_dir_all(&folder).await {
            warn!(folder = %folder.display(), error = %e, "Could not create audio download folder");
        }
        if let Some(path) = audio_path(&folder, &info.url) {
            self.set(ilribelle::AUDIO_RESOURCE_PATH, path.to_string_lossy().into_owned());
        }
    }
}

fn audio_path(folder: &Path, url: &str) -> Option<PathBuf> {
    last_path_segment(url).map(|name| folder.join(name))
}

impl ItemCompleter for IlRibelleCompleter {
    fn complete(&mut self) -> LocalBoxFuture<'_, ()> {
        self.run().boxed_local()
    }
}

/// Builds an [`IlRibelleCompleter`] per item, sharing one network capability.
#[derive(Clone)]
pub struct IlRibelleCompleterFactory {
    fetch: Rc<dyn NetworkFetch>,
    downloads_dir: PathBuf,
}

impl IlRibelleCompleterFactory {
    pub fn new(fetch: Rc<dyn NetworkFetch>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetch,
            downloads_dir: downloads_dir.into(),
        }
    }
}

impl ItemCompleterFactory for IlRibelleCompleterFactory {
    fn create(&self, channel: SharedChannel, item: ItemId) -> Box<dyn ItemCompleter> {
        Box::new(IlRibelleCompleter::new(
            channel,
            item,
            Rc::clone(&self.fetch),
            self.downloads_dir.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFetch, date, fields, ilribelle_channel_in};
    use std::cell::RefCell;
    use tempfile::{TempDir, tempdir};

    const ARTICLE: &str = "http://www.ilribelle.com/la-voce-del-ribelle/2013/1/3/articolo.html";
    const FULL: &str = "http://www.ilribelle.com/archivio-editoriali-fini/2013/1/3/articolo-completo.html";
    const IMAGE: &str = "http://www.ilribelle.com/storage/foto.jpg?__SQUARESPACE_CACHEVERSION=1";
    const AUDIO_PAGE: &str = "http://raz24.com/raz24news/2013/1/3/intervista";

    fn page_with_body(body: &str) -> String {
        format!(r#"<html><div class="nav"><div>menu</div></div><div class="body">{body}</div><div>footer</div></html>"#)
    }

    fn setup() -> (TempDir, SharedChannel, ItemId, FakeFetch) {
        let dir = tempdir().unwrap();
        let channel = Rc::new(RefCell::new(ilribelle_channel_in(&dir)));
        let id = channel
            .borrow_mut()
            .add_item(&fields("Articolo", ARTICLE, Some(date(2013, 1, 3, 9))))
            .unwrap();
        (dir, channel, id, FakeFetch::new())
    }

    fn completer(dir: &TempDir, channel: &SharedChannel, id: ItemId, fetch: &FakeFetch) -> Box<dyn ItemCompleter> {
        IlRibelleCompleterFactory::new(Rc::new(fetch.clone()), dir.path().join("downloads"))
            .create(Rc::clone(channel), id)
    }

    #[tokio::test]
    async fn test_full_scrape_follows_continuation_and_downloads() {
        let (dir, channel, id, fetch) = setup();
        fetch.respond(
            ARTICLE,
            page_with_body(&format!(r#"<p><a href="{FULL}">Continua a leggere</a></p>"#)),
        );
        fetch.respond(
            FULL,
            page_with_body(&format!(
                r#"<p>Testo</p><img src="/storage/foto.jpg?__SQUARESPACE_CACHEVERSION=1" style="width: 500px;" /><p><a href="{AUDIO_PAGE}">Ascolta</a></p>"#
            )),
        );
        fetch.respond(IMAGE, b"JPEGDATA".to_vec());
        fetch.respond(
            AUDIO_PAGE,
            r#"<div class="sqs-audio-embed" data-url="http://static.squarespace.com/audio/Intervista%201.mp3" data-title="Intervista" data-author="Raz24" data-duration-in-ms="125000"></div>"#,
        );

        completer(&dir, &channel, id, &fetch).complete().await;

        assert_eq!(fetch.requests(), vec![ARTICLE, FULL, IMAGE, AUDIO_PAGE]);
        let channel = channel.borrow();
        let item = channel.item(id).unwrap();
        let store = item.store();
        assert!(item.is_complete());
        assert_eq!(store.url(news::QML_ITEM), ilribelle::DISPLAY_TEMPLATE);
        assert!(store.text(news::DESCRIPTION).starts_with("<center><h1>Articolo</h1></center><br/><p>Testo</p>"));
        assert!(store.text(news::DESCRIPTION).contains("<$BIGIMAGEWIDTH$>"));

        let image_file = store.text(ilribelle::MAIN_IMAGE_FILE).to_string();
        assert_eq!(item.attached_files(), &[image_file.clone()]);
        assert_eq!(std::fs::read(&image_file).unwrap(), b"JPEGDATA");
        assert_eq!(store.url(ilribelle::MAIN_IMAGE_URL), IMAGE);

        assert!(store.flag(ilribelle::HAS_AUDIO_RESOURCE));
        assert_eq!(store.text(ilribelle::AUDIO_RESOURCE_TITLE), "Intervista");
        assert_eq!(store.text(ilribelle::AUDIO_RESOURCE_AUTHOR), "Raz24");
        assert_eq!(store.uint(ilribelle::AUDIO_RESOURCE_DURATION), 125_000);
        let audio_path = dir.path().join("downloads").join(AUDIO_DOWNLOAD_FOLDER).join("Intervista 1.mp3");
        assert_eq!(store.text(ilribelle::AUDIO_RESOURCE_PATH), audio_path.to_string_lossy());
        assert!(!store.flag(ilribelle::HAS_LIVESTREAM_LINK));
    }

    #[tokio::test]
    async fn test_failed_image_still_completes() {
        let (dir, channel, id, fetch) = setup();
        fetch.respond(
            ARTICLE,
            page_with_body(r#"<p>Testo</p><img src="http://www.ilribelle.com/storage/rotta.png" />"#),
        );
        fetch.fail("http://www.ilribelle.com/storage/rotta.png", "connection refused");

        let mut completer = completer(&dir, &channel, id, &fetch);
        completer.complete().await;

        let channel = channel.borrow();
        let item = channel.item(id).unwrap();
        assert!(item.is_complete());
        assert!(item.store().text(news::DESCRIPTION).contains("<$SMALLIMAGEWIDTH$>"));
        assert!(!item.store().flag(ilribelle::HAS_AUDIO_RESOURCE));
        assert_eq!(fetch.count("http://www.ilribelle.com/storage/rotta.png"), 1);
    }

    #[tokio::test]
    async fn test_failed_image_ends_remaining_requests() {
        let (dir, channel, id, fetch) = setup();
        let one = "http://www.ilribelle.com/storage/one.png";
        let two = "http://www.ilribelle.com/storage/two.png";
        fetch.respond(
            ARTICLE,
            page_with_body(&format!(
                r#"<img src="{one}" /><img src="{two}" /><p><a href="{AUDIO_PAGE}">Ascolta</a></p>"#
            )),
        );
        fetch.fail(one, "connection reset");
        fetch.respond(two, b"PNG".to_vec());
        fetch.respond(AUDIO_PAGE, r#"<div class="sqs-audio-embed" data-url="http://x/a.mp3"></div>"#);

        completer(&dir, &channel, id, &fetch).complete().await;

        assert_eq!(fetch.requests(), vec![ARTICLE, one]);
        let channel = channel.borrow();
        let item = channel.item(id).unwrap();
        assert!(item.is_complete());
        assert!(item.store().flag(ilribelle::HAS_AUDIO_RESOURCE));
        assert!(!item.store().is_set(ilribelle::AUDIO_RESOURCE_URL));
    }

    #[tokio::test]
    async fn test_main_page_error_completes_without_body() {
        let (dir, channel, id, fetch) = setup();
        fetch.fail(ARTICLE, "timeout");

        completer(&dir, &channel, id, &fetch).complete().await;

        assert_eq!(fetch.requests(), vec![ARTICLE]);
        let channel = channel.borrow();
        let item = channel.item(id).unwrap();
        assert!(item.is_complete());
        assert_eq!(item.store().text(news::DESCRIPTION), "");
        assert!(item.attached_files().is_empty());
    }

    #[tokio::test]
    async fn test_body_without_images_uses_default_main_image() {
        let (dir, channel, id, fetch) = setup();
        fetch.respond(ARTICLE, page_with_body("<p>Solo testo</p>"));
        fetch.respond(page::DEFAULT_MAIN_IMAGE_URL, b"PNG".to_vec());

        completer(&dir, &channel, id, &fetch).complete().await;

        let channel = channel.borrow();
        let store = channel.item(id).unwrap().store();
        assert_eq!(store.url(ilribelle::MAIN_IMAGE_URL), page::DEFAULT_MAIN_IMAGE_URL);
        assert!(store.text(ilribelle::MAIN_IMAGE_FILE).ends_with(".png"));
        assert_eq!(fetch.count(page::DEFAULT_MAIN_IMAGE_URL), 1);
    }

    #[tokio::test]
    async fn test_rerun_scrapes_again() {
        let (dir, channel, id, fetch) = setup();
        fetch.respond(ARTICLE, page_with_body("<p>Uno</p>"));
        fetch.respond(page::DEFAULT_MAIN_IMAGE_URL, b"PNG".to_vec());

        let mut completer = IlRibelleCompleter::new(
            Rc::clone(&channel),
            id,
            Rc::new(fetch.clone()),
            dir.path().join("downloads"),
        );
        completer.complete().await;
        assert_eq!(completer.state(), ScrapeState::Complete);
        channel.borrow_mut().set_item_role(id, news::COMPLETE, false).unwrap();
        completer.complete().await;

        assert_eq!(fetch.count(ARTICLE), 2);
        assert!(channel.borrow().item(id).unwrap().is_complete());
    }
}
