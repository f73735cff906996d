//! www.ilribelle.com page patterns.
//!
//! The site's article pages are not well-formed enough for a document
//! parser, so the article body is cut out by tracking `<div>` nesting and
//! everything else is found with fixed patterns. This is site policy: the
//! completer protocol only depends on [`scan_body`], [`extract_body`],
//! [`continuation_url`] and [`parse_audio_page`].

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::utils::file_extension;

pub const SITE_BASE: &str = "http://www.ilribelle.com/";

/// Main image used when an article has none.
pub const DEFAULT_MAIN_IMAGE_URL: &str = "http://www.ilribelle.com/storage/banner-generali-sito/testata2013OKnuova.png?__SQUARESPACE_CACHEVERSION=1363546281923";
pub const DEFAULT_MAIN_IMAGE_EXT: &str = "png";

/// Width placeholders substituted by the display layer.
pub const BIG_IMAGE_WIDTH: &str = "<$BIGIMAGEWIDTH$>";
pub const SMALL_IMAGE_WIDTH: &str = "<$SMALLIMAGEWIDTH$>";

/// Images wider than this many pixels go in the big bucket.
pub const BIG_IMAGE_MIN_WIDTH: u32 = 200;

const BODY_OPEN: &str = r#"<div class="body">"#;

static DIV_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<div[\s>]|</div>").unwrap());
static CONTINUATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^<p><a href="(http://www\.ilribelle\.com/archivio-editoriali-fini.*?)">"#).unwrap()
});
static IMG_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<img .*?/>").unwrap());
static IMG_WIDTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"style\s*=\s*".*width:\s*(\d+)px.*""#).unwrap());
static RAZ24_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a.*?href="((?:http://raz24\.com|https://raz24\.squarespace\.com)/raz24news/.*?)""#)
        .unwrap()
});
static LIVESTREAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<iframe[^>]*?src="(http://livestream\.com/.*?)".*?</iframe>"#).unwrap()
});
static IFRAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<iframe[^>]*?src="(.*?)".*?</iframe>"#).unwrap());
static AUDIO_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<div\s+class="sqs-audio-embed"([^<]*)>"#).unwrap());
static AUDIO_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"data-url="(.*?)""#).unwrap());
static AUDIO_TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"data-title="(.*?)""#).unwrap());
static AUDIO_AUTHOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"data-author="(.*?)""#).unwrap());
static AUDIO_DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-duration-in-ms="(.*?)""#).unwrap());
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

/// Cut the article body out of a page: the content of the first
/// `<div class="body">`, up to its matching `</div>`.
///
/// # Returns
///
/// The trimmed body, or `None` when the page has no body div or the body
/// is empty.
pub fn extract_body(html: &str) -> Option<&str> {
    let start = html.find(BODY_OPEN)? + BODY_OPEN.len();
    let mut depth = 1usize;
    let mut last_close = None;
    for tag in DIV_TAG_RE.find_iter(&html[start..]) {
        if tag.as_str() == "</div>" {
            depth -= 1;
            last_close = Some(start + tag.start());
            if depth == 0 {
                break;
            }
        } else {
            depth += 1;
        }
    }
    // An unclosed body runs to the last closing div seen.
    let end = last_close?;
    let body = html[start..end].trim();
    (!body.is_empty()).then_some(body)
}

/// URL of the full article when `body` is only a stub pointing to it.
pub fn continuation_url(body: &str) -> Option<String> {
    CONTINUATION_RE
        .captures(body.trim())
        .map(|c| c[1].to_string())
}

/// An image found in the body, to be downloaded to `file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDownload {
    pub url: String,
    pub file: String,
}

/// Everything the completer takes from an article body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BodyScan {
    /// Body with the title header, local image references and without iframes.
    pub html: String,
    /// Images in order of appearance; the first one is the main image.
    pub images: Vec<ImageDownload>,
    pub audio_page: Option<String>,
    pub livestream: Option<String>,
    pub iframes: Vec<String>,
}

impl BodyScan {
    pub fn main_image(&self) -> Option<&ImageDownload> {
        self.images.first()
    }
}

/// Rewrite an article body for offline display.
///
/// Every `<img>` is replaced by a link to a local file reserved through
/// `reserve_file(extension)`, which returns the file path or `None` when no
/// file could be reserved (the tag is then left as it was). When the body
/// has no image, the default main image is queued instead.
pub fn scan_body(
    title: &str,
    body: &str,
    reserve_file: &mut dyn FnMut(&str) -> Option<String>,
) -> BodyScan {
    let mut scan = BodyScan::default();
    let mut html = format!("<center><h1>{title}</h1></center><br/>");

    let mut copied = 0;
    for tag in IMG_TAG_RE.find_iter(body) {
        let Some(url) = image_source(tag.as_str()) else {
            debug!(tag = %tag.as_str(), "Image without usable src");
            continue;
        };
        let ext = file_extension(&url).unwrap_or_else(|| "img".to_string());
        let Some(file) = reserve_file(&ext) else {
            continue;
        };
        let width_tag = if image_width(tag.as_str()).is_some_and(|w| w > BIG_IMAGE_MIN_WIDTH) {
            BIG_IMAGE_WIDTH
        } else {
            SMALL_IMAGE_WIDTH
        };
        html.push_str(&body[copied..tag.start()]);
        html.push_str(&format!(
            r#"<a href="image+file://{file}"><img width="{width_tag}" src="file://{file}" style="float:left;"/></a>"#
        ));
        copied = tag.end();
        scan.images.push(ImageDownload { url, file });
    }
    html.push_str(&body[copied..]);

    if scan.images.is_empty() {
        if let Some(file) = reserve_file(DEFAULT_MAIN_IMAGE_EXT) {
            scan.images.push(ImageDownload {
                url: DEFAULT_MAIN_IMAGE_URL.to_string(),
                file,
            });
        }
    }

    for link in RAZ24_RE.captures_iter(&html) {
        match &scan.audio_page {
            None => scan.audio_page = Some(link[1].to_string()),
            Some(first) if first == &link[1] => {}
            Some(_) => debug!(discarded = %&link[1], "Keeping only the first audio page link"),
        }
    }

    let mut livestream_span = None;
    for frame in LIVESTREAM_RE.captures_iter(&html) {
        match &scan.livestream {
            None => {
                scan.livestream = Some(frame[1].to_string());
                livestream_span = frame.get(0).map(|m| m.range());
            }
            Some(first) if first == &frame[1] => {}
            Some(_) => debug!(discarded = %&frame[1], "Keeping only the first livestream link"),
        }
    }
    if let Some(span) = livestream_span {
        html.replace_range(span, "");
    }

    scan.iframes = IFRAME_RE
        .captures_iter(&html)
        .map(|c| c[1].to_string())
        .collect();
    scan.html = IFRAME_RE.replace_all(&html, "").into_owned();
    scan
}

/// Absolute URL of an `<img>` tag's `src`, resolved against the site.
fn image_source(tag: &str) -> Option<String> {
    let fragment = Html::parse_fragment(tag);
    let src = fragment
        .select(&IMG_SELECTOR)
        .next()?
        .value()
        .attr("src")?
        .trim()
        .to_string();
    if src.is_empty() {
        return None;
    }
    let base = Url::parse(SITE_BASE).ok()?;
    base.join(&src).ok().map(|u| u.to_string())
}

fn image_width(tag: &str) -> Option<u32> {
    IMG_WIDTH_RE.captures(tag)?[1].parse().ok()
}

/// Audio stream details from an audio page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioInfo {
    pub url: String,
    pub title: String,
    pub author: String,
    pub duration_ms: u64,
}

/// Read the first audio embed block of a page. Later blocks are ignored.
pub fn parse_audio_page(html: &str) -> Option<AudioInfo> {
    let mut blocks = AUDIO_BLOCK_RE.captures_iter(html);
    let block = blocks.next()?;
    for extra in blocks {
        debug!(discarded = %&extra[0], "Keeping only the first audio block");
    }
    let attrs = &block[1];
    let field = |re: &Regex| {
        re.captures(attrs)
            .map(|c| c[1].to_string())
            .unwrap_or_default()
    };
    Some(AudioInfo {
        url: field(&AUDIO_URL_RE),
        title: field(&AUDIO_TITLE_RE),
        author: field(&AUDIO_AUTHOR_RE),
        duration_ms: field(&AUDIO_DURATION_RE).parse().unwrap_or(0),
    })
}
