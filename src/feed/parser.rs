//! Incremental RSS 2.0 parser.
//!
//! Bytes are fed in whatever chunks the network delivers. Each call parses
//! every complete event in the buffered input and keeps the incomplete
//! tail for the next call, so consumed input is never parsed twice. Channel
//! roles are written as their tags close and every `<item>` is handed to
//! [`Channel::add_item`] as soon as it closes, in feed order.

use super::date::parse_feed_date;
use crate::channel::Channel;
use crate::error::{NewsError, NewsResult};
use crate::records::roles::{channel as channel_roles, news};
use crate::records::{RecordStore, Role, Schema, Value};
use quick_xml::Reader;
use quick_xml::errors::{Error as XmlError, IllFormedError, SyntaxError};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

const DC_NAMESPACE: &[u8] = b"http://purl.org/dc/elements/1.1/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    NotStarted,
    ExpectRootTag,
    NamespacesCaptured,
    InChannel,
    InItem,
    ChannelClosed,
    RootClosed,
    Done,
}

/// Counters reported once the feed has been consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Items found in the feed.
    pub parsed: usize,
    /// Items that were new to the channel.
    pub added: usize,
}

struct PendingItem {
    fields: RecordStore,
    categories: Vec<String>,
    guid_is_permalink: bool,
}

pub struct FeedParser {
    state: ParseState,
    pending: Vec<u8>,
    item_schema: &'static Schema,
    dc_prefix: Option<String>,
    text: String,
    in_image: bool,
    channel_categories: Vec<String>,
    item: Option<PendingItem>,
    stats: FeedStats,
}

impl FeedParser {
    /// Create a parser producing items with `item_schema`.
    pub fn new(item_schema: &'static Schema) -> Self {
        Self {
            state: ParseState::NotStarted,
            pending: Vec::new(),
            item_schema,
            dc_prefix: None,
            text: String::new(),
            in_image: false,
            channel_categories: Vec::new(),
            item: None,
            stats: FeedStats::default(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    /// Parse the next chunk of the document into `channel`.
    ///
    /// # Errors
    ///
    /// Fails on a document whose root is not `<rss>` and on XML errors that
    /// more input could not fix.
    pub fn feed(&mut self, chunk: &[u8], channel: &mut Channel) -> NewsResult<()> {
        self.pending.extend_from_slice(chunk);
        self.run(channel, false)
    }

    /// Parse whatever is still buffered once the download is over.
    ///
    /// A document cut short is not an error: everything that arrived stays
    /// in the channel and the truncation is logged.
    pub fn finish(&mut self, channel: &mut Channel) -> NewsResult<FeedStats> {
        self.run(channel, true)?;
        if self.state != ParseState::Done {
            warn!(state = ?self.state, "Feed ended before the document closed; keeping what arrived");
        }
        Ok(self.stats)
    }

    fn run(&mut self, channel: &mut Channel, at_end: bool) -> NewsResult<()> {
        match self.state {
            ParseState::NotStarted => self.state = ParseState::ExpectRootTag,
            ParseState::Done => {
                self.pending.clear();
                return Ok(());
            }
            _ => {}
        }

        let pending = std::mem::take(&mut self.pending);
        let mut reader = Reader::from_reader(pending.as_slice());
        reader.config_mut().trim_text(false);
        reader.config_mut().check_end_names = false;
        // Start tags consumed by earlier chunks are unknown to this reader.
        reader.config_mut().allow_unmatched_ends = true;
        reader.config_mut().expand_empty_elements = true;

        let mut consumed = 0;
        let result = loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    let at = (reader.error_position() as usize).min(pending.len());
                    break self.read_error(e, &pending[at..], at_end);
                }
            };
            let position = reader.buffer_position() as usize;
            match event {
                Event::Eof => {
                    if self.state == ParseState::RootClosed {
                        self.state = ParseState::Done;
                    }
                    break Ok(());
                }
                // Text running into the end of the buffer may continue in the next chunk.
                Event::Text(_) if position == pending.len() && !at_end => break Ok(()),
                event => {
                    if let Err(e) = self.handle(event, channel) {
                        break Err(e);
                    }
                    consumed = position;
                }
            }
        };
        self.pending = pending[consumed..].to_vec();
        result
    }

    /// An error caused by the buffer running out waits for more data, or is
    /// logged as a truncated feed once the input is over. Any other error is
    /// reported at once. `tail` is the buffered input from the error on.
    fn read_error(&self, e: XmlError, tail: &[u8], at_end: bool) -> NewsResult<()> {
        if !ran_out_of_input(&e, tail) {
            return Err(e.into());
        }
        if at_end {
            warn!(error = %e, state = ?self.state, "Feed truncated; keeping what arrived");
        }
        Ok(())
    }

    fn handle(&mut self, event: Event<'_>, channel: &mut Channel) -> NewsResult<()> {
        match event {
            Event::Start(e) => self.start(&e)?,
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                self.end(&name, channel);
            }
            Event::Text(t) => self.push_text(&String::from_utf8_lossy(&t)),
            Event::CData(c) => self.push_text(&String::from_utf8_lossy(&c)),
            Event::GeneralRef(r) => {
                let entity = format!("&{};", String::from_utf8_lossy(&r));
                let resolved = unescape(&entity).map(|s| s.into_owned()).unwrap_or(entity);
                self.push_text(&resolved);
            }
            _ => {}
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) {
        if matches!(self.state, ParseState::InChannel | ParseState::InItem) {
            self.text.push_str(text);
        }
    }

    fn start(&mut self, e: &BytesStart<'_>) -> NewsResult<()> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        match self.state {
            ParseState::ExpectRootTag => {
                if name != "rss" {
                    return Err(NewsError::FeedStructure(format!(
                        "expected <rss> document root, found <{name}>"
                    )));
                }
                for attr in e.attributes().flatten() {
                    if let Some(prefix) = attr.key.as_ref().strip_prefix(b"xmlns:") {
                        if attr.value.as_ref() == DC_NAMESPACE {
                            self.dc_prefix = Some(String::from_utf8_lossy(prefix).into_owned());
                        }
                    }
                }
                debug!(dc_prefix = ?self.dc_prefix, "Captured namespaces");
                self.state = ParseState::NamespacesCaptured;
            }
            ParseState::NamespacesCaptured if name == "channel" => {
                self.state = ParseState::InChannel;
            }
            ParseState::InChannel => {
                match name.as_str() {
                    "item" => {
                        self.item = Some(PendingItem {
                            fields: RecordStore::new(self.item_schema),
                            categories: Vec::new(),
                            guid_is_permalink: false,
                        });
                        self.state = ParseState::InItem;
                    }
                    "image" => self.in_image = true,
                    _ => {}
                }
                self.text.clear();
            }
            ParseState::InItem => {
                if let Some(item) = self.item.as_mut() {
                    match name.as_str() {
                        "enclosure" => read_enclosure(e, &mut item.fields),
                        "guid" => {
                            item.guid_is_permalink = attribute(e, b"isPermaLink")
                                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
                        }
                        _ => {}
                    }
                }
                self.text.clear();
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &str, channel: &mut Channel) {
        let text = std::mem::take(&mut self.text).trim().to_string();
        match self.state {
            ParseState::InItem if name == "item" => self.close_item(channel),
            ParseState::InItem => self.item_field(name, text),
            ParseState::InChannel if name == "channel" => {
                if !self.channel_categories.is_empty() {
                    channel.set_role(channel_roles::CATEGORIES, std::mem::take(&mut self.channel_categories));
                }
                self.state = ParseState::ChannelClosed;
            }
            ParseState::InChannel if name == "image" => self.in_image = false,
            ParseState::InChannel => self.channel_field(name, text, channel),
            ParseState::ChannelClosed | ParseState::NamespacesCaptured if name == "rss" => {
                self.state = ParseState::RootClosed;
            }
            _ => {}
        }
    }

    fn is_dc(&self, name: &str, local: &str) -> bool {
        self.dc_prefix.as_deref().is_some_and(|prefix| {
            name.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix(':'))
                == Some(local)
        })
    }

    fn item_field(&mut self, name: &str, text: String) {
        let is_creator = self.is_dc(name, "creator");
        let Some(item) = self.item.as_mut() else {
            return;
        };
        let role = match name {
            "title" => news::TITLE,
            "link" => news::LINK,
            "description" => news::DESCRIPTION,
            "author" => news::AUTHOR_EMAIL,
            "guid" if item.guid_is_permalink => news::PERMALINK,
            "pubDate" => {
                item.fields.set(news::PUB_DATE, parse_feed_date(&text));
                return;
            }
            "category" => {
                item.categories.push(text);
                return;
            }
            _ if is_creator => news::CREATOR,
            _ => return,
        };
        item.fields.set(role, text);
    }

    fn close_item(&mut self, channel: &mut Channel) {
        self.state = ParseState::InChannel;
        let Some(mut item) = self.item.take() else {
            return;
        };
        if !item.categories.is_empty() {
            item.fields.set(news::CATEGORIES, item.categories);
        }
        self.stats.parsed += 1;
        if channel.add_item(&item.fields).is_some() {
            self.stats.added += 1;
        }
    }

    fn channel_field(&mut self, name: &str, text: String, channel: &mut Channel) {
        if self.in_image {
            match name {
                "url" => set_role(channel, channel_roles::IMAGE_URL, text),
                "description" => set_role(channel, channel_roles::IMAGE_DESCRIPTION, text),
                _ => {}
            }
            return;
        }
        match name {
            "title" => set_role(channel, channel_roles::TITLE, text),
            "link" => set_role(channel, channel_roles::LINK, text),
            "description" => set_role(channel, channel_roles::DESCRIPTION, text),
            "language" => set_role(channel, channel_roles::LANGUAGE, text),
            "copyright" => set_role(channel, channel_roles::COPYRIGHT, text),
            "managingEditor" => set_role(channel, channel_roles::MANAGING_EDITOR, text),
            "webMaster" => set_role(channel, channel_roles::WEB_MASTER, text),
            "pubDate" => set_role(channel, channel_roles::PUB_DATE, parse_feed_date(&text)),
            "lastBuildDate" => {
                set_role(channel, channel_roles::LAST_BUILD_DATE, parse_feed_date(&text))
            }
            "ttl" => match text.parse::<u64>() {
                Ok(ttl) => set_role(channel, channel_roles::TTL, ttl),
                Err(e) => debug!(%text, error = %e, "Ignoring invalid ttl"),
            },
            "category" => self.channel_categories.push(text),
            _ => {}
        }
    }
}

/// Whether `e` only says that the input ended inside an event.
fn ran_out_of_input(e: &XmlError, tail: &[u8]) -> bool {
    match e {
        // `<!` with nothing after it yet.
        XmlError::Syntax(SyntaxError::InvalidBangMarkup) => tail.len() <= 2,
        XmlError::Syntax(_) => true,
        XmlError::IllFormed(IllFormedError::UnclosedReference) => {
            !tail.iter().skip(1).any(|b| matches!(b, b';' | b'<' | b'&'))
        }
        _ => false,
    }
}

fn set_role(channel: &mut Channel, role: Role, value: impl Into<Value>) {
    channel.set_role(role, value);
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| {
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            unescape(&raw).map(|s| s.into_owned()).unwrap_or(raw)
        })
}

fn read_enclosure(e: &BytesStart<'_>, fields: &mut RecordStore) {
    if let Some(url) = attribute(e, b"url") {
        fields.set(news::ENCLOSURE_URL, url);
    }
    if let Some(length) = attribute(e, b"length").and_then(|l| l.trim().parse::<u64>().ok()) {
        fields.set(news::ENCLOSURE_LENGTH, length);
    }
    if let Some(kind) = attribute(e, b"type") {
        fields.set(news::ENCLOSURE_TYPE, kind);
    }
}
