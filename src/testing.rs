//! Shared fixtures for unit tests.

use crate::channel::Channel;
use crate::error::FetchError;
use crate::fetch::{ByteStream, NetworkFetch};
use crate::records::roles::{ILRIBELLE_NEWS_SCHEMA, NEWS_SCHEMA, news};
use crate::records::RecordStore;
use chrono::{DateTime, FixedOffset, TimeZone};
use futures::stream::{self, StreamExt};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tempfile::TempDir;

pub fn date(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, 0, 0)
        .unwrap()
}

pub fn fields(title: &str, link: &str, when: Option<DateTime<FixedOffset>>) -> RecordStore {
    let mut store = RecordStore::new(&NEWS_SCHEMA);
    store.set(news::TITLE, title);
    store.set(news::LINK, link);
    store.set(news::PUB_DATE, when);
    store
}

pub fn channel_in(dir: &TempDir) -> Channel {
    Channel::new("http://www.ilribelle.com/rss.xml", dir.path().join("data"), &NEWS_SCHEMA).unwrap()
}

pub fn ilribelle_channel_in(dir: &TempDir) -> Channel {
    Channel::new(
        "http://www.ilribelle.com/rss.xml",
        dir.path().join("data"),
        &ILRIBELLE_NEWS_SCHEMA,
    )
    .unwrap()
}

#[derive(Default)]
struct Routes {
    responses: HashMap<String, Vec<Result<Vec<u8>, String>>>,
    requests: Vec<String>,
}

/// Scripted [`NetworkFetch`] answering from canned per-URL chunk lists.
/// Unknown URLs fail with a transport error.
#[derive(Clone, Default)]
pub struct FakeFetch {
    routes: Rc<RefCell<Routes>>,
}

impl FakeFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.respond_chunks(url, vec![body.into()]);
    }

    pub fn respond_chunks(&self, url: &str, chunks: Vec<Vec<u8>>) {
        self.routes
            .borrow_mut()
            .responses
            .insert(url.to_string(), chunks.into_iter().map(Ok).collect());
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.routes
            .borrow_mut()
            .responses
            .insert(url.to_string(), vec![Err(message.to_string())]);
    }

    pub fn requests(&self) -> Vec<String> {
        self.routes.borrow().requests.clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.routes.borrow().requests.iter().filter(|u| *u == url).count()
    }
}

impl NetworkFetch for FakeFetch {
    fn get_file(&self, url: &str) -> ByteStream {
        let mut routes = self.routes.borrow_mut();
        routes.requests.push(url.to_string());
        let script = routes
            .responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| vec![Err(format!("no route to {url}"))]);
        stream::iter(script.into_iter().map(|r| r.map_err(FetchError::Transport))).boxed_local()
    }
}
