//! Schema-driven key/value records shared by channels and news items.
//!
//! A [`Schema`] is an ordered list of [`Role`]s, each a named and typed
//! field. A [`RecordStore`] holds one [`Value`] per role of its schema,
//! notifies registered observers whenever a value changes, and converts
//! to and from a JSON object keyed by role name.
//!
//! # Type checking
//!
//! Values are checked against the role kind on every write. Text and URL
//! values convert into each other freely; any other mismatch is a
//! programming error, reported with `error!` and rejected (it also trips a
//! `debug_assert!` in debug builds).

pub mod roles;

use crate::error::{NewsError, NewsResult};
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Text,
    Url,
    DateTime,
    UInt,
    Bool,
    TextList,
}

/// A named, typed field at a fixed position of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Role {
    pub index: usize,
    pub name: &'static str,
    pub kind: RoleKind,
}

impl Role {
    pub const fn new(index: usize, name: &'static str, kind: RoleKind) -> Self {
        Self { index, name, kind }
    }
}

/// The current value of one role. `Empty` is the state of every role
/// after a reset.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Empty,
    Text(String),
    Url(String),
    DateTime(DateTime<FixedOffset>),
    UInt(u64),
    Bool(bool),
    TextList(Vec<String>),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Coerce the value into the representation of `kind`, if compatible.
    fn coerce(self, kind: RoleKind) -> Option<Value> {
        match (self, kind) {
            (Value::Empty, _) => Some(Value::Empty),
            (Value::Text(s), RoleKind::Url) | (Value::Url(s), RoleKind::Url) => Some(Value::Url(s)),
            (Value::Url(s), RoleKind::Text) | (Value::Text(s), RoleKind::Text) => {
                Some(Value::Text(s))
            }
            (v @ Value::DateTime(_), RoleKind::DateTime)
            | (v @ Value::UInt(_), RoleKind::UInt)
            | (v @ Value::Bool(_), RoleKind::Bool)
            | (v @ Value::TextList(_), RoleKind::TextList) => Some(v),
            _ => None,
        }
    }

    /// JSON representation used by the persisted document. Unset values
    /// are written as the empty representation of their role kind, and an
    /// empty string reads back as unset.
    fn to_json(&self, kind: RoleKind) -> Json {
        match self {
            Value::Empty => match kind {
                RoleKind::Text | RoleKind::Url | RoleKind::DateTime => Json::String(String::new()),
                RoleKind::UInt => Json::from(0u64),
                RoleKind::Bool => Json::Bool(false),
                RoleKind::TextList => Json::Array(Vec::new()),
            },
            Value::Text(s) | Value::Url(s) => Json::String(s.clone()),
            Value::DateTime(d) => Json::String(d.to_rfc3339()),
            Value::UInt(n) => Json::from(*n),
            Value::Bool(b) => Json::Bool(*b),
            Value::TextList(l) => Json::Array(l.iter().cloned().map(Json::String).collect()),
        }
    }

    fn from_json(role: &Role, json: &Json) -> NewsResult<Value> {
        let mismatch = || {
            NewsError::MalformedDocument(format!(
                "role {} expects {:?}, found {}",
                role.name, role.kind, json
            ))
        };
        let value = match (role.kind, json) {
            (_, Json::Null) => Value::Empty,
            (RoleKind::Text | RoleKind::Url | RoleKind::DateTime, Json::String(s)) if s.is_empty() => {
                Value::Empty
            }
            (RoleKind::Text, Json::String(s)) => Value::Text(s.clone()),
            (RoleKind::Url, Json::String(s)) => Value::Url(s.clone()),
            (RoleKind::DateTime, Json::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(d) => Value::DateTime(d),
                Err(e) => {
                    warn!(role = role.name, value = %s, error = %e, "Invalid stored date; leaving it unset");
                    Value::Empty
                }
            },
            (RoleKind::UInt, Json::Number(n)) => Value::UInt(n.as_u64().ok_or_else(mismatch)?),
            (RoleKind::Bool, Json::Bool(b)) => Value::Bool(*b),
            (RoleKind::TextList, Json::Array(a)) => Value::TextList(
                a.iter()
                    .map(|v| v.as_str().map(str::to_string).ok_or_else(mismatch))
                    .collect::<NewsResult<Vec<_>>>()?,
            ),
            _ => return Err(mismatch()),
        };
        Ok(value)
    }
}

/// Ordered role list with a name index, computed once per declared schema.
#[derive(Debug)]
pub struct Schema {
    roles: Vec<Role>,
    by_name: HashMap<&'static str, usize>,
}

impl Schema {
    /// Concatenate role lists into one schema.
    ///
    /// Each role must carry its position in the concatenation as its index.
    pub fn new(lists: &[&[Role]]) -> Self {
        let roles: Vec<Role> = lists.iter().flat_map(|l| l.iter().copied()).collect();
        for (position, role) in roles.iter().enumerate() {
            debug_assert_eq!(position, role.index, "role {} declared out of place", role.name);
        }
        let by_name = roles.iter().map(|r| (r.name, r.index)).collect();
        Self { roles, by_name }
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn role(&self, index: usize) -> Option<Role> {
        self.roles.get(index).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<Role> {
        self.by_name.get(name).map(|&i| self.roles[i])
    }

    pub fn contains(&self, role: Role) -> bool {
        self.role(role.index) == Some(role)
    }
}

/// Handle returned by observer registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        ObserverId(raw)
    }
}

type Observer = Box<dyn FnMut(usize)>;

/// Values for every role of a schema plus change observers.
pub struct RecordStore {
    schema: &'static Schema,
    values: Vec<Value>,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("values", &self.values)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl RecordStore {
    pub fn new(schema: &'static Schema) -> Self {
        Self {
            schema,
            values: vec![Value::Empty; schema.len()],
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Current value of `role`, `Value::Empty` when unset or outside the schema.
    pub fn get(&self, role: Role) -> &Value {
        static EMPTY: Value = Value::Empty;
        self.values.get(role.index).unwrap_or(&EMPTY)
    }

    pub fn is_set(&self, role: Role) -> bool {
        !self.get(role).is_empty()
    }

    pub fn text(&self, role: Role) -> &str {
        match self.get(role) {
            Value::Text(s) | Value::Url(s) => s,
            _ => "",
        }
    }

    pub fn url(&self, role: Role) -> &str {
        self.text(role)
    }

    pub fn date(&self, role: Role) -> Option<DateTime<FixedOffset>> {
        match self.get(role) {
            Value::DateTime(d) => Some(*d),
            _ => None,
        }
    }

    pub fn uint(&self, role: Role) -> u64 {
        match self.get(role) {
            Value::UInt(n) => *n,
            _ => 0,
        }
    }

    pub fn flag(&self, role: Role) -> bool {
        matches!(self.get(role), Value::Bool(true))
    }

    pub fn list(&self, role: Role) -> &[String] {
        match self.get(role) {
            Value::TextList(l) => l,
            _ => &[],
        }
    }

    /// Set `role` and notify every observer with its index.
    ///
    /// # Returns
    ///
    /// `true` if the value was stored, `false` if the role is not part of
    /// the schema or the value does not fit its kind.
    pub fn set(&mut self, role: Role, value: impl Into<Value>) -> bool {
        let stored = self.store(role, value.into());
        if stored {
            self.notify(role.index);
        }
        stored
    }

    /// Set `role` without notifying observers. Reserved for bookkeeping
    /// writes that must not trigger external reactions.
    pub fn set_quiet(&mut self, role: Role, value: impl Into<Value>) -> bool {
        self.store(role, value.into())
    }

    fn store(&mut self, role: Role, value: Value) -> bool {
        if !self.schema.contains(role) {
            error!(role = role.name, index = role.index, "Role is not part of this schema");
            debug_assert!(false, "role {} is not part of this schema", role.name);
            return false;
        }
        match value.coerce(role.kind) {
            Some(v) => {
                self.values[role.index] = v;
                true
            }
            None => {
                error!(role = role.name, kind = ?role.kind, "Value does not fit role kind");
                debug_assert!(false, "value does not fit role {}", role.name);
                false
            }
        }
    }

    fn notify(&mut self, index: usize) {
        for (_, observer) in self.observers.iter_mut() {
            observer(index);
        }
    }

    /// Register a callback invoked with the index of every notified change.
    pub fn add_observer(&mut self, observer: impl FnMut(usize) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// # Returns
    ///
    /// `true` if an observer was registered under `id`.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(k, _)| *k != id);
        self.observers.len() != before
    }

    /// Clear every role. Observers are told about each role unless `quiet`.
    pub fn reset_all(&mut self, quiet: bool) {
        for index in 0..self.values.len() {
            self.values[index] = Value::Empty;
            if !quiet {
                self.notify(index);
            }
        }
    }

    /// Copy every role both schemas share from `other`, without notification.
    pub fn copy_from(&mut self, other: &RecordStore) {
        for role in other.schema.roles() {
            if self.schema.contains(*role) {
                self.values[role.index] = other.values[role.index].clone();
            }
        }
    }

    /// Write every declared role by name.
    pub fn to_document(&self) -> Map<String, Json> {
        self.schema
            .roles()
            .iter()
            .map(|r| (r.name.to_string(), self.values[r.index].to_json(r.kind)))
            .collect()
    }

    /// Reset the store and load every role found in `doc`.
    ///
    /// Keys listed in `extra_keys` belong to the owner of the store and are
    /// skipped. Any other key that is not a role name fails the load, and
    /// the store is left with whatever was loaded before the failure.
    pub fn load_document(&mut self, doc: &Map<String, Json>, extra_keys: &[&str]) -> NewsResult<()> {
        self.reset_all(true);
        for (key, json) in doc {
            if extra_keys.contains(&key.as_str()) {
                continue;
            }
            let role = self
                .schema
                .by_name(key)
                .ok_or_else(|| NewsError::UnknownRole(key.clone()))?;
            self.values[role.index] = Value::from_json(&role, json)?;
        }
        Ok(())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(d: DateTime<FixedOffset>) -> Self {
        Value::DateTime(d)
    }
}

impl From<Option<DateTime<FixedOffset>>> for Value {
    fn from(d: Option<DateTime<FixedOffset>>) -> Self {
        d.map_or(Value::Empty, Value::DateTime)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(l: Vec<String>) -> Self {
        Value::TextList(l)
    }
}

#[cfg(test)]
mod tests {
    use super::roles::{CHANNEL_SCHEMA, ILRIBELLE_NEWS_SCHEMA, NEWS_SCHEMA, channel, ilribelle, news};
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_observers_see_notified_sets_only() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = RecordStore::new(&NEWS_SCHEMA);
        let sink = Rc::clone(&seen);
        let handle = store.add_observer(move |i| sink.borrow_mut().push(i));

        store.set(news::TITLE, "Hello");
        store.set_quiet(news::COMPLETE, true);
        store.set(news::ENCLOSURE_LENGTH, 42u64);
        assert_eq!(*seen.borrow(), vec![news::TITLE.index, news::ENCLOSURE_LENGTH.index]);

        assert!(store.remove_observer(handle));
        assert!(!store.remove_observer(handle));
        store.set(news::TITLE, "Again");
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_text_and_url_coerce() {
        let mut store = RecordStore::new(&NEWS_SCHEMA);
        assert!(store.set(news::LINK, "http://example.com/a"));
        assert_eq!(store.get(news::LINK), &Value::Url("http://example.com/a".into()));
        assert_eq!(store.url(news::LINK), "http://example.com/a");
    }

    #[test]
    fn test_reset_all_clears_everything() {
        let mut store = RecordStore::new(&CHANNEL_SCHEMA);
        store.set(channel::TITLE, "Channel");
        store.set(channel::TTL, 30u64);
        store.reset_all(true);
        assert!(!store.is_set(channel::TITLE));
        assert_eq!(store.uint(channel::TTL), 0);
    }

    #[test]
    fn test_document_round_trip() {
        let mut store = RecordStore::new(&ILRIBELLE_NEWS_SCHEMA);
        store.set(news::TITLE, "Title");
        store.set(news::PUB_DATE, DateTime::parse_from_rfc3339("2013-01-03T10:00:00+01:00").unwrap());
        store.set(news::CATEGORIES, vec!["a".to_string(), "b".to_string()]);
        store.set(ilribelle::HAS_AUDIO_RESOURCE, true);
        store.set(ilribelle::AUDIO_RESOURCE_DURATION, 61_000u64);

        let doc = store.to_document();
        assert_eq!(doc.len(), ILRIBELLE_NEWS_SCHEMA.len());
        assert_eq!(doc["description"], Json::String(String::new()));

        let mut loaded = RecordStore::new(&ILRIBELLE_NEWS_SCHEMA);
        loaded.load_document(&doc, &[]).unwrap();
        assert_eq!(loaded.to_document(), doc);
        assert_eq!(loaded.date(news::PUB_DATE), store.date(news::PUB_DATE));
        for role in [news::TITLE, news::DESCRIPTION, news::PERMALINK, news::QML_ITEM, ilribelle::LIVESTREAM_URL] {
            assert_eq!(loaded.get(role), store.get(role), "{}", role.name);
        }
        assert!(!loaded.is_set(news::PERMALINK));
    }

    #[test]
    fn test_unknown_key_fails_load() {
        let mut doc = Map::new();
        doc.insert("title".into(), Json::String("x".into()));
        doc.insert("bogus".into(), Json::Bool(true));
        let mut store = RecordStore::new(&NEWS_SCHEMA);
        let err = store.load_document(&doc, &[]).unwrap_err();
        assert!(matches!(err, NewsError::UnknownRole(k) if k == "bogus"));
    }

    #[test]
    fn test_extra_keys_are_skipped() {
        let mut doc = Map::new();
        doc.insert("ttl".into(), Json::from(15u64));
        doc.insert("fileCreationIndex".into(), Json::from(7u64));
        let mut store = RecordStore::new(&CHANNEL_SCHEMA);
        store.load_document(&doc, &["fileCreationIndex"]).unwrap();
        assert_eq!(store.uint(channel::TTL), 15);
    }

    #[test]
    fn test_copy_from_standard_into_extended() {
        let mut fields = RecordStore::new(&NEWS_SCHEMA);
        fields.set(news::TITLE, "Shared");
        let mut extended = RecordStore::new(&ILRIBELLE_NEWS_SCHEMA);
        extended.set(ilribelle::LIVESTREAM_URL, "http://livestream.com/x");
        extended.copy_from(&fields);
        assert_eq!(extended.text(news::TITLE), "Shared");
        assert_eq!(extended.url(ilribelle::LIVESTREAM_URL), "http://livestream.com/x");
    }
}
