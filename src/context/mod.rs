//! Per-call context handed to handlers.
//!
//! The router produces [`PathParams`] from the matched route; the request
//! adapter merges them with body or query data into [`Args`], the single
//! value every handler receives.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

use crate::Request;
use crate::handler::HandlerError;

/// Path parameters captured by the matched route, in pattern order.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PathParams {
    map: IndexMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl IntoIterator for PathParams {
    type Item = (String, String);
    type IntoIter = indexmap::map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.into_iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Arguments of one handler invocation.
///
/// Keyword values come from the JSON body, form fields, the query string or
/// the route's path parameters. The originating request is only present when
/// the handler declared a request parameter.
///
/// # Examples
///
/// ```
/// use weft::context::Args;
/// use serde_json::json;
///
/// let mut args = Args::new();
/// args.insert("page", json!("2"));
/// args.insert("name", json!("weft"));
///
/// assert_eq!(args.value::<u32>("page").unwrap(), 2);
/// assert_eq!(args.str("name"), Some("weft"));
/// assert!(args.value::<String>("missing").is_err());
/// ```
#[derive(Debug, Default)]
pub struct Args {
    keywords: Map<String, Json>,
    request: Option<Request>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keywords(keywords: Map<String, Json>) -> Self {
        Self {
            keywords,
            request: None,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Json>) -> Option<Json> {
        self.keywords.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Json> {
        self.keywords.get(name)
    }

    /// The keyword as a string slice, if it is a JSON string.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.keywords.get(name).and_then(Json::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keywords.contains_key(name)
    }

    /// Decodes a keyword into `T`.
    ///
    /// Form, query and path values always arrive as strings, so a string that
    /// does not decode directly is retried as a JSON literal: `"2"` decodes
    /// into an integer, `"true"` into a bool.
    ///
    /// # Errors
    ///
    /// [`HandlerError::BadRequest`] when the keyword is absent or does not
    /// decode.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T, HandlerError> {
        match self.optional(name)? {
            Some(value) => Ok(value),
            None => Err(HandlerError::BadRequest(format!("Missing argument: {name}"))),
        }
    }

    /// Like [`value`](Self::value), but `Ok(None)` when the keyword is absent
    /// or null.
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, HandlerError> {
        let raw = match self.keywords.get(name) {
            None | Some(Json::Null) => return Ok(None),
            Some(raw) => raw,
        };
        let decoded = serde_json::from_value::<T>(raw.clone()).or_else(|e| match raw {
            Json::String(s) => serde_json::from_str::<T>(s).map_err(|_| e),
            _ => Err(e),
        });
        decoded
            .map(Some)
            .map_err(|e| HandlerError::BadRequest(format!("Invalid argument {name}: {e}")))
    }

    /// The originating request, when the handler asked for it.
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub(crate) fn set_request(&mut self, request: Request) {
        self.request = Some(request);
    }

    pub fn keywords(&self) -> &Map<String, Json> {
        &self.keywords
    }

    pub fn into_keywords(self) -> Map<String, Json> {
        self.keywords
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}
