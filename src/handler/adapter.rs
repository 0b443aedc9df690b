use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use super::signature::{Profile, Signature, SignatureError};
use super::{Handler, HandlerError, HandlerResult, Reply};
use crate::context::{Args, PathParams};
use crate::http::form::{self, FormFields};
use crate::{Method, Request};

/// Binds one handler to the HTTP request shape.
///
/// Built once per route; [`call`](Self::call) then runs, in order: extract
/// keywords from the body or query string, merge path parameters, narrow to
/// the declared keywords, inject the request, check required keywords, fill
/// defaults, invoke, and turn an [`ApiError`](super::ApiError) into its JSON
/// payload.
#[derive(Clone)]
pub struct RequestAdapter {
    name: String,
    profile: Arc<Profile>,
    handler: Handler,
}

impl fmt::Debug for RequestAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestAdapter")
            .field("name", &self.name)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl RequestAdapter {
    /// Classifies `signature` and wraps `handler`.
    ///
    /// # Errors
    ///
    /// Any [`SignatureError`] from [`Signature::classify`].
    pub fn new(signature: &Signature, handler: Handler) -> Result<Self, SignatureError> {
        Ok(Self {
            name: signature.handler().to_owned(),
            profile: Arc::new(signature.classify()?),
            handler,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Runs the handler for `request` with the route's captured `path` params.
    ///
    /// # Errors
    ///
    /// - [`HandlerError::BadRequest`] when the body cannot be decoded or a
    ///   required keyword is missing.
    /// - Whatever the handler itself returns, except [`HandlerError::Api`],
    ///   which becomes an `Ok` JSON reply.
    pub async fn call(&self, request: Request, path: PathParams) -> HandlerResult {
        let profile = &*self.profile;

        let extracted = if profile.needs_keywords() {
            extract_keywords(&request)?
        } else {
            None
        };

        let keywords: Map<String, Json> = match extracted {
            None => path
                .into_iter()
                .map(|(k, v)| (k, Json::String(v)))
                .collect(),
            Some(mut keywords) => {
                if !profile.has_var_keyword && !profile.named_keywords.is_empty() {
                    keywords.retain(|k, _| profile.named_keywords.contains(k));
                }
                for (k, v) in path {
                    if keywords.contains_key(&k) {
                        warn!(handler = %self.name, arg = %k, "duplicate arg name in named arg and path arg");
                    }
                    keywords.insert(k, Json::String(v));
                }
                keywords
            }
        };

        let mut args = Args::from_keywords(keywords);
        if profile.accepts_request {
            args.set_request(request);
        }

        if let Some(missing) = profile.required_keywords.iter().find(|name| !args.contains(name)) {
            return Err(HandlerError::BadRequest(format!("Missing argument: {missing}")));
        }
        for (name, default) in &profile.defaults {
            if !args.contains(name) {
                args.insert(name.clone(), default.clone());
            }
        }

        debug!(handler = %self.name, args = ?args.keywords(), "call with args");
        match (self.handler)(args).await {
            Err(HandlerError::Api(e)) => Ok(Reply::Json(e.payload())),
            other => other,
        }
    }
}

// POST reads the body, GET the query string; anything else carries no keywords.
fn extract_keywords(request: &Request) -> Result<Option<Map<String, Json>>, HandlerError> {
    match request.method() {
        Method::Post => extract_body(request).map(Some),
        Method::Get => {
            let pairs = request.query_pairs();
            Ok((!pairs.is_empty()).then(|| to_json(pairs)))
        }
        _ => Ok(None),
    }
}

fn extract_body(request: &Request) -> Result<Map<String, Json>, HandlerError> {
    let Some(content_type) = request.content_type() else {
        return Err(HandlerError::BadRequest("Missing Content-Type.".into()));
    };
    let body = request.body_bytes();

    if content_type.starts_with("application/json") {
        let value: Json = serde_json::from_slice(body)
            .map_err(|e| HandlerError::BadRequest(format!("Invalid JSON body: {e}")))?;
        return match value {
            Json::Object(map) => Ok(map),
            _ => Err(HandlerError::BadRequest("JSON body must be object.".into())),
        };
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        return Ok(to_json(form::parse_urlencoded(&String::from_utf8_lossy(body))));
    }

    if content_type.starts_with("multipart/form-data") {
        let fields = request
            .headers()
            .get("content-type")
            .and_then(form::multipart_boundary)
            .and_then(|boundary| form::parse_multipart(body, boundary))
            .ok_or_else(|| HandlerError::BadRequest("Malformed multipart body.".into()))?;
        return Ok(to_json(fields));
    }

    Err(HandlerError::BadRequest(format!(
        "Unsupported Content-Type: {content_type}"
    )))
}

fn to_json(fields: FormFields) -> Map<String, Json> {
    fields
        .into_iter()
        .map(|(k, v)| (k, Json::String(v)))
        .collect()
}
