use std::fmt;

use indexmap::IndexMap;
use serde_json::Value as Json;
use thiserror::Error;

/// Name of the parameter that receives the request itself.
pub(crate) const REQUEST_PARAM: &str = "request";

/// How a handler parameter is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Bound by position or by name.
    Positional,
    /// Collects surplus positional arguments.
    VarPositional,
    /// Bound by name only.
    KeywordOnly,
    /// Collects every keyword not otherwise declared.
    VarKeyword,
}

impl ParamKind {
    fn rank(self) -> u8 {
        match self {
            ParamKind::Positional => 0,
            ParamKind::VarPositional => 1,
            ParamKind::KeywordOnly => 2,
            ParamKind::VarKeyword => 3,
        }
    }

    fn is_variadic(self) -> bool {
        matches!(self, ParamKind::VarPositional | ParamKind::VarKeyword)
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Json>,
}

/// Declaration-time errors in a handler signature.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("request parameter must be the last named parameter in function: {handler}, found `{param}` after it")]
    RequestNotLast { handler: String, param: String },

    #[error("parameter `{param}` of {handler} is declared out of order")]
    OutOfOrder { handler: String, param: String },

    #[error("parameter `{param}` declared twice in {handler}")]
    DuplicateParam { handler: String, param: String },

    #[error("{handler} declares more than one variadic parameter of the same kind (`{param}`)")]
    DuplicateVariadic { handler: String, param: String },
}

/// The parameter list a handler expects, declared next to the handler.
///
/// Parameters are declared in order: positional, then at most one
/// var-positional, then keyword-only, then at most one var-keyword.
///
/// # Examples
///
/// ```
/// use weft::handler::Signature;
///
/// let profile = Signature::new("api_update_blog")
///     .param("id")
///     .request()
///     .keyword("name")
///     .keyword("summary")
///     .keyword_or("content", "")
///     .classify()
///     .unwrap();
///
/// assert!(profile.accepts_request);
/// assert_eq!(profile.required_keywords, ["name", "summary"]);
/// assert_eq!(profile.named_keywords, ["name", "summary", "content"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    handler: String,
    params: Vec<Param>,
}

impl Signature {
    /// Starts an empty signature for the handler named `handler`.
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            params: Vec::new(),
        }
    }

    fn push(mut self, name: impl Into<String>, kind: ParamKind, default: Option<Json>) -> Self {
        self.params.push(Param {
            name: name.into(),
            kind,
            default,
        });
        self
    }

    /// A positional-or-keyword parameter, filled from path parameters.
    #[must_use]
    pub fn param(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::Positional, None)
    }

    /// The request parameter.
    #[must_use]
    pub fn request(self) -> Self {
        self.param(REQUEST_PARAM)
    }

    #[must_use]
    pub fn var_args(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::VarPositional, None)
    }

    /// A required keyword-only parameter.
    #[must_use]
    pub fn keyword(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::KeywordOnly, None)
    }

    /// An optional keyword-only parameter with a default.
    #[must_use]
    pub fn keyword_or(self, name: impl Into<String>, default: impl Into<Json>) -> Self {
        self.push(name, ParamKind::KeywordOnly, Some(default.into()))
    }

    /// A sink for arbitrary keywords.
    #[must_use]
    pub fn var_keywords(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::VarKeyword, None)
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Validates the declaration and derives its [`Profile`].
    ///
    /// # Errors
    ///
    /// - [`SignatureError::RequestNotLast`] when a positional parameter
    ///   follows the request parameter.
    /// - [`SignatureError::OutOfOrder`], [`SignatureError::DuplicateParam`]
    ///   and [`SignatureError::DuplicateVariadic`] for malformed declarations.
    pub fn classify(&self) -> Result<Profile, SignatureError> {
        let err_param = |param: &Param| (self.handler.clone(), param.name.clone());
        let mut profile = Profile::default();
        let mut seen: Vec<&str> = Vec::with_capacity(self.params.len());
        let mut last_kind: Option<ParamKind> = None;

        for param in &self.params {
            if seen.contains(&param.name.as_str()) {
                let (handler, param) = err_param(param);
                return Err(SignatureError::DuplicateParam { handler, param });
            }
            seen.push(&param.name);

            if let Some(last) = last_kind {
                if param.kind.rank() < last.rank() {
                    let (handler, param) = err_param(param);
                    return Err(SignatureError::OutOfOrder { handler, param });
                }
                if param.kind == last && param.kind.is_variadic() {
                    let (handler, param) = err_param(param);
                    return Err(SignatureError::DuplicateVariadic { handler, param });
                }
            }
            last_kind = Some(param.kind);

            if profile.accepts_request && param.kind == ParamKind::Positional {
                let (handler, param) = err_param(param);
                return Err(SignatureError::RequestNotLast { handler, param });
            }
            if param.name == REQUEST_PARAM {
                profile.accepts_request = true;
                continue;
            }

            match param.kind {
                ParamKind::Positional => profile.positional.push(param.name.clone()),
                ParamKind::VarPositional => {}
                ParamKind::KeywordOnly => {
                    profile.named_keywords.push(param.name.clone());
                    match &param.default {
                        Some(default) => {
                            profile.defaults.insert(param.name.clone(), default.clone());
                        }
                        None => profile.required_keywords.push(param.name.clone()),
                    }
                }
                ParamKind::VarKeyword => profile.has_var_keyword = true,
            }
        }
        Ok(profile)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.handler)?;
        let mut star_written = false;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match param.kind {
                ParamKind::Positional => f.write_str(&param.name)?,
                ParamKind::VarPositional => {
                    star_written = true;
                    write!(f, "*{}", param.name)?;
                }
                ParamKind::KeywordOnly => {
                    if !star_written {
                        star_written = true;
                        f.write_str("*, ")?;
                    }
                    f.write_str(&param.name)?;
                    if let Some(default) = &param.default {
                        write!(f, "={default}")?;
                    }
                }
                ParamKind::VarKeyword => write!(f, "**{}", param.name)?,
            }
        }
        f.write_str(")")
    }
}

/// What a handler accepts, derived once from its [`Signature`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    /// The handler declared the request parameter.
    pub accepts_request: bool,
    /// The handler takes arbitrary keywords.
    pub has_var_keyword: bool,
    /// Keyword-only parameters, in declaration order.
    pub named_keywords: Vec<String>,
    /// Keyword-only parameters without a default.
    pub required_keywords: Vec<String>,
    /// Positional parameters other than the request.
    pub positional: Vec<String>,
    /// Defaults of the optional keyword-only parameters.
    pub defaults: IndexMap<String, Json>,
}

impl Profile {
    /// Whether the request body or query string must be decoded at all.
    pub fn needs_keywords(&self) -> bool {
        self.has_var_keyword || !self.named_keywords.is_empty()
    }
}
