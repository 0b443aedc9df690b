//! Handlers: async functions from [`Args`] to a [`Reply`].
//!
//! A handler is declared together with a [`Signature`] naming the parameters
//! it expects. [`RequestAdapter`] classifies the signature once and then, on
//! every request, extracts and validates the arguments before invoking it.
//!
//! ```rust,no_run
//! use weft::context::Args;
//! use weft::handler::{HandlerError, Reply, Signature};
//! use serde_json::json;
//!
//! async fn api_blogs(args: Args) -> Result<Reply, HandlerError> {
//!     let page: u32 = args.value("page")?;
//!     Ok(Reply::Json(json!({ "page": page, "blogs": [] })))
//! }
//!
//! let signature = Signature::new("api_blogs").keyword_or("page", "1");
//! # let _ = (signature, api_blogs);
//! ```

use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::context::Args;
use crate::database::DbError;

mod adapter;
mod reply;
mod signature;

pub use adapter::RequestAdapter;
pub use reply::{Renderer, Reply};
pub use signature::{Param, ParamKind, Profile, Signature, SignatureError};

/// What every handler resolves to.
pub type HandlerResult = Result<Reply, HandlerError>;

/// Type-erased, heap-allocated async handler.
///
/// Stored behind `Arc<dyn Fn(…)>` so one handler can serve many concurrent
/// requests. Build one with [`IntoHandler::into_handler`].
pub type Handler =
    Arc<dyn Fn(Args) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Args) -> impl Future<Output = HandlerResult> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl.
pub trait IntoHandler: Send + Sync + 'static {
    /// Calls the handler, boxing the returned future.
    fn call(&self, args: Args) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

    /// Erases the concrete type.
    fn into_handler(self) -> Handler
    where
        Self: Sized,
    {
        Arc::new(move |args| self.call(args))
    }
}

impl<T, F> IntoHandler for T
where
    T: Fn(Args) -> F + Send + Sync + 'static,
    F: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Args) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> {
        Box::pin((self)(args))
    }
}

/// Errors a handler invocation can end with.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request is unusable: missing or malformed arguments or body.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A domain failure reported back to the client as a JSON payload.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Domain failure with a machine-readable code.
///
/// The adapter answers it with `{"error": …, "data": …, "message": …}` rather
/// than an error status.
///
/// # Examples
///
/// ```
/// use weft::handler::ApiError;
///
/// let err = ApiError::invalid_value("email", "Invalid email.");
/// assert_eq!(err.error, "value:invalid");
/// assert_eq!(err.data, "email");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{error}: {message} ({data})")]
pub struct ApiError {
    pub error: String,
    pub data: String,
    pub message: String,
}

impl ApiError {
    pub fn new(
        error: impl Into<String>,
        data: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            data: data.into(),
            message: message.into(),
        }
    }

    /// The input `field` is wrong or missing.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("value:invalid", field, message)
    }

    /// The resource named by `field` does not exist.
    pub fn not_found(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("value:notfound", field, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new("permission:forbidden", "permission", message)
    }

    /// The error as the JSON object sent to clients.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.error,
            "data": self.data,
            "message": self.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn helpers_carry_codes() {
        assert_eq!(ApiError::not_found("blog", "").error, "value:notfound");
        let denied = ApiError::permission("admins only");
        assert_eq!(denied.data, "permission");
        assert_eq!(
            denied.payload(),
            json!({"error": "permission:forbidden", "data": "permission", "message": "admins only"})
        );
    }

    #[test]
    fn api_errors_convert_into_handler_errors() {
        let err: HandlerError = ApiError::invalid_value("name", "empty").into();
        assert!(matches!(err, HandlerError::Api(ref e) if e.data == "name"));
        assert_eq!(err.to_string(), "value:invalid: empty (name)");
    }

    #[tokio::test]
    async fn closures_become_handlers() {
        let handler = (|args: Args| async move {
            let name: String = args.value("name")?;
            Ok::<_, HandlerError>(Reply::Html(format!("<h1>{name}</h1>")))
        })
        .into_handler();

        let mut args = Args::new();
        args.insert("name", "weft");
        match handler(args).await.unwrap() {
            Reply::Html(html) => assert_eq!(html, "<h1>weft</h1>"),
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(matches!(
            handler(Args::new()).await,
            Err(HandlerError::BadRequest(_))
        ));
    }
}
