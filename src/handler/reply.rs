use bytes::Bytes;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::error;

use super::HandlerError;
use crate::http::{Response, StatusCode};

/// Renders named templates for [`Reply::Template`].
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, data: &Json) -> Result<String, HandlerError>;
}

/// What a handler hands back, converted to a [`Response`] by the router.
///
/// # Examples
///
/// ```
/// use weft::handler::Reply;
/// use weft::http::StatusCode;
///
/// let response = Reply::from("redirect:/signin").into_response(None);
/// assert_eq!(response.status(), StatusCode::Found);
/// assert_eq!(response.headers().get("location"), Some("/signin"));
///
/// let response = Reply::from("<p>hi</p>").into_response(None);
/// assert_eq!(response.text(), "<p>hi</p>");
/// ```
#[derive(Debug)]
pub enum Reply {
    /// `application/json` body.
    Json(Json),
    /// `text/html` body.
    Html(String),
    /// `302 Found` to the target.
    Redirect(String),
    /// A bare status with an empty body.
    Status(StatusCode),
    /// `application/octet-stream` body.
    Bytes(Bytes),
    /// A template rendered with `data` by the router's [`Renderer`].
    Template { name: String, data: Json },
    /// A fully built response, passed through untouched.
    Response(Response),
}

impl Reply {
    /// Encodes any serializable value as a JSON reply.
    ///
    /// # Errors
    ///
    /// [`HandlerError::Internal`] when `value` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, HandlerError> {
        serde_json::to_value(value)
            .map(Reply::Json)
            .map_err(|e| HandlerError::Internal(format!("cannot encode reply: {e}")))
    }

    pub fn template(name: impl Into<String>, data: Json) -> Self {
        Reply::Template {
            name: name.into(),
            data,
        }
    }

    /// Builds the response. Template replies need `renderer`; without one,
    /// or when rendering fails, the answer is a `500`.
    pub fn into_response(self, renderer: Option<&dyn Renderer>) -> Response {
        match self {
            Reply::Json(value) => Response::json(&value),
            Reply::Html(html) => html_response(html),
            Reply::Redirect(target) => Response::new(StatusCode::Found).header("Location", target),
            Reply::Status(status) => Response::new(status),
            Reply::Bytes(bytes) => Response::new(StatusCode::Ok)
                .header("Content-Type", "application/octet-stream")
                .body_bytes(bytes.to_vec()),
            Reply::Template { name, data } => {
                let Some(renderer) = renderer else {
                    error!(template = %name, "no template renderer configured");
                    return Response::new(StatusCode::InternalServerError);
                };
                match renderer.render(&name, &data) {
                    Ok(html) => html_response(html),
                    Err(e) => {
                        error!(template = %name, error = %e, "template rendering failed");
                        Response::new(StatusCode::InternalServerError)
                    }
                }
            }
            Reply::Response(response) => response,
        }
    }
}

fn html_response(html: String) -> Response {
    Response::new(StatusCode::Ok)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html)
}

/// Strings starting with `redirect:` redirect; anything else is HTML.
impl From<String> for Reply {
    fn from(s: String) -> Self {
        match s.strip_prefix("redirect:") {
            Some(target) => Reply::Redirect(target.to_owned()),
            None => Reply::Html(s),
        }
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::from(s.to_owned())
    }
}

impl From<Json> for Reply {
    fn from(value: Json) -> Self {
        Reply::Json(value)
    }
}

impl From<StatusCode> for Reply {
    fn from(status: StatusCode) -> Self {
        Reply::Status(status)
    }
}

impl From<Bytes> for Reply {
    fn from(bytes: Bytes) -> Self {
        Reply::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Reply {
    fn from(bytes: Vec<u8>) -> Self {
        Reply::Bytes(Bytes::from(bytes))
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    impl Renderer for Upper {
        fn render(&self, template: &str, data: &Json) -> Result<String, HandlerError> {
            match template {
                "greet.html" => Ok(format!("HELLO {}", data["name"].as_str().unwrap_or("?"))),
                other => Err(HandlerError::Internal(format!("unknown template {other}"))),
            }
        }
    }

    #[test]
    fn json_reply_sets_content_type() {
        let res = Reply::Json(json!({"a": 1})).into_response(None);
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(res.headers().get("content-type").unwrap().starts_with("application/json"));
        assert_eq!(res.text(), r#"{"a":1}"#);
    }

    #[test]
    fn strings_become_html_or_redirects() {
        assert!(matches!(Reply::from("<b>x</b>"), Reply::Html(_)));
        assert!(matches!(Reply::from("redirect:/"), Reply::Redirect(t) if t == "/"));

        let res = Reply::from("<b>x</b>").into_response(None);
        assert!(res.headers().get("content-type").unwrap().starts_with("text/html"));
    }

    #[test]
    fn bytes_and_status() {
        let res = Reply::from(vec![1u8, 2, 3]).into_response(None);
        assert_eq!(res.headers().get("content-type"), Some("application/octet-stream"));
        assert_eq!(res.content(), [1, 2, 3]);

        let res = Reply::from(StatusCode::NoContent).into_response(None);
        assert_eq!(res.status(), StatusCode::NoContent);
        assert!(res.content().is_empty());
    }

    #[test]
    fn templates_need_a_renderer() {
        let reply = || Reply::template("greet.html", json!({"name": "ann"}));
        assert_eq!(
            reply().into_response(None).status(),
            StatusCode::InternalServerError
        );
        assert_eq!(reply().into_response(Some(&Upper)).text(), "HELLO ann");

        let missing = Reply::template("nope.html", json!({}));
        assert_eq!(
            missing.into_response(Some(&Upper)).status(),
            StatusCode::InternalServerError
        );
    }

    #[test]
    fn serializable_values_encode() {
        #[derive(Serialize)]
        struct Page {
            index: u32,
        }
        assert!(matches!(Reply::json(&Page { index: 2 }).unwrap(), Reply::Json(v) if v["index"] == 2));
    }
}
