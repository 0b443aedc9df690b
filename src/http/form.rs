//! Key/value decoding for query strings, url-encoded forms and multipart bodies.
//!
//! All decoders return pairs in wire order and keep the first value of a
//! repeated key; later duplicates are dropped.

use indexmap::IndexMap;
use indexmap::map::Entry;
use percent_encoding::percent_decode_str;
use tracing::debug;

/// Decoded, single-valued form fields in wire order.
pub type FormFields = IndexMap<String, String>;

/// Parses `a=1&b=two+words&c=%2F` style input.
///
/// `+` decodes to a space and `%XX` escapes to their byte value; invalid
/// escapes are kept verbatim. Pairs without `=` and pairs with an empty value
/// are kept with an empty string value.
///
/// # Examples
///
/// ```
/// use weft::http::form::parse_urlencoded;
///
/// let fields = parse_urlencoded("name=foo&name=bar&q=a+b");
/// assert_eq!(fields.get("name").map(String::as_str), Some("foo"));
/// assert_eq!(fields.get("q").map(String::as_str), Some("a b"));
/// ```
pub fn parse_urlencoded(input: &str) -> FormFields {
    let mut fields = FormFields::new();
    for (key, value) in form_urlencoded::parse(input.as_bytes()) {
        if let Entry::Vacant(slot) = fields.entry(key.into_owned()) {
            slot.insert(value.into_owned());
        }
    }
    fields
}

/// Percent-decodes one captured path segment. `+` is a literal plus here.
pub fn decode_path_segment(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Extracts the `boundary` parameter from a `multipart/form-data` content type.
pub fn multipart_boundary(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"'))
            .filter(|b| !b.is_empty())
    })
}

/// Parses the text fields of a `multipart/form-data` body.
///
/// Parts that carry a `filename` are uploads, not keyword data, and are
/// skipped. Returns `None` when the body is not framed by `boundary`.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Option<FormFields> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut fields = FormFields::new();
    let mut rest = &body[find(body, delimiter)? + delimiter.len()..];

    loop {
        // `--` right after a delimiter closes the body.
        if rest.starts_with(b"--") {
            return Some(fields);
        }
        rest = rest.strip_prefix(b"\r\n")?;

        let end = find(rest, delimiter)?;
        // The part content is followed by CRLF before the next delimiter.
        let part = rest[..end].strip_suffix(b"\r\n").unwrap_or(&rest[..end]);
        rest = &rest[end + delimiter.len()..];

        let split = find(part, b"\r\n\r\n")?;
        let head = String::from_utf8_lossy(&part[..split]);
        let content = &part[split + 4..];

        let Some(disposition) = head
            .split("\r\n")
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-disposition")
                    .then_some(value)
            })
        else {
            continue;
        };

        let Some(name) = disposition_param(disposition, "name") else {
            continue;
        };
        if disposition_param(disposition, "filename").is_some() {
            debug!(field = %name, "skipping multipart file part");
            continue;
        }

        if let Entry::Vacant(slot) = fields.entry(name) {
            slot.insert(String::from_utf8_lossy(content).into_owned());
        }
    }
}

fn disposition_param(disposition: &str, key: &str) -> Option<String> {
    disposition.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        (name.trim() == key).then(|| value.trim().trim_matches('"').to_owned())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_wins() {
        let fields = parse_urlencoded("name=foo&name=bar");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["name"], "foo");
    }

    #[test]
    fn blank_values_are_kept() {
        let fields = parse_urlencoded("a=&b&c=3");
        assert_eq!(fields["a"], "");
        assert_eq!(fields["b"], "");
        assert_eq!(fields["c"], "3");
    }

    #[test]
    fn empty_segments_are_ignored() {
        let fields = parse_urlencoded("&&a=1&");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn percent_and_plus_decoding() {
        let fields = parse_urlencoded("q=a+b%20c%2Fd&name=%E4%BD%A0&pct=100%&bad=%zz");
        assert_eq!(fields["q"], "a b c/d");
        assert_eq!(fields["name"], "你");
        assert_eq!(fields["pct"], "100%");
        assert_eq!(fields["bad"], "%zz");
    }

    #[test]
    fn encoded_keys_collapse_onto_first_value() {
        let fields = parse_urlencoded("a%20b=1&a+b=2");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["a b"], "1");
    }

    #[test]
    fn path_segments_keep_plus() {
        assert_eq!(decode_path_segment("a+b%20c"), "a+b c");
        assert_eq!(decode_path_segment("%E4%BD%A0"), "你");
        assert_eq!(decode_path_segment("%zz"), "%zz");
    }

    #[test]
    fn boundary_from_content_type() {
        assert_eq!(
            multipart_boundary("multipart/form-data; boundary=XyZ"),
            Some("XyZ")
        );
        assert_eq!(
            multipart_boundary("multipart/form-data; charset=utf-8; boundary=\"q q\""),
            Some("q q")
        );
        assert_eq!(multipart_boundary("multipart/form-data"), None);
    }

    #[test]
    fn multipart_text_fields() {
        let body = "--B\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            Hello\r\n\
            --B\r\n\
            Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            file body\r\n\
            --B\r\n\
            Content-Disposition: form-data; name=\"summary\"\r\n\r\n\
            two\r\nlines\r\n\
            --B--\r\n";
        let fields = parse_multipart(body.as_bytes(), "B").unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["title"], "Hello");
        assert_eq!(fields["summary"], "two\r\nlines");
    }

    #[test]
    fn multipart_without_boundary_is_rejected() {
        assert!(parse_multipart(b"no framing here", "B").is_none());
    }
}
