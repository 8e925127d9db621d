// src/api/payload.rs
use axum::http::{header, HeaderMap};
use serde_json::Value;

use super::webhook::IngestError;

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.to_ascii_lowercase()
                .contains("application/x-www-form-urlencoded")
        })
}

/// JSON body, or a form body whose `payload` field holds the JSON (GitHub's form mode).
pub fn decode_payload(headers: &HeaderMap, body: &[u8]) -> Result<Value, IngestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestError::EmptyBody);
    }
    if is_form(headers) {
        let json = url::form_urlencoded::parse(body)
            .find(|(k, _)| k == "payload")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| IngestError::MalformedPayload("form body without a payload field".into()))?;
        return serde_json::from_str(&json)
            .map_err(|e| IngestError::MalformedPayload(format!("payload field is not JSON: {e}")));
    }
    serde_json::from_slice(body).map_err(|e| IngestError::MalformedPayload(format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn json_and_form_bodies() {
        let h = HeaderMap::new();
        assert_eq!(decode_payload(&h, br#"{"a":1}"#).unwrap()["a"], 1);

        let mut form = HeaderMap::new();
        form.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let body = b"payload=%7B%22ref%22%3A%22refs%2Fheads%2Fmain%22%7D";
        assert_eq!(
            decode_payload(&form, body).unwrap()["ref"],
            "refs/heads/main"
        );
        assert!(matches!(
            decode_payload(&form, b"other=1"),
            Err(IngestError::MalformedPayload(_))
        ));
    }

    #[test]
    fn empty_and_garbage_rejected() {
        let h = HeaderMap::new();
        assert!(matches!(decode_payload(&h, b""), Err(IngestError::EmptyBody)));
        assert!(matches!(decode_payload(&h, b"  \n"), Err(IngestError::EmptyBody)));
        assert!(matches!(
            decode_payload(&h, b"{nope"),
            Err(IngestError::MalformedPayload(_))
        ));
    }
}
