//! Callback body codec.
//!
//! Providers deliver callbacks either as `application/x-www-form-urlencoded` text or as a JSON object, and some of
//! them are not consistent about which one they use. [`parse_callback_body`] accepts both and flattens the result
//! into a [`CallbackFields`] map of strings.
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("The body is empty")]
    EmptyBody,
    #[error("The body is not valid UTF-8")]
    InvalidUtf8,
    #[error("The body looks like JSON but could not be parsed: {0}")]
    InvalidJson(String),
    #[error("JSON callbacks must be objects")]
    NotAnObject,
    #[error("The form body could not be decoded: {0}")]
    InvalidForm(String),
    #[error("The form could not be encoded: {0}")]
    EncodingFailed(String),
}

/// Flat string view of a callback body. Missing fields read as `None`; empty strings are kept as they were sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackFields {
    fields: BTreeMap<String, String>,
}

impl CallbackFields {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    /// Like [`get`](Self::get), but treats blank values as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackFields {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let fields = iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { fields }
    }
}

/// Decodes a raw callback body. A body whose first non-whitespace character is `{` is treated as JSON, anything else
/// as a form blob.
pub fn parse_callback_body(body: &[u8]) -> Result<CallbackFields, CodecError> {
    let text = std::str::from_utf8(body).map_err(|_| CodecError::InvalidUtf8)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CodecError::EmptyBody);
    }
    if trimmed.starts_with('{') {
        parse_json_object(trimmed)
    } else {
        parse_form_blob(trimmed)
    }
}

/// Decodes `key=value&key2=value2`. `+` is read as a space. Pairs without `=` map to an empty value, and malformed
/// percent-escapes are kept as they were sent.
pub fn parse_form_blob(text: &str) -> Result<CallbackFields, CodecError> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(text)
        .map_err(|e| CodecError::InvalidForm(e.to_string()))?;
    Ok(pairs.into_iter().collect())
}

fn parse_json_object(text: &str) -> Result<CallbackFields, CodecError> {
    let value = serde_json::from_str::<Value>(text).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(CodecError::NotAnObject);
    };
    let fields = map
        .into_iter()
        .filter_map(|(k, v)| {
            let v = match v {
                Value::Null => return None,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            Some((k, v))
        })
        .collect();
    Ok(CallbackFields { fields })
}

/// Encodes a flat struct as a form body. Fields are written in declaration order.
pub fn encode_form<T: Serialize>(form: &T) -> Result<String, CodecError> {
    serde_urlencoded::to_string(form).map_err(|e| CodecError::EncodingFailed(e.to_string()))
}
