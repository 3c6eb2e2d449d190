//! Transport-neutral HTTP request and response.

use std::collections::BTreeMap;

use serde::Serialize;

use super::template::decode;
use crate::actions::Response;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Use a raw query string such as `a=1&b=two%20words`.
    pub fn with_query_string(mut self, raw: &str) -> Self {
        self.query.extend(parse_query(raw));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json(self, body: &serde_json::Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    /// The body as a runtime value: JSON when it parses, text otherwise,
    /// null when empty.
    pub fn body_value(&self) -> Value {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Value::Null;
        }
        match serde_json::from_slice::<serde_json::Value>(&self.body) {
            Ok(json) => Value::from(json),
            Err(_) => Value::from(String::from_utf8_lossy(&self.body).into_owned()),
        }
    }
}

/// Decode `a=1&b=x+y` into a map. Later duplicates win.
pub fn parse_query(raw: &str) -> BTreeMap<String, String> {
    raw.trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (
                decode(&k.replace('+', " ")).into_owned(),
                decode(&v.replace('+', " ")).into_owned(),
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
}

impl HttpResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, serde_json::json!({ "error": message.into() }))
    }

    pub fn not_found(method: &str, path: &str) -> Self {
        Self::error(404, format!("no route for {method} {path}"))
    }
}

impl From<Response> for HttpResponse {
    fn from(response: Response) -> Self {
        Self::json(response.code, response.body.into())
    }
}
