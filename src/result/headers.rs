//! Parsing of captured raw response headers.

use std::collections::HashMap;

/// Name under which the status line is exposed.
pub const STATUS_LINE_KEY: &str = "result";

/// Parsed response headers.
///
/// The first line of the raw block is kept as the status line (also
/// reachable as `get("result")`). Every following `Name: Value` line is
/// stored under its lower-cased name, the last occurrence winning, except
/// `set-cookie` whose values accumulate in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    status_line: String,
    values: HashMap<String, String>,
    set_cookie: Vec<String>,
}

impl ResponseHeaders {
    /// Parses a raw header block. Lines without a colon are ignored.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut lines = text.trim_end().split('\n');
        let mut headers = Self {
            status_line: lines.next().unwrap_or_default().trim().to_string(),
            ..Self::default()
        };

        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if name.is_empty() {
                continue;
            }
            if name == "set-cookie" {
                headers.set_cookie.push(value);
            } else {
                headers.values.insert(name, value);
            }
        }

        headers
    }

    /// The response status line, e.g. `HTTP/1.1 200 OK`.
    #[must_use]
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Looks up a header by case-insensitive name. `set-cookie` returns the
    /// last cookie; use [`set_cookies`](Self::set_cookies) for all of them.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        if name == STATUS_LINE_KEY {
            return Some(&self.status_line);
        }
        if name == "set-cookie" {
            return self.set_cookie.last().map(String::as_str);
        }
        self.values.get(&name).map(String::as_str)
    }

    /// All `set-cookie` values in arrival order.
    #[must_use]
    pub fn set_cookies(&self) -> &[String] {
        &self.set_cookie
    }

    /// Iterates over single-valued headers (not the status line or cookies).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of distinct header names, counting `set-cookie` once if present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len() + usize::from(!self.set_cookie.is_empty())
    }

    /// Returns `true` when no header lines were present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders as a JSON object with the status line under `result`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(
            STATUS_LINE_KEY.to_string(),
            serde_json::Value::String(self.status_line.clone()),
        );
        for (name, value) in &self.values {
            map.insert(name.clone(), serde_json::Value::String(value.clone()));
        }
        if !self.set_cookie.is_empty() {
            map.insert("set-cookie".to_string(), serde_json::json!(self.set_cookie));
        }
        serde_json::Value::Object(map)
    }
}
