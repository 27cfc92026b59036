//! Deterministic request keys.

use std::fmt;

use serde::Serialize;

use crate::transport::Endpoint;

/// Key derived from a request's method, endpoint and body.
///
/// Query parameters are emitted in key order (they live in a `BTreeMap`) so two
/// descriptors that differ only in insertion order share a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(endpoint: &Endpoint) -> Self {
        let mut key = format!(
            "{} {}:{}",
            endpoint.method.as_str(),
            endpoint.dependency,
            endpoint.path
        );

        if !endpoint.query.is_empty() {
            let query: Vec<String> = endpoint
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push('?');
            key.push_str(&query.join("&"));
        }

        if let Some(body) = &endpoint.body {
            key.push('#');
            key.push_str(&body.to_string());
        }

        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Fingerprint {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Dependency, Method};
    use serde_json::json;

    #[test]
    fn test_query_order_is_irrelevant() {
        let a = Endpoint::get("/market/quotes")
            .with_query("symbols", "AAPL")
            .with_query("range", "1d");
        let b = Endpoint::get("/market/quotes")
            .with_query("range", "1d")
            .with_query("symbols", "AAPL");
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
        assert_eq!(
            Fingerprint::of(&a).as_str(),
            "GET backend:/market/quotes?range=1d&symbols=AAPL"
        );
    }

    #[test]
    fn test_method_body_and_dependency_distinguish() {
        let get = Endpoint::get("/chat");
        let post = Endpoint::get("/chat").with_body(Method::Post, json!({"message": "hi"}));
        let ai = Endpoint::get("/chat").with_dependency(Dependency::Ai);

        assert_ne!(Fingerprint::of(&get), Fingerprint::of(&post));
        assert_ne!(Fingerprint::of(&get), Fingerprint::of(&ai));
        assert!(Fingerprint::of(&post).as_str().ends_with("#{\"message\":\"hi\"}"));
    }
}
