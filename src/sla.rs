use serde::{Deserialize, Serialize};

/// Endpoint classification used to resolve latency targets.
///
/// Substring rules win over method rules, so `GET /api/bookings/search`
/// is `Search`, not `List`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    List,
    Read,
    Write,
    Delete,
    Analytics,
    Search,
    Export,
    Import,
    Realtime,
    Webhook,
}

impl EndpointClass {
    /// p95 latency target in milliseconds
    pub fn target_ms(&self) -> f64 {
        match self {
            EndpointClass::List => 200.0,
            EndpointClass::Read => 150.0,
            EndpointClass::Write => 250.0,
            EndpointClass::Delete => 200.0,
            EndpointClass::Analytics => 300.0,
            EndpointClass::Search => 250.0,
            EndpointClass::Export => 2000.0,
            EndpointClass::Import => 3000.0,
            EndpointClass::Realtime => 100.0,
            EndpointClass::Webhook => 1000.0,
        }
    }
}

/// Classify an endpoint from its method and normalized path.
pub fn classify(method: &str, path: &str) -> EndpointClass {
    if path.contains("/analytics") || path.contains("/stats") {
        return EndpointClass::Analytics;
    }
    if path.contains("/search") {
        return EndpointClass::Search;
    }
    if path.contains("/export") {
        return EndpointClass::Export;
    }
    if path.contains("/import") {
        return EndpointClass::Import;
    }
    if path.contains("/realtime") {
        return EndpointClass::Realtime;
    }
    if path.contains("/webhook") {
        return EndpointClass::Webhook;
    }

    match method {
        "GET" => {
            if has_trailing_identifier(path) {
                EndpointClass::Read
            } else {
                EndpointClass::List
            }
        }
        "POST" | "PUT" | "PATCH" => EndpointClass::Write,
        "DELETE" => EndpointClass::Delete,
        _ => EndpointClass::List,
    }
}

/// A path addresses a single resource when its final segment is an
/// identifier, either raw (`/bookings/42`) or already collapsed by
/// endpoint normalization (`/bookings/:id`).
fn has_trailing_identifier(path: &str) -> bool {
    match path.trim_end_matches('/').rsplit('/').next() {
        Some(segment) if !segment.is_empty() => {
            segment == ":id" || segment.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_rules_take_precedence() {
        assert_eq!(classify("GET", "/api/analytics/revenue"), EndpointClass::Analytics);
        assert_eq!(classify("GET", "/api/bookings/stats"), EndpointClass::Analytics);
        assert_eq!(classify("POST", "/api/invoices/search"), EndpointClass::Search);
        assert_eq!(classify("GET", "/api/invoices/export"), EndpointClass::Export);
        assert_eq!(classify("POST", "/api/bookings/import"), EndpointClass::Import);
        assert_eq!(classify("GET", "/api/realtime/slots"), EndpointClass::Realtime);
        assert_eq!(classify("POST", "/api/webhooks/stripe"), EndpointClass::Webhook);
    }

    #[test]
    fn method_rules_apply_otherwise() {
        assert_eq!(classify("GET", "/api/bookings"), EndpointClass::List);
        assert_eq!(classify("GET", "/api/bookings/42"), EndpointClass::Read);
        assert_eq!(classify("GET", "/api/bookings/:id"), EndpointClass::Read);
        assert_eq!(classify("POST", "/api/bookings"), EndpointClass::Write);
        assert_eq!(classify("PUT", "/api/bookings/:id"), EndpointClass::Write);
        assert_eq!(classify("PATCH", "/api/bookings/:id"), EndpointClass::Write);
        assert_eq!(classify("DELETE", "/api/bookings/:id"), EndpointClass::Delete);
    }

    #[test]
    fn targets_match_classification_table() {
        assert_eq!(EndpointClass::Read.target_ms(), 150.0);
        assert_eq!(EndpointClass::Export.target_ms(), 2000.0);
        assert_eq!(EndpointClass::Realtime.target_ms(), 100.0);
    }
}
