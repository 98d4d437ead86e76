//! Yelp Fusion business search client.
//!
//! One blocking GET per company against `/v3/businesses/search`, with the
//! trade name as `term` and the postal code as `location`. No retries.
//! https://www.yelp.com/developers/documentation/v3/business_search

use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Public Yelp API host
pub const DEFAULT_API_URL: &str = "https://api.yelp.com";

const SEARCH_PATH: &str = "/v3/businesses/search";

/// First result of a search, as returned by the API
pub type Business = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The API returned at least one business; this is the first one
    Match(Business),
    /// The API answered 200 with an empty `businesses` list
    NoMatch,
}

/// Failures that say nothing about whether the business exists.
///
/// Callers should leave the company unfetched so a later run retries it.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by the search API")]
    RateLimited,

    #[error("search API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed search response: {0}")]
    Malformed(String),
}

/// Seam between the run loop and the network
pub trait BusinessSearch {
    fn search(&self, term: &str, location: &str) -> Result<SearchOutcome, SearchError>;
}

/// Turn a raw HTTP status + body into a typed outcome
pub fn parse_search_response(status: u16, body: &str) -> Result<SearchOutcome, SearchError> {
    match status {
        200 => {}
        429 => return Err(SearchError::RateLimited),
        _ => {
            return Err(SearchError::Status {
                status,
                body: body.to_string(),
            })
        }
    }

    let json: Value = serde_json::from_str(body)
        .map_err(|e| SearchError::Malformed(format!("invalid JSON: {}", e)))?;

    let businesses = json
        .get("businesses")
        .and_then(|b| b.as_array())
        .ok_or_else(|| SearchError::Malformed("missing 'businesses' array".to_string()))?;

    match businesses.first() {
        None => Ok(SearchOutcome::NoMatch),
        Some(Value::Object(first)) => Ok(SearchOutcome::Match(first.clone())),
        Some(other) => Err(SearchError::Malformed(format!(
            "expected business object, got {}",
            other
        ))),
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

pub struct YelpClient {
    client: reqwest::blocking::Client,
    base_url: String,
    access_token: String,
}

impl YelpClient {
    /// Build a client for `base_url` (e.g. `https://api.yelp.com`, no trailing slash needed).
    ///
    /// `timeout` of `None` waits as long as the server takes.
    pub fn new(
        base_url: &str,
        access_token: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, SearchError> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(concat!("yelp-enrichment/", env!("CARGO_PKG_VERSION")));

        // reqwest's blocking client defaults to 30s; an explicit None lifts it
        builder = builder.timeout(timeout);

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    pub fn search_url(&self) -> String {
        format!("{}{}", self.base_url, SEARCH_PATH)
    }
}

impl BusinessSearch for YelpClient {
    fn search(&self, term: &str, location: &str) -> Result<SearchOutcome, SearchError> {
        let url = self.search_url();
        debug!(url = %url, term, location, "searching business");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("term", term), ("location", location)])
            .send()?;

        let status = resp.status().as_u16();
        let body = resp.text()?;
        parse_search_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_business_is_returned_unchanged() {
        let body = json!({
            "total": 2,
            "businesses": [
                {"id": "bar-do-ze", "name": "Bar do Zé", "rating": 4.5,
                 "location": {"zip_code": "70000-000"}},
                {"id": "outro", "name": "Outro"}
            ]
        })
        .to_string();

        let outcome = parse_search_response(200, &body).unwrap();

        let expected = json!({"id": "bar-do-ze", "name": "Bar do Zé", "rating": 4.5,
                              "location": {"zip_code": "70000-000"}});
        match outcome {
            SearchOutcome::Match(business) => assert_eq!(Value::Object(business), expected),
            SearchOutcome::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn test_empty_businesses_is_no_match() {
        let outcome = parse_search_response(200, r#"{"businesses": [], "total": 0}"#).unwrap();
        assert_eq!(outcome, SearchOutcome::NoMatch);
    }

    #[test]
    fn test_non_200_is_an_error() {
        let err = parse_search_response(400, r#"{"error": {"code": "LOCATION_NOT_FOUND"}}"#)
            .unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 400, .. }));

        let err = parse_search_response(500, "").unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 500, .. }));
    }

    #[test]
    fn test_429_is_rate_limited() {
        let err = parse_search_response(429, "{}").unwrap_err();
        assert!(matches!(err, SearchError::RateLimited));
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(
            parse_search_response(200, "<html>").unwrap_err(),
            SearchError::Malformed(_)
        ));
        assert!(matches!(
            parse_search_response(200, r#"{"total": 0}"#).unwrap_err(),
            SearchError::Malformed(_)
        ));
        assert!(matches!(
            parse_search_response(200, r#"{"businesses": ["x"]}"#).unwrap_err(),
            SearchError::Malformed(_)
        ));
    }

    #[test]
    fn test_search_url_trims_trailing_slash() {
        let client = YelpClient::new("http://localhost:8080/", "token", None).unwrap();
        assert_eq!(client.search_url(), "http://localhost:8080/v3/businesses/search");
    }
}
