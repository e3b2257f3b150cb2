//! API Request and Response Types
//!
//! `/repositories` never rejects a query. Every parameter is parsed leniently
//! and falls back to a configured default, so the raw strings are kept as-is
//! until [`ListRepositoriesQuery::to_request`] turns them into an
//! [`AggregateRequest`].

use std::time::Duration;

use fanout_core::Repository;
use fanout_engine::AggregateRequest;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_COUNT, DEFAULT_MAX_COUNT, DEFAULT_TIMEOUT, UNIQUE_ENABLED};

// ============================================================================
// RESPONSES
// ============================================================================

/// Body of `GET /repositories`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoriesResponse {
    pub repositories: Vec<Repository>,
}

impl From<Vec<Repository>> for RepositoriesResponse {
    fn from(repositories: Vec<Repository>) -> Self {
        Self { repositories }
    }
}

// ============================================================================
// QUERY PARSING
// ============================================================================

/// Fallbacks for query parameters that are missing or do not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDefaults {
    pub count: i64,
    pub timeout: Duration,
    /// Upper bound applied to `count`.
    pub max_count: usize,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            timeout: DEFAULT_TIMEOUT,
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

/// Raw query of `GET /repositories?count=&unique=&timeout=`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRepositoriesQuery {
    pub count: Option<String>,
    pub unique: Option<String>,
    pub timeout: Option<String>,
}

impl ListRepositoriesQuery {
    /// Collect the known parameters from decoded query pairs.
    ///
    /// The first occurrence of a key wins; unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "count" => &mut query.count,
                "unique" => &mut query.unique,
                "timeout" => &mut query.timeout,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        query
    }

    /// Requested count after defaulting, clamping and capping.
    pub fn count(&self, defaults: &QueryDefaults) -> usize {
        let raw = self
            .count
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(defaults.count);

        usize::try_from(raw.max(0))
            .unwrap_or(usize::MAX)
            .min(defaults.max_count)
    }

    /// Whether deduplication was asked for. Only the literal `true` counts.
    pub fn unique(&self) -> bool {
        self.unique.as_deref() == Some(UNIQUE_ENABLED)
    }

    /// Fetch-phase deadline, parsed with `humantime`.
    pub fn timeout(&self, defaults: &QueryDefaults) -> Duration {
        self.timeout
            .as_deref()
            .and_then(|s| humantime::parse_duration(s).ok())
            .unwrap_or(defaults.timeout)
    }

    pub fn to_request(&self, defaults: &QueryDefaults) -> AggregateRequest {
        AggregateRequest::new(self.count(defaults), self.unique(), self.timeout(defaults))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_test_utils::{arb_count_param, arb_timeout_param, arb_unique_param, repository};
    use proptest::prelude::*;

    fn query(count: Option<&str>, unique: Option<&str>, timeout: Option<&str>) -> ListRepositoriesQuery {
        ListRepositoriesQuery {
            count: count.map(str::to_string),
            unique: unique.map(str::to_string),
            timeout: timeout.map(str::to_string),
        }
    }

    #[test]
    fn test_missing_parameters_use_defaults() {
        let request = ListRepositoriesQuery::default().to_request(&QueryDefaults::default());
        assert_eq!(request.count, 1);
        assert!(!request.unique);
        assert_eq!(request.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_count_parsing() {
        let defaults = QueryDefaults::default();
        assert_eq!(query(Some("7"), None, None).count(&defaults), 7);
        assert_eq!(query(Some("0"), None, None).count(&defaults), 0);
        assert_eq!(query(Some("-3"), None, None).count(&defaults), 0);
        assert_eq!(query(Some("lots"), None, None).count(&defaults), 1);
        assert_eq!(query(Some(""), None, None).count(&defaults), 1);
        assert_eq!(query(Some("2.5"), None, None).count(&defaults), 1);
    }

    #[test]
    fn test_count_respects_cap() {
        let defaults = QueryDefaults {
            max_count: 10,
            ..QueryDefaults::default()
        };
        assert_eq!(query(Some("500"), None, None).count(&defaults), 10);
        assert_eq!(query(Some("4"), None, None).count(&defaults), 4);
    }

    #[test]
    fn test_huge_count_capped_by_default() {
        let defaults = QueryDefaults::default();
        let max = i64::MAX.to_string();
        assert_eq!(query(Some(&max), None, None).count(&defaults), 1_000);
        assert_eq!(query(Some("99999999999999999999"), None, None).count(&defaults), 1);
    }

    #[test]
    fn test_unique_is_literal_true_only() {
        assert!(query(None, Some("true"), None).unique());
        assert!(!query(None, Some("TRUE"), None).unique());
        assert!(!query(None, Some("1"), None).unique());
        assert!(!query(None, Some("false"), None).unique());
        assert!(!query(None, None, None).unique());
    }

    #[test]
    fn test_timeout_parsing() {
        let defaults = QueryDefaults::default();
        assert_eq!(query(None, None, Some("50ms")).timeout(&defaults), Duration::from_millis(50));
        assert_eq!(query(None, None, Some("2s")).timeout(&defaults), Duration::from_secs(2));
        assert_eq!(query(None, None, Some("soon")).timeout(&defaults), Duration::from_secs(5));
        assert_eq!(query(None, None, Some("-1s")).timeout(&defaults), Duration::from_secs(5));
    }

    #[test]
    fn test_from_pairs_first_value_wins() {
        let parsed = ListRepositoriesQuery::from_pairs(vec![
            ("count", "3"),
            ("page", "9"),
            ("count", "8"),
            ("unique", "true"),
        ]);
        assert_eq!(parsed, query(Some("3"), Some("true"), None));
    }

    #[test]
    fn test_response_wire_shape() -> Result<(), serde_json::Error> {
        let empty = serde_json::to_string(&RepositoriesResponse::from(Vec::new()))?;
        assert_eq!(empty, r#"{"repositories":[]}"#);

        let one = serde_json::to_value(RepositoriesResponse::from(vec![repository(42)]))?;
        assert_eq!(one["repositories"][0]["id"], 42);
        assert!(one["repositories"][0]["fetchedAt"].is_string());
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_query_parsing_never_fails(
            count in arb_count_param(),
            unique in arb_unique_param(),
            timeout in arb_timeout_param(),
        ) {
            let parsed = ListRepositoriesQuery { count: count.clone(), unique: unique.clone(), timeout };
            let request = parsed.to_request(&QueryDefaults::default());

            match count.as_deref().and_then(|s| s.parse::<i64>().ok()) {
                Some(n) if n <= 0 => prop_assert_eq!(request.count, 0),
                Some(n) => prop_assert_eq!(request.count as i64, n),
                None => prop_assert_eq!(request.count, 1),
            }
            prop_assert_eq!(request.unique, unique.as_deref() == Some("true"));
            prop_assert!(request.timeout > Duration::ZERO);
        }
    }
}
