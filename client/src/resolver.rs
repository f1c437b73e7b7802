//! Query-cache validation and token resolution.
//!
//! A bare non-negative integer token is a 0-based position into the cached
//! node list; anything else is a literal CSS selector passed through
//! unchanged, independent of cache state.

use async_trait::async_trait;
use pagetap_protocol::CommandError;
use pagetap_protocol::exit_code;
use tracing::debug;

use crate::ClientError;
use crate::NavigationMemo;
use crate::QueryCache;
use crate::QueryCacheEntry;
use crate::Result;

/// What the resolver needs from the session: the worker's current
/// navigation id and the ability to re-run a query. Implemented by
/// [`crate::DaemonClient`]; tests script it directly.
#[async_trait]
pub trait SessionOps: Send {
    async fn current_navigation_id(&mut self) -> Result<u64>;
    async fn run_query(&mut self, selector: &str) -> Result<QueryCacheEntry>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    /// Set on staleness, naming the original selector.
    pub message: Option<String>,
}

/// Result of resolving a token.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// A cached node: the selector it was queried under, its 1-based
    /// display index, and the CDP node id.
    Node {
        selector: String,
        index: u32,
        node_id: i64,
    },
    /// A literal selector, passed through unchanged.
    Selector(String),
}

fn no_cache_error() -> CommandError {
    CommandError::new("no cached query result for this session", exit_code::NO_CACHE)
        .with_suggestion("run `pagetap query <selector>` first")
}

fn stale_message(entry: &QueryCacheEntry, current: u64) -> String {
    format!(
        "cached result for `{}` is stale: the page has navigated since it was captured \
         (navigation {} vs current {current})",
        entry.selector,
        entry
            .navigation_id
            .map_or_else(|| "unknown".to_string(), |id| id.to_string()),
    )
}

/// Validate the persisted cache entry against the worker's current
/// navigation id. Absent entry is an error; an entry without a recorded
/// navigation id is valid (legacy-permissive).
pub async fn validate(
    cache: &QueryCache,
    ops: &mut impl SessionOps,
    memo: &mut NavigationMemo,
) -> Result<Validation> {
    let Some(entry) = cache.load()? else {
        return Err(ClientError::Command(no_cache_error()));
    };
    let Some(cached_nav) = entry.navigation_id else {
        return Ok(Validation {
            valid: true,
            message: None,
        });
    };
    let current = memo.current(|| ops.current_navigation_id()).await?;
    if cached_nav == current {
        Ok(Validation {
            valid: true,
            message: None,
        })
    } else {
        Ok(Validation {
            valid: false,
            message: Some(stale_message(&entry, current)),
        })
    }
}

/// Resolve a token against an already-loaded cache entry. Selector tokens
/// never touch the cache; index tokens require one and are bounds-checked.
pub fn resolve(entry: Option<&QueryCacheEntry>, token: &str) -> std::result::Result<Resolved, CommandError> {
    let Ok(position) = token.parse::<usize>() else {
        return Ok(Resolved::Selector(token.to_string()));
    };
    let Some(entry) = entry else {
        return Err(no_cache_error());
    };
    let Some(node) = entry.nodes.get(position) else {
        let max = entry.nodes.len().saturating_sub(1);
        return Err(CommandError::out_of_range(format!(
            "index {position} is out of range; valid range is 0-{max}",
        ))
        .with_suggestion(format!("re-run `pagetap query {}`", entry.selector)));
    };
    Ok(Resolved::Node {
        selector: entry.selector.clone(),
        index: node.index,
        node_id: node.node_id,
    })
}

/// Resolve with transparent refresh: on detected staleness, re-issue the
/// cached selector as a fresh query, persist the result, and retry the
/// resolution once before surfacing an error.
pub async fn resolve_with_refresh(
    cache: &QueryCache,
    ops: &mut impl SessionOps,
    memo: &mut NavigationMemo,
    token: &str,
) -> Result<Resolved> {
    if token.parse::<usize>().is_err() {
        return Ok(Resolved::Selector(token.to_string()));
    }
    let Some(entry) = cache.load()? else {
        return Err(ClientError::Command(no_cache_error()));
    };

    let entry = match entry.navigation_id {
        None => entry,
        Some(cached_nav) => {
            let current = memo.current(|| ops.current_navigation_id()).await?;
            if cached_nav == current {
                entry
            } else {
                debug!("refreshing stale cache for `{}`", entry.selector);
                let refreshed = ops.run_query(&entry.selector).await?;
                cache.store(&refreshed)?;
                refreshed
            }
        }
    };

    resolve(Some(&entry), token).map_err(ClientError::Command)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pagetap_protocol::QueryNode;
    use pagetap_session::SessionDir;
    use pretty_assertions::assert_eq;

    use super::*;

    fn entry(selector: &str, count: u32, navigation_id: Option<u64>) -> QueryCacheEntry {
        QueryCacheEntry {
            selector: selector.to_string(),
            nodes: (0..count)
                .map(|i| QueryNode {
                    index: i + 1,
                    node_id: (100 + i) as i64,
                    tag: Some("div".to_string()),
                    classes: None,
                    preview: None,
                })
                .collect(),
            navigation_id,
        }
    }

    struct FakeSession {
        navigation_id: u64,
        query_result: Option<QueryCacheEntry>,
        queries_run: usize,
    }

    #[async_trait]
    impl SessionOps for FakeSession {
        async fn current_navigation_id(&mut self) -> Result<u64> {
            Ok(self.navigation_id)
        }

        async fn run_query(&mut self, _selector: &str) -> Result<QueryCacheEntry> {
            self.queries_run += 1;
            self.query_result
                .clone()
                .ok_or_else(|| ClientError::Protocol("unexpected query".to_string()))
        }
    }

    fn memo() -> NavigationMemo {
        NavigationMemo::with_clock(1000.0, Box::new(|| 0.0))
    }

    #[test]
    fn integer_token_resolves_zero_based_into_the_node_list() {
        let entry = entry("div.item", 5, None);
        let resolved = resolve(Some(&entry), "2").unwrap();
        assert_eq!(
            Resolved::Node {
                selector: "div.item".to_string(),
                index: 3,
                node_id: 102,
            },
            resolved
        );
    }

    #[test]
    fn out_of_range_token_names_the_valid_range() {
        let entry = entry("div.item", 5, None);
        let err = resolve(Some(&entry), "7").unwrap_err();
        assert_eq!(exit_code::OUT_OF_RANGE, err.exit_code);
        assert!(err.message.contains("0-4"), "message was: {}", err.message);
    }

    #[test]
    fn selector_token_passes_through_without_cache() {
        assert_eq!(
            Resolved::Selector("div.x".to_string()),
            resolve(None, "div.x").unwrap()
        );
        let entry = entry("p", 2, Some(1));
        assert_eq!(
            Resolved::Selector("div.x".to_string()),
            resolve(Some(&entry), "div.x").unwrap()
        );
    }

    #[test]
    fn integer_token_without_cache_is_a_no_cache_error() {
        let err = resolve(None, "0").unwrap_err();
        assert_eq!(exit_code::NO_CACHE, err.exit_code);
        assert!(err.suggestion.is_some());
    }

    #[tokio::test]
    async fn validate_accepts_matching_or_absent_navigation_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(SessionDir::new(tmp.path()));
        let mut ops = FakeSession {
            navigation_id: 4,
            query_result: None,
            queries_run: 0,
        };

        cache.store(&entry("div.item", 3, Some(4))).unwrap();
        let result = validate(&cache, &mut ops, &mut memo()).await.unwrap();
        assert_eq!(
            Validation {
                valid: true,
                message: None
            },
            result
        );

        cache.store(&entry("div.item", 3, None)).unwrap();
        let result = validate(&cache, &mut ops, &mut memo()).await.unwrap();
        assert!(result.valid);
    }

    #[tokio::test]
    async fn validate_reports_staleness_naming_the_selector() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(SessionDir::new(tmp.path()));
        cache.store(&entry("ul > li.row", 3, Some(2))).unwrap();
        let mut ops = FakeSession {
            navigation_id: 5,
            query_result: None,
            queries_run: 0,
        };

        let result = validate(&cache, &mut ops, &mut memo()).await.unwrap();
        assert!(!result.valid);
        let message = result.message.unwrap();
        assert!(message.contains("ul > li.row"), "message was: {message}");
    }

    #[tokio::test]
    async fn validate_without_cache_is_an_error_with_a_suggestion() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(SessionDir::new(tmp.path()));
        let mut ops = FakeSession {
            navigation_id: 1,
            query_result: None,
            queries_run: 0,
        };
        match validate(&cache, &mut ops, &mut memo()).await {
            Err(ClientError::Command(e)) => {
                assert_eq!(exit_code::NO_CACHE, e.exit_code);
            }
            other => panic!("expected no-cache error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_reissues_the_cached_selector_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(SessionDir::new(tmp.path()));
        cache.store(&entry("div.item", 5, Some(2))).unwrap();
        let mut ops = FakeSession {
            navigation_id: 3,
            query_result: Some(entry("div.item", 4, Some(3))),
            queries_run: 0,
        };

        let resolved = resolve_with_refresh(&cache, &mut ops, &mut memo(), "1")
            .await
            .unwrap();
        assert_eq!(1, ops.queries_run);
        assert_eq!(
            Resolved::Node {
                selector: "div.item".to_string(),
                index: 2,
                node_id: 101,
            },
            resolved
        );
        // The refreshed result was persisted for the next invocation.
        assert_eq!(Some(3), cache.load().unwrap().unwrap().navigation_id);
    }

    #[tokio::test]
    async fn refresh_surfaces_the_error_when_the_retry_still_misses() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(SessionDir::new(tmp.path()));
        cache.store(&entry("div.item", 5, Some(2))).unwrap();
        let mut ops = FakeSession {
            navigation_id: 3,
            query_result: Some(entry("div.item", 1, Some(3))),
            queries_run: 0,
        };

        match resolve_with_refresh(&cache, &mut ops, &mut memo(), "4").await {
            Err(ClientError::Command(e)) => {
                assert_eq!(exit_code::OUT_OF_RANGE, e.exit_code);
            }
            other => panic!("expected range error, got {other:?}"),
        }
        assert_eq!(1, ops.queries_run);
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_refresh_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(SessionDir::new(tmp.path()));
        cache.store(&entry("div.item", 5, Some(3))).unwrap();
        let mut ops = FakeSession {
            navigation_id: 3,
            query_result: None,
            queries_run: 0,
        };

        let resolved = resolve_with_refresh(&cache, &mut ops, &mut memo(), "0")
            .await
            .unwrap();
        assert_eq!(0, ops.queries_run);
        assert!(matches!(resolved, Resolved::Node { index: 1, .. }));
    }
}
