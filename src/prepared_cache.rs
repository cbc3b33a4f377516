//! The prepared-statement cache: one slot per (session, keyspace, CQL),
//! with single-flight preparation.
//!
//! The first caller of a key runs the preparation; callers arriving while
//! it is in flight await the same outcome. A failure is shared with the
//! waiting callers but never cached, so the next call retries.

use crate::statement::PreparedStatement;
use crate::{CqlError, CqlResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Cache key: the session identity separates the caches of different
/// session instances even when keyspace and CQL text coincide.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct CacheKey {
    pub(crate) session_id: u64,
    pub(crate) keyspace: Option<String>,
    pub(crate) cql: String,
}

type SharedOutcome = Result<Arc<PreparedStatement>, Arc<CqlError>>;

#[derive(Debug)]
enum Slot {
    InFlight(Vec<oneshot::Sender<SharedOutcome>>),
    Ready(Arc<PreparedStatement>),
}

/// The cache itself; all public operations are safe for concurrent use.
#[derive(Debug, Default)]
pub(crate) struct PreparedStatementCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl PreparedStatementCache {
    /// Returns the cached statement for the key, or runs `prepare` —
    /// exactly once per key, however many callers arrive concurrently.
    pub(crate) async fn get_or_prepare<F, Fut>(
        &self,
        key: CacheKey,
        prepare: F,
    ) -> CqlResult<Arc<PreparedStatement>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CqlResult<PreparedStatement>>,
    {
        let waiter = {
            let mut slots = self.slots.lock().unwrap();
            match slots.get_mut(&key) {
                Some(Slot::Ready(prepared)) => return Ok(prepared.clone()),
                Some(Slot::InFlight(waiters)) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    slots.insert(key.clone(), Slot::InFlight(Vec::new()));
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            return match rx.await {
                Ok(Ok(prepared)) => Ok(prepared),
                Ok(Err(shared)) => Err(CqlError::SharedPrepare(shared)),
                // the leader was cancelled; retry as a fresh leader
                Err(_) => Err(CqlError::Internal("preparation was abandoned")),
            };
        }

        trace!("preparing: {}", key.cql);
        match prepare().await {
            Ok(prepared) => {
                let prepared = Arc::new(prepared);
                let waiters = {
                    let mut slots = self.slots.lock().unwrap();
                    let waiters = match slots.remove(&key) {
                        Some(Slot::InFlight(waiters)) => waiters,
                        _ => Vec::new(),
                    };
                    slots.insert(key, Slot::Ready(prepared.clone()));
                    waiters
                };
                for waiter in waiters {
                    let _ = waiter.send(Ok(prepared.clone()));
                }
                Ok(prepared)
            }
            Err(error) => {
                // failures are not cached; the next caller prepares anew
                let waiters = {
                    let mut slots = self.slots.lock().unwrap();
                    match slots.remove(&key) {
                        Some(Slot::InFlight(waiters)) => waiters,
                        _ => Vec::new(),
                    }
                };
                let shared = Arc::new(error);
                for waiter in waiters {
                    let _ = waiter.send(Err(shared.clone()));
                }
                // without waiters the original error comes back unwrapped
                match Arc::try_unwrap(shared) {
                    Ok(error) => Err(error),
                    Err(shared) => Err(CqlError::SharedPrepare(shared)),
                }
            }
        }
    }

    /// All cached statements, e.g. for repreparing on a host that came up.
    pub(crate) fn all(&self) -> Vec<Arc<PreparedStatement>> {
        self.slots
            .lock()
            .unwrap()
            .values()
            .filter_map(|slot| match slot {
                Slot::Ready(prepared) => Some(prepared.clone()),
                Slot::InFlight(_) => None,
            })
            .collect()
    }

    /// Number of cached (ready) statements.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheKey, PreparedStatementCache};
    use crate::protocol::parts::PreparedResponse;
    use crate::statement::PreparedStatement;
    use crate::CqlError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn key(session_id: u64, keyspace: Option<&str>, cql: &str) -> CacheKey {
        CacheKey {
            session_id,
            keyspace: keyspace.map(ToString::to_string),
            cql: cql.to_string(),
        }
    }

    fn fake_prepared(cql: &str) -> PreparedStatement {
        PreparedStatement::from_response(
            PreparedResponse {
                id: cql.as_bytes().to_vec(),
                result_metadata_id: None,
                variables: crate::protocol::parts::ResultSetMetadata::default(),
                pk_indexes: Vec::new(),
                result_metadata: crate::protocol::parts::ResultSetMetadata::default(),
            },
            cql.to_string(),
            None,
            Vec::new(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_flight_with_a_thousand_callers() {
        let cache = Arc::new(PreparedStatementCache::default());
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..1000 {
            let cache = cache.clone();
            let invocations = invocations.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_prepare(key(1, Some("ks"), "SELECT 1"), move || async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(fake_prepared("SELECT 1"))
                    })
                    .await
            }));
        }
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        // all callers see the same instance
        for prepared in &results {
            assert!(Arc::ptr_eq(prepared, &results[0]));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_failure_is_shared_then_retried() {
        let cache = Arc::new(PreparedStatementCache::default());
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..1000 {
            let cache = cache.clone();
            let invocations = invocations.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_prepare(key(1, None, "SELECT broken"), move || async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                        Err(CqlError::Usage("injected"))
                    })
                    .await
            }));
        }
        let mut failures = 0;
        for handle in handles {
            let result = handle.await.unwrap();
            match result {
                Err(CqlError::SharedPrepare(inner)) => {
                    assert!(matches!(*inner, CqlError::Usage("injected")));
                    failures += 1;
                }
                Err(CqlError::Usage("injected")) => failures += 1,
                other => panic!("expected the shared failure, got {other:?}"),
            }
        }
        assert_eq!(failures, 1000);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 0);

        // the failure was not cached: the next call prepares again
        let prepared = cache
            .get_or_prepare(key(1, None, "SELECT broken"), || async {
                Ok(fake_prepared("SELECT broken"))
            })
            .await
            .unwrap();
        assert_eq!(prepared.cql(), "SELECT broken");
        assert_eq!(cache.len(), 1);

        // and subsequent calls reuse the cached result
        let again = cache
            .get_or_prepare(key(1, None, "SELECT broken"), || async {
                panic!("must not prepare again")
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&prepared, &again));
    }

    #[tokio::test]
    async fn cache_keys_are_independent() {
        let cache = PreparedStatementCache::default();
        let a = cache
            .get_or_prepare(key(1, Some("ks"), "SELECT 1"), || async {
                Ok(fake_prepared("SELECT 1"))
            })
            .await
            .unwrap();
        // another session instance, same keyspace and CQL
        let b = cache
            .get_or_prepare(key(2, Some("ks"), "SELECT 1"), || async {
                Ok(fake_prepared("SELECT 1"))
            })
            .await
            .unwrap();
        // same session, same CQL, different keyspace
        let c = cache
            .get_or_prepare(key(1, Some("other"), "SELECT 1"), || async {
                Ok(fake_prepared("SELECT 1"))
            })
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 3);
    }
}
