//! Checks for the recording pool collaborators.

use std::time::Duration;

use wireline::pool::{PoolConfig, PoolError};
use wireline_testing::{StaticResolver, test_pool};

#[tokio::test]
async fn recorded_request_completes_lease() {
    let (pool, connector, factory) = test_pool(PoolConfig::builder().build(), StaticResolver::new());
    let lease = pool.lease("alpha", None, None, None);
    assert_eq!(connector.pending(), 1);

    assert_eq!(connector.complete_all(), 1);
    let entry = lease.await.expect("lease completes");
    assert_eq!(entry.connection().route(), "alpha");
    assert_eq!(factory.created(), vec![entry.id()]);
}

#[tokio::test]
async fn unresolvable_route_fails_lease() {
    let resolver = StaticResolver::new().unresolvable("nowhere");
    let (pool, connector, _) = test_pool(PoolConfig::builder().build(), resolver);

    let err = pool.lease("nowhere", None, None, None).await.expect_err("resolution fails");
    assert!(matches!(err, PoolError::Resolve(_)));
    assert_eq!(connector.pending(), 0);
}

#[test]
fn shutdown_grace_is_forwarded() {
    let (pool, connector, _) = test_pool(PoolConfig::builder().build(), StaticResolver::new());
    pool.shutdown(Duration::from_millis(250));
    assert_eq!(connector.shutdown_grace(), Some(Duration::from_millis(250)));
}
