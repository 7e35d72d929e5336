use std::time::Duration;

use koala_user::cache::{Cache, InMemoryCache};

#[tokio::test(start_paused = true)]
async fn set_if_absent_respects_live_entries_and_expiry() {
    let cache = InMemoryCache::new();
    let ttl = Duration::from_secs(60);

    assert!(cache.set_if_absent("k", "first", ttl).await.unwrap());
    assert!(!cache.set_if_absent("k", "second", ttl).await.unwrap());
    assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("first"));
    assert_eq!(cache.len(), 1);

    tokio::time::advance(Duration::from_secs(61)).await;

    assert_eq!(cache.get("k").await.unwrap(), None);
    assert!(cache.is_empty());
    assert!(cache.set_if_absent("k", "third", ttl).await.unwrap());
    assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("third"));
}

#[tokio::test(start_paused = true)]
async fn delete_reports_live_entries_only() {
    let cache = InMemoryCache::new();

    cache
        .set_if_absent("live", "v", Duration::from_secs(120))
        .await
        .unwrap();
    cache
        .set_if_absent("stale", "v", Duration::from_secs(1))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    assert!(cache.delete("live").await.unwrap());
    assert!(!cache.delete("live").await.unwrap());
    assert!(!cache.delete("stale").await.unwrap());
    assert!(!cache.delete("missing").await.unwrap());
    assert!(cache.is_empty());
}
