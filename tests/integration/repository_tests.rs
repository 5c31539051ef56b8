//! Compiled-rule repository: caching, invalidation and failure handling

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use activity_alerts::models::{RuleId, RuleRecord, RuleStatus};
use activity_alerts::services::{
    CompiledRuleCache, RuleCache, RuleRepository, RuleSource, COMPILED_RULES_KEY,
};
use activity_alerts::utils::AppResult;

use crate::common::*;

fn cached_repository(source: Arc<MockRuleSource>) -> (RuleRepository, Arc<CompiledRuleCache>) {
    let cache = Arc::new(CompiledRuleCache::new(None));
    let repository = RuleRepository::new(source, Some(cache.clone()));
    (repository, cache)
}

#[tokio::test]
async fn test_cached_map_is_reused() {
    let source = Arc::new(MockRuleSource::new());
    source.insert(1, RuleFixtures::object_id_42());
    let (repository, cache) = cached_repository(source.clone());

    let first = repository.compiled_rules().await.unwrap();
    let second = repository.compiled_rules().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(source.list_calls(), 1);
    assert!(RuleCache::get(cache.as_ref(), COMPILED_RULES_KEY)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_disabled_cache_always_compiles() {
    let source = Arc::new(MockRuleSource::new());
    source.insert(1, RuleFixtures::object_id_42());
    let repository = RuleRepository::new(source.clone(), None);

    repository.compiled_rules().await.unwrap();
    repository.compiled_rules().await.unwrap();

    assert_eq!(source.list_calls(), 2);
}

#[tokio::test]
async fn test_failing_cache_falls_back_to_source() {
    let source = Arc::new(MockRuleSource::new());
    source.insert(1, RuleFixtures::object_id_42());
    let cache = Arc::new(FailingCache::default());
    let repository = RuleRepository::new(source.clone(), Some(cache.clone()));

    let rules = repository.compiled_rules().await.unwrap();
    repository.invalidate().await;

    assert_eq!(rules.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert!(cache.calls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn test_invalidation_picks_up_saved_rules() {
    let source = Arc::new(MockRuleSource::new());
    source.insert(1, RuleFixtures::object_id_42());
    let (repository, _cache) = cached_repository(source.clone());

    let before = repository.compiled_rules().await.unwrap();
    assert_eq!(before.len(), 1);

    source.insert(2, RuleFixtures::summary_contains_fail());

    // Still the cached map until the save is announced
    assert_eq!(repository.compiled_rules().await.unwrap().len(), 1);

    repository.invalidate().await;
    let after = repository.compiled_rules().await.unwrap();

    assert_eq!(after.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    // Readers of the old snapshot are unaffected
    assert_eq!(before.len(), 1);
}

#[tokio::test]
async fn test_inactive_rules_are_excluded() {
    let source = Arc::new(MockRuleSource::new());
    source.insert(1, RuleFixtures::object_id_42());
    source.insert_with_status(2, RuleStatus::Draft, RuleFixtures::object_id_42());
    source.insert_with_status(3, RuleStatus::Inactive, RuleFixtures::object_id_42());
    let (repository, _cache) = cached_repository(source.clone());

    let rules = repository.compiled_rules().await.unwrap();
    assert_eq!(rules.keys().copied().collect::<Vec<_>>(), vec![1]);

    source.set_status(1, RuleStatus::Inactive);
    repository.invalidate().await;

    assert!(repository.compiled_rules().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_broken_rule_does_not_block_others() {
    let source = Arc::new(MockRuleSource::new());
    source.insert(1, RuleFixtures::object_id_42());
    source.insert(2, RuleFixtures::unknown_group());
    source.insert(3, RuleRecord::default());
    source.insert(4, RuleFixtures::login_or_logout());
    let (repository, _cache) = cached_repository(source);

    let rules = repository.compiled_rules().await.unwrap();

    assert_eq!(rules.keys().copied().collect::<Vec<_>>(), vec![1, 4]);
}

#[tokio::test]
async fn test_source_failure_propagates() {
    let source = Arc::new(MockRuleSource::new());
    source.insert(1, RuleFixtures::object_id_42());
    source.set_failing(true);
    let (repository, _cache) = cached_repository(source.clone());

    assert!(repository.compiled_rules().await.is_err());

    // Nothing was cached, so recovery is immediate
    source.set_failing(false);
    assert_eq!(repository.compiled_rules().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_readers_share_one_rebuild() {
    let source = Arc::new(MockRuleSource::new());
    source.insert(1, RuleFixtures::object_id_42());
    let (repository, _cache) = cached_repository(source.clone());
    let repository = Arc::new(repository);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repository = repository.clone();
            tokio::spawn(async move { repository.compiled_rules().await.unwrap() })
        })
        .collect();

    let mut maps = Vec::new();
    for handle in handles {
        maps.push(handle.await.unwrap());
    }

    assert_eq!(source.list_calls(), 1);
    assert!(maps.iter().all(|m| Arc::ptr_eq(m, &maps[0])));
}

/// Source whose first listing blocks until released
struct GatedSource {
    inner: MockRuleSource,
    calls: AtomicUsize,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl RuleSource for GatedSource {
    async fn list_active_rule_ids(&self) -> AppResult<Vec<RuleId>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.started.notify_one();
            self.release.notified().await;
        }
        self.inner.list_active_rule_ids().await
    }

    async fn get_rule(&self, id: RuleId) -> AppResult<Option<RuleRecord>> {
        self.inner.get_rule(id).await
    }
}

#[tokio::test]
async fn test_rebuild_overtaken_by_save_is_not_cached() {
    let source = Arc::new(GatedSource {
        inner: MockRuleSource::new(),
        calls: AtomicUsize::new(0),
        started: Notify::new(),
        release: Notify::new(),
    });
    source.inner.insert(1, RuleFixtures::object_id_42());

    let cache = Arc::new(CompiledRuleCache::new(None));
    let repository = Arc::new(RuleRepository::new(source.clone(), Some(cache.clone())));

    let reader = {
        let repository = repository.clone();
        tokio::spawn(async move { repository.compiled_rules().await.unwrap() })
    };

    source.started.notified().await;
    source.inner.insert(2, RuleFixtures::summary_contains_fail());
    repository.invalidate().await;
    source.release.notify_one();

    // The in-flight caller still gets its result
    let stale = reader.await.unwrap();
    assert!(!stale.is_empty());

    // ...but it was not stored, so the next read sees the save
    assert!(RuleCache::get(cache.as_ref(), COMPILED_RULES_KEY)
        .await
        .unwrap()
        .is_none());
    let fresh = repository.compiled_rules().await.unwrap();
    assert_eq!(fresh.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}
