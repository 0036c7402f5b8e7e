//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存路由测试：持久化策略、运行时覆盖、后端降级与保留缓存

#[path = "../common/mod.rs"]
mod common;

use appcache::backend::{durable, memory, StorageBackend};
use appcache::{CacheError, CacheManager, RuntimeOverrides, Session};
use common::{alice, setup_manager, temp_database, test_config};
use serde_json::json;

#[tokio::test]
async fn test_namespace_includes_session() {
    let db = temp_database();
    let manager = setup_manager(test_config(&db.url, "1.0.0"), alice()).await;
    let cache = manager.simple_cache("mail", true).unwrap();
    assert_eq!(cache.storage().name(), "mail.index");
    assert_eq!(cache.storage().namespace(), "appcache.alice.en_US.mail.index");
}

/// 命名空间的各段不能包含持久化键的分隔符
#[tokio::test]
async fn test_separator_in_namespace_segment_is_rejected() {
    let db = temp_database();
    let manager = setup_manager(test_config(&db.url, "1.0.0"), alice()).await;
    assert!(matches!(
        manager.simple_cache("mail.index//x", true),
        Err(CacheError::ConfigError(_))
    ));
    assert!(manager.get_cache("a//b", false, None).is_err());
    manager.shutdown().await.unwrap();

    let bob = Session::new("bob//x", "de_DE");
    let manager = setup_manager(test_config(&db.url, "1.0.0"), bob).await;
    assert!(matches!(
        manager.simple_cache("mail", true),
        Err(CacheError::ConfigError(_))
    ));
}

#[tokio::test]
async fn test_persistent_request_routes_to_durable() {
    let db = temp_database();
    let manager = setup_manager(test_config(&db.url, "1.0.0"), alice()).await;
    assert_eq!(manager.registry().preferred_id(), Some(durable::BACKEND_ID));

    let persistent = manager.simple_cache("mail", true).unwrap();
    let fluent = manager.simple_cache("mail", false).unwrap();
    assert_eq!(persistent.storage().backend_id(), durable::BACKEND_ID);
    assert_eq!(fluent.storage().backend_id(), memory::BACKEND_ID);

    // 同名缓存在两个后端中互不可见
    persistent.add("k", json!("durable"), None).await.unwrap();
    assert_eq!(fluent.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_anonymous_session_is_transient() {
    let db = temp_database();
    let manager = setup_manager(test_config(&db.url, "1.0.0"), Session::default()).await;
    let cache = manager.simple_cache("mail", true).unwrap();
    assert_eq!(cache.storage().backend_id(), memory::BACKEND_ID);
    assert_eq!(cache.storage().namespace(), "appcache.mail.index");
}

/// 运行时切换持久化策略后重新选择后端
#[tokio::test]
async fn test_policy_switch_reroutes() {
    let db = temp_database();
    let manager = setup_manager(test_config(&db.url, "1.0.0"), alice()).await;
    let cache = manager.simple_cache("mail", true).unwrap();

    cache.add("k", json!("durable"), None).await.unwrap();

    manager.set_persistence_enabled(false);
    assert!(!manager.persistence_enabled());
    assert_eq!(cache.storage().backend_id(), memory::BACKEND_ID);
    assert_eq!(cache.get("k").await.unwrap(), None);
    cache.add("k", json!("transient"), None).await.unwrap();

    manager.set_persistence_enabled(true);
    assert_eq!(cache.storage().backend_id(), durable::BACKEND_ID);
    assert_eq!(cache.get("k").await.unwrap(), Some(json!("durable")));
}

#[tokio::test]
async fn test_policy_disabled_by_config() {
    let db = temp_database();
    let mut config = test_config(&db.url, "1.0.0");
    config.persistence.enabled = false;
    let manager = setup_manager(config, alice()).await;
    let cache = manager.simple_cache("mail", true).unwrap();
    assert_eq!(cache.storage().backend_id(), memory::BACKEND_ID);
}

#[tokio::test]
async fn test_override_disables_persistence() {
    let db = temp_database();
    let overrides = RuntimeOverrides {
        disable_persistence: true,
        ..RuntimeOverrides::default()
    };
    let manager = CacheManager::new(test_config(&db.url, "1.0.0"), alice(), overrides)
        .await
        .unwrap();

    let cache = manager.simple_cache("mail", true).unwrap();
    assert_eq!(cache.storage().backend_id(), memory::BACKEND_ID);

    // 策略开关无法绕过覆盖开关
    manager.set_persistence_enabled(true);
    assert_eq!(cache.storage().backend_id(), memory::BACKEND_ID);
}

#[tokio::test]
async fn test_override_forces_backend() {
    let db = temp_database();
    let overrides = RuntimeOverrides {
        force_backend: Some(memory::BACKEND_ID.to_string()),
        ..RuntimeOverrides::default()
    };
    let manager = CacheManager::new(test_config(&db.url, "1.0.0"), alice(), overrides)
        .await
        .unwrap();

    assert_eq!(manager.registry().preferred_id(), Some(memory::BACKEND_ID));
    let cache = manager.simple_cache("mail", true).unwrap();
    assert_eq!(cache.storage().backend_id(), memory::BACKEND_ID);
}

#[tokio::test]
async fn test_unknown_backend_option_is_an_error() {
    let db = temp_database();
    let manager = setup_manager(test_config(&db.url, "1.0.0"), alice()).await;
    let options = appcache::StorageOptions {
        persistent: Some("indexeddb".to_string()),
        fluent: None,
    };
    let result = appcache::SimpleCache::with_options(
        manager.context().clone(),
        "mail",
        true,
        options,
    );
    assert!(matches!(result, Err(appcache::CacheError::UnknownBackend(_))));
}

/// 持久化存储打不开时退化为临时存储
#[tokio::test]
async fn test_defunct_backend_degrades_to_transient() {
    let db = temp_database();
    let blocker = db.dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let url = format!("sqlite://{}/cache.db", blocker.display());

    let manager = setup_manager(test_config(&url, "1.0.0"), alice()).await;
    assert!(!manager.durable_backend().is_usable());
    assert!(manager.durable_backend().store().is_none());
    assert_eq!(manager.registry().preferred_id(), None);

    let cache = manager.get_cache("mail", true, None).unwrap();
    assert_eq!(cache.simple().storage().backend_id(), memory::BACKEND_ID);

    let keys = cache.add(&json!({"folder_id": 1, "id": 2}), None).await.unwrap();
    assert_eq!(keys, vec!["1.2".to_string()]);
    assert!(cache.get(&json!("1.2")).await.unwrap().is_some());
}

/// 保留缓存无视持久化策略
#[tokio::test]
async fn test_reserved_cache_uses_rescue_backend() {
    let db = temp_database();
    let mut config = test_config(&db.url, "1.0.0");
    config.persistence.enabled = false;
    let manager = setup_manager(config, Session::default()).await;

    let reserved = manager.simple_cache("app-cache", false).unwrap();
    assert_eq!(reserved.storage().name(), "app-cache.index");
    assert_eq!(reserved.storage().backend_id(), durable::BACKEND_ID);

    let regular = manager.simple_cache("app-cache-extra", true).unwrap();
    assert_eq!(regular.storage().backend_id(), memory::BACKEND_ID);
}

/// 后端不可用时保留缓存按普通规则路由
#[tokio::test]
async fn test_reserved_cache_without_usable_rescue_backend() {
    let db = temp_database();
    let blocker = db.dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    let url = format!("sqlite://{}/cache.db", blocker.display());

    let manager = setup_manager(test_config(&url, "1.0.0"), alice()).await;
    let reserved = manager.simple_cache("app-cache", true).unwrap();
    assert_eq!(reserved.storage().backend_id(), memory::BACKEND_ID);
    reserved.add("k", json!(1), None).await.unwrap();
    assert_eq!(reserved.get("k").await.unwrap(), Some(json!(1)));
}
