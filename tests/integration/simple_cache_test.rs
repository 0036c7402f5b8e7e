//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 值缓存测试

#[path = "../common/mod.rs"]
mod common;

use appcache::{CacheError, Lookup, Pattern};
use common::default_manager;
use regex::Regex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_empty_name_is_rejected() {
    let (_db, manager) = default_manager().await;
    assert!(matches!(
        manager.simple_cache("", true),
        Err(CacheError::ConfigError(_))
    ));
    assert!(manager.get_cache("", false, None).is_err());
}

/// 时间戳单调：旧数据不会覆盖新数据
#[tokio::test]
async fn test_timestamp_monotonicity() {
    let (_db, manager) = default_manager().await;
    for persistent in [true, false] {
        let cache = manager.simple_cache("settings", persistent).unwrap();

        let stored = cache.add("theme", json!("dark"), Some(200)).await.unwrap();
        assert_eq!(stored, json!("dark"));

        let stored = cache.add("theme", json!("light"), Some(100)).await.unwrap();
        assert_eq!(stored, json!("dark"));
        assert_eq!(cache.get("theme").await.unwrap(), Some(json!("dark")));
        assert_eq!(cache.time("theme").await.unwrap(), 200);

        let stored = cache.add("theme", json!("blue"), Some(300)).await.unwrap();
        assert_eq!(stored, json!("blue"));
        assert_eq!(cache.time("theme").await.unwrap(), 300);
    }
}

#[tokio::test]
async fn test_default_timestamp_is_now() {
    let (_db, manager) = default_manager().await;
    let cache = manager.simple_cache("settings", true).unwrap();
    let before = chrono::Utc::now().timestamp_millis();
    cache.add("k", json!(1), None).await.unwrap();
    let time = cache.time("k").await.unwrap();
    assert!(time >= before);
    assert!(time <= chrono::Utc::now().timestamp_millis());
}

#[tokio::test]
async fn test_read_through_handler_sees_cached_value() {
    let (_db, manager) = default_manager().await;
    let cache = manager.simple_cache("folders", true).unwrap();
    cache.add("1", json!({"title": "Inbox"}), None).await.unwrap();

    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let fetched = Arc::new(AtomicBool::new(false));
    let flag = fetched.clone();
    let lookup = Lookup::new()
        .getter(move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(None)
        })
        .read_through(move |v| *sink.lock().unwrap() = Some(v.clone()));

    let value = cache.get_with("1", lookup).await.unwrap();
    assert_eq!(value, Some(json!({"title": "Inbox"})));
    assert_eq!(*seen.lock().unwrap(), Some(json!({"title": "Inbox"})));
    assert!(!fetched.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_getter_on_miss() {
    let (_db, manager) = default_manager().await;
    let cache = manager.simple_cache("folders", true).unwrap();

    assert_eq!(cache.get("1").await.unwrap(), None);

    let lookup = Lookup::new().getter(|| async { Ok(Some(json!("from server"))) });
    assert_eq!(
        cache.get_with("1", lookup).await.unwrap(),
        Some(json!("from server"))
    );
    assert_eq!(cache.get("1").await.unwrap(), None);

    let failing = Lookup::new().getter(|| async {
        Err(CacheError::GetterError("503".to_string()))
    });
    assert!(cache.get_with("1", failing).await.is_err());
}

#[tokio::test]
async fn test_remove_and_remove_many() {
    let (_db, manager) = default_manager().await;
    let cache = manager.simple_cache("mail", true).unwrap();
    for key in ["a", "b", "c"] {
        cache.add(key, json!(key), None).await.unwrap();
    }

    cache.remove("missing").await.unwrap();
    cache.remove("a").await.unwrap();
    cache.remove_many(&["b", "missing"]).await.unwrap();
    assert_eq!(cache.keys().await.unwrap(), vec!["c".to_string()]);
}

#[tokio::test]
async fn test_grep_with_literal_and_regex() {
    let (_db, manager) = default_manager().await;
    let cache = manager.simple_cache("mail", true).unwrap();
    for key in ["default0/INBOX.1", "default0/INBOX.2", "default0/Sent.1", "default0xINBOX.3"] {
        cache.add(key, json!(key), None).await.unwrap();
    }

    let mut inbox = cache.grep_keys("default0/INBOX.").await.unwrap();
    inbox.sort();
    assert_eq!(inbox, vec!["default0/INBOX.1", "default0/INBOX.2"]);

    let pattern = Pattern::Regex(Regex::new(r"\.1$").unwrap());
    assert_eq!(cache.grep_remove(pattern).await.unwrap(), 2);

    let mut left = cache.keys().await.unwrap();
    left.sort();
    assert_eq!(left, vec!["default0/INBOX.2", "default0xINBOX.3"]);
}

#[tokio::test]
async fn test_values_size_and_clear() {
    let (_db, manager) = default_manager().await;
    let cache = manager.simple_cache("contacts", false).unwrap();
    cache.add("1", json!({"name": "a"}), None).await.unwrap();
    cache.add("2", json!({"name": "b"}), None).await.unwrap();

    let mut names: Vec<String> = cache
        .values()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(cache.size().await.unwrap(), 2);

    cache.clear().await.unwrap();
    assert_eq!(cache.size().await.unwrap(), 0);
    assert!(cache.values().await.unwrap().is_empty());
}
