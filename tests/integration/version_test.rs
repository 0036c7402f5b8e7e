//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 版本戳测试：应用版本变化时清空持久化数据

#[path = "../common/mod.rs"]
mod common;

use appcache::backend::durable::{CacheStore, MetaRecord};
use appcache::backend::{memory, StorageBackend};
use appcache::{CacheManager, RuntimeOverrides};
use common::{alice, setup_manager, temp_database, test_config};
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, Statement};
use serde_json::json;

/// 在旧版本下写入两个命名空间的数据
async fn seed(url: &str, version: &str) {
    let manager = setup_manager(test_config(url, version), alice()).await;
    let mail = manager.simple_cache("mail", true).unwrap();
    let contacts = manager.get_cache("contacts", true, None).unwrap();
    mail.add("1", json!("m"), None).await.unwrap();
    contacts
        .add(&json!({"folder_id": 6, "id": 1, "name": "c"}), None)
        .await
        .unwrap();
    manager.shutdown().await.unwrap();
}

async fn meta(url: &str) -> Option<MetaRecord> {
    let store = CacheStore::connect(url).await.unwrap();
    store.get_meta().await.unwrap()
}

#[tokio::test]
async fn test_first_open_stamps_version() {
    let db = temp_database();
    let manager = setup_manager(test_config(&db.url, "1.0.0"), alice()).await;
    manager.shutdown().await.unwrap();

    assert_eq!(
        meta(&db.url).await,
        Some(MetaRecord {
            version: "1.0.0".to_string(),
            clean_up: false,
        })
    );
}

#[tokio::test]
async fn test_same_version_keeps_data() {
    let db = temp_database();
    seed(&db.url, "1.0.0").await;

    let manager = setup_manager(test_config(&db.url, "1.0.0"), alice()).await;
    let mail = manager.simple_cache("mail", true).unwrap();
    assert_eq!(mail.get("1").await.unwrap(), Some(json!("m")));
}

/// 版本变化且在线时所有命名空间被清空
#[tokio::test]
async fn test_version_change_wipes_every_namespace() {
    let db = temp_database();
    seed(&db.url, "1.0.0").await;

    let manager = setup_manager(test_config(&db.url, "2.0.0"), alice()).await;
    assert!(manager.durable_backend().store().is_some());

    let mail = manager.simple_cache("mail", true).unwrap();
    let contacts = manager.get_cache("contacts", true, None).unwrap();
    assert!(mail.keys().await.unwrap().is_empty());
    assert!(contacts.keys().await.unwrap().is_empty());
    assert_eq!(contacts.get(&json!("6.1")).await.unwrap(), None);

    let store = manager.durable_backend().store().unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(
        store.get_meta().await.unwrap(),
        Some(MetaRecord {
            version: "2.0.0".to_string(),
            clean_up: false,
        })
    );
}

/// 离线时不清空
#[tokio::test]
async fn test_offline_version_change_keeps_data() {
    let db = temp_database();
    seed(&db.url, "1.0.0").await;

    let mut config = test_config(&db.url, "2.0.0");
    config.app.online = false;
    let manager = setup_manager(config, alice()).await;

    let mail = manager.simple_cache("mail", true).unwrap();
    assert_eq!(mail.get("1").await.unwrap(), Some(json!("m")));
    let store = manager.durable_backend().store().unwrap();
    assert_eq!(store.get_meta().await.unwrap().unwrap().version, "1.0.0");
}

/// 保留数据的覆盖开关阻止清空
#[tokio::test]
async fn test_keep_data_override_suppresses_wipe() {
    let db = temp_database();
    seed(&db.url, "1.0.0").await;

    let overrides = RuntimeOverrides {
        keep_data: true,
        ..RuntimeOverrides::default()
    };
    let manager = CacheManager::new(test_config(&db.url, "2.0.0"), alice(), overrides)
        .await
        .unwrap();

    let mail = manager.simple_cache("mail", true).unwrap();
    assert_eq!(mail.get("1").await.unwrap(), Some(json!("m")));
    assert_eq!(
        manager.durable_backend().store().unwrap().count().await.unwrap(),
        2
    );
}

/// 上次清理被打断时，下次打开会完成清理
#[tokio::test]
async fn test_interrupted_wipe_is_completed() {
    let db = temp_database();
    seed(&db.url, "1.0.0").await;

    {
        let store = CacheStore::connect(&db.url).await.unwrap();
        store
            .put_meta(&MetaRecord {
                version: "1.0.0".to_string(),
                clean_up: true,
            })
            .await
            .unwrap();
    }

    let manager = setup_manager(test_config(&db.url, "1.0.0"), alice()).await;
    let store = manager.durable_backend().store().unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(
        store.get_meta().await.unwrap(),
        Some(MetaRecord {
            version: "1.0.0".to_string(),
            clean_up: false,
        })
    );
}

/// 清空所有后端（注销）
#[tokio::test]
async fn test_clear_all_wipes_live_instances() {
    let db = temp_database();
    let manager = setup_manager(test_config(&db.url, "1.0.0"), alice()).await;
    let durable = manager.simple_cache("mail", true).unwrap();
    let transient = manager.simple_cache("drafts", false).unwrap();

    durable.add("flushed", json!(1), None).await.unwrap();
    manager.flush().await.unwrap();
    durable.add("pending", json!(2), None).await.unwrap();
    transient.add("t", json!(3), None).await.unwrap();

    manager.clear_all().await.unwrap();

    assert!(durable.keys().await.unwrap().is_empty());
    assert!(transient.keys().await.unwrap().is_empty());
    manager.flush().await.unwrap();
    assert_eq!(
        manager.durable_backend().store().unwrap().count().await.unwrap(),
        0
    );
}

/// 版本变化时清理失败，后端不可用，缓存退化为临时存储
#[tokio::test]
async fn test_failed_wipe_makes_backend_defunct() {
    let db = temp_database();
    seed(&db.url, "1.0.0").await;

    {
        let conn = Database::connect(db.url.as_str()).await.unwrap();
        for sql in [
            "DROP TABLE cache_entries",
            "CREATE VIEW cache_entries AS SELECT 'k' AS key, x'00' AS data",
        ] {
            conn.execute(Statement::from_string(DatabaseBackend::Sqlite, sql.to_string()))
                .await
                .unwrap();
        }
        conn.close().await.unwrap();
    }

    let manager = setup_manager(test_config(&db.url, "2.0.0"), alice()).await;
    assert!(!manager.durable_backend().is_usable());

    let mail = manager.simple_cache("mail", true).unwrap();
    assert_eq!(mail.storage().backend_id(), memory::BACKEND_ID);
    mail.add("1", json!(1), None).await.unwrap();
    assert_eq!(mail.get("1").await.unwrap(), Some(json!(1)));
}
