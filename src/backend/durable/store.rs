//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块封装了持久化后端使用的 SQLite 存储，所有语句都通过 Sea-ORM 异步执行。

use crate::error::{CacheError, Result};
use futures::TryStreamExt;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement,
    StreamTrait, TransactionTrait, Value,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const BACKEND: DatabaseBackend = DatabaseBackend::Sqlite;

/// 元数据表中唯一的记录 ID
pub const META_RECORD_ID: &str = "default";

/// 命名空间与键之间的分隔符
pub const KEY_SEPARATOR: &str = "//";

const CREATE_ENTRIES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS cache_entries (
        key TEXT PRIMARY KEY NOT NULL,
        data BLOB NOT NULL
    )
"#;

const CREATE_META_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS cache_meta (
        id TEXT PRIMARY KEY NOT NULL,
        version TEXT NOT NULL,
        clean_up INTEGER NOT NULL DEFAULT 0
    )
"#;

/// 版本元数据记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    /// 写入数据时的应用版本
    pub version: String,
    /// 清理进行中标记，清理被打断时下次打开会继续清理
    pub clean_up: bool,
}

/// 拼接持久化记录的完整键
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{}{}{}", namespace, KEY_SEPARATOR, key)
}

/// SQLite 缓存存储
pub struct CacheStore {
    db: DatabaseConnection,
}

impl CacheStore {
    /// 连接数据库
    ///
    /// 文件数据库的父目录不存在时会自动创建；缺少 `mode` 参数时补上 `mode=rwc`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = prepare_database_url(database_url)?;

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(1)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let db = Database::connect(opt)
            .await
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;

        Ok(Self { db })
    }

    /// 能力探测，确认底层存储能正常应答
    pub async fn probe(&self) -> Result<String> {
        let row = self
            .db
            .query_one(Statement::from_string(
                BACKEND,
                "SELECT sqlite_version() AS v".to_string(),
            ))
            .await?
            .ok_or_else(|| CacheError::DatabaseError("sqlite_version() returned no row".into()))?;
        Ok(row.try_get("", "v")?)
    }

    /// 创建元数据表
    pub async fn ensure_meta_schema(&self) -> Result<()> {
        self.execute(CREATE_META_SQL).await
    }

    /// 创建缓存条目表
    pub async fn ensure_entry_schema(&self) -> Result<()> {
        self.execute(CREATE_ENTRIES_SQL).await
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.db
            .execute(Statement::from_string(BACKEND, sql.to_string()))
            .await?;
        Ok(())
    }

    pub async fn get_meta(&self) -> Result<Option<MetaRecord>> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                BACKEND,
                "SELECT version, clean_up FROM cache_meta WHERE id = ?1".to_string(),
                vec![Value::String(Some(Box::new(META_RECORD_ID.to_string())))],
            ))
            .await?;

        match row {
            Some(row) => {
                let version: String = row.try_get("", "version")?;
                let clean_up: i64 = row.try_get("", "clean_up")?;
                Ok(Some(MetaRecord {
                    version,
                    clean_up: clean_up != 0,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn put_meta(&self, meta: &MetaRecord) -> Result<()> {
        self.db
            .execute(Statement::from_sql_and_values(
                BACKEND,
                r#"
                INSERT INTO cache_meta (id, version, clean_up) VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET version = excluded.version, clean_up = excluded.clean_up
                "#
                .to_string(),
                vec![
                    Value::String(Some(Box::new(META_RECORD_ID.to_string()))),
                    Value::String(Some(Box::new(meta.version.clone()))),
                    Value::BigInt(Some(meta.clean_up as i64)),
                ],
            ))
            .await?;
        Ok(())
    }

    /// 读取一条记录的原始字节
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                BACKEND,
                "SELECT data FROM cache_entries WHERE key = ?1".to_string(),
                vec![Value::String(Some(Box::new(key.to_string())))],
            ))
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("", "data")?)),
            None => Ok(None),
        }
    }

    /// 在同一个事务中写入一批记录
    pub async fn put_batch(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await?;
        for (key, data) in entries {
            txn.execute(Statement::from_sql_and_values(
                BACKEND,
                r#"
                INSERT INTO cache_entries (key, data) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET data = excluded.data
                "#
                .to_string(),
                vec![
                    Value::String(Some(Box::new(key.clone()))),
                    Value::Bytes(Some(Box::new(data.clone()))),
                ],
            ))
            .await?;
        }
        txn.commit().await?;

        debug!("cache store put_batch: {} entries committed", entries.len());
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.db
            .execute(Statement::from_sql_and_values(
                BACKEND,
                "DELETE FROM cache_entries WHERE key = ?1".to_string(),
                vec![Value::String(Some(Box::new(key.to_string())))],
            ))
            .await?;
        Ok(())
    }

    /// 删除以指定前缀开头的所有记录
    ///
    /// 使用 substr 比较而不是 LIKE，命名空间里的 `_` 与 `%` 不会被当成通配符
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                BACKEND,
                "DELETE FROM cache_entries WHERE substr(key, 1, ?1) = ?2".to_string(),
                prefix_values(prefix),
            ))
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let result = self
            .db
            .execute(Statement::from_string(
                BACKEND,
                "DELETE FROM cache_entries".to_string(),
            ))
            .await?;
        Ok(result.rows_affected())
    }

    /// 以游标方式遍历前缀下的所有键，返回去掉前缀后的键
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let stream = self
            .db
            .stream(Statement::from_sql_and_values(
                BACKEND,
                "SELECT key FROM cache_entries WHERE substr(key, 1, ?1) = ?2 ORDER BY key"
                    .to_string(),
                prefix_values(prefix),
            ))
            .await?;
        futures::pin_mut!(stream);

        let mut keys = Vec::new();
        while let Some(row) = stream.try_next().await? {
            let key: String = row.try_get("", "key")?;
            if let Some(stripped) = key.strip_prefix(prefix) {
                keys.push(stripped.to_string());
            }
        }
        Ok(keys)
    }

    pub async fn count(&self) -> Result<u64> {
        let row = self
            .db
            .query_one(Statement::from_string(
                BACKEND,
                "SELECT COUNT(*) AS n FROM cache_entries".to_string(),
            ))
            .await?;
        let n: i64 = match row {
            Some(row) => row.try_get("", "n")?,
            None => 0,
        };
        Ok(n as u64)
    }

    /// 列出存储中出现过的所有命名空间
    pub async fn namespaces(&self) -> Result<Vec<String>> {
        let rows = self
            .db
            .query_all(Statement::from_string(
                BACKEND,
                r#"
                SELECT DISTINCT substr(key, 1, instr(key, '//') - 1) AS ns
                FROM cache_entries
                WHERE instr(key, '//') > 0
                ORDER BY ns
                "#
                .to_string(),
            ))
            .await?;

        let mut namespaces = Vec::with_capacity(rows.len());
        for row in rows {
            namespaces.push(row.try_get("", "ns")?);
        }
        Ok(namespaces)
    }
}

fn prefix_values(prefix: &str) -> Vec<Value> {
    vec![
        Value::BigInt(Some(prefix.chars().count() as i64)),
        Value::String(Some(Box::new(prefix.to_string()))),
    ]
}

/// 规范化连接字符串并确保数据库目录存在
fn prepare_database_url(database_url: &str) -> Result<String> {
    if database_url.contains(":memory:") {
        return Ok(database_url.to_string());
    }

    if let Some(path) = sqlite_file_path(database_url) {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CacheError::DatabaseError(format!(
                        "无法创建数据库目录 {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
    }

    if database_url.contains("mode=") {
        Ok(database_url.to_string())
    } else if database_url.contains('?') {
        Ok(format!("{}&mode=rwc", database_url))
    } else {
        Ok(format!("{}?mode=rwc", database_url))
    }
}

/// 从 SQLite 连接字符串中提取文件路径
fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}
