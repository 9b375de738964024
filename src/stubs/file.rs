//! # 文件桩存储
//!
//! 每个上游一个 YAML 文档：`{root}/{identity}.yml`，内容为 `service: {path: record}`。
//! 写入在同一上游内串行化，并通过"临时文件 + rename"替换文档，
//! 读者不会看到写了一半的文件。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::identity::UpstreamIdentity;
use super::storage::{StubMap, StubRecord, StubStorage};
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

/// 持久化文档结构
#[derive(Debug, Default, Serialize, Deserialize)]
struct StubDocument {
    #[serde(default)]
    service: StubMap,
}

/// 文件桩存储
pub struct FileStubStorage {
    root: PathBuf,
    /// 每个上游一把写锁
    write_locks: DashMap<UpstreamIdentity, Arc<Mutex<()>>>,
}

impl FileStubStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: DashMap::new(),
        }
    }

    /// 上游对应的文档路径
    #[must_use]
    pub fn document_path(&self, identity: &UpstreamIdentity) -> PathBuf {
        self.root.join(format!("{}.yml", identity.file_stem()))
    }

    fn lock_for(&self, identity: &UpstreamIdentity) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 读取文档；文件不存在时返回 `Ok(None)`
    async fn read_document(&self, path: &Path) -> Result<Option<StubDocument>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ProxyError::backend_with_source(
                    format!("读取桩文件失败: {}", path.display()),
                    e,
                ));
            }
        };

        if content.trim().is_empty() {
            return Ok(Some(StubDocument::default()));
        }

        serde_yaml::from_str(&content).map(Some).map_err(|e| {
            ProxyError::backend_with_source(format!("桩文件内容无效: {}", path.display()), e)
        })
    }

    /// 先写临时文件再 rename，保证替换是原子的
    async fn write_document(&self, path: &Path, document: &StubDocument) -> Result<()> {
        let content = serde_yaml::to_string(document).map_err(|e| {
            ProxyError::backend_with_source(format!("序列化桩文件失败: {}", path.display()), e)
        })?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("stubs.yml");
        let tmp_path = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp_path, content).await {
            return Err(ProxyError::backend_with_source(
                format!("写入临时桩文件失败: {}", tmp_path.display()),
                e,
            ));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(ProxyError::backend_with_source(
                format!("替换桩文件失败: {}", path.display()),
                e,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StubStorage for FileStubStorage {
    async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            ProxyError::config_with_source(
                format!("无法创建桩存储目录: {}", self.root.display()),
                e,
            )
        })?;

        let metadata = tokio::fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(ProxyError::config(format!(
                "桩存储路径不是目录: {}",
                self.root.display()
            )));
        }

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::FileStorage,
            "file_storage_ready",
            &format!("文件桩存储就绪: {}", self.root.display())
        );
        Ok(())
    }

    async fn get_stub_map(&self, identity: &UpstreamIdentity) -> Result<StubMap> {
        let path = self.document_path(identity);
        match self.read_document(&path).await? {
            Some(document) => Ok(document.service),
            None => Err(ProxyError::not_found("stubs", identity.as_str())),
        }
    }

    async fn save_stub(
        &self,
        identity: &UpstreamIdentity,
        path: &str,
        record: StubRecord,
    ) -> Result<()> {
        let lock = self.lock_for(identity);
        let _guard = lock.lock().await;

        let document_path = self.document_path(identity);
        let mut document = match self.read_document(&document_path).await {
            Ok(Some(document)) => document,
            Ok(None) => StubDocument::default(),
            Err(e) => {
                // 内容损坏时从空文档重新开始
                lwarn!(
                    "system",
                    LogStage::Storage,
                    LogComponent::FileStorage,
                    "corrupt_document_reset",
                    &format!("桩文件无法解析，将以空文档覆盖: {e}")
                );
                StubDocument::default()
            }
        };

        document.service.insert(path.to_string(), record);
        self.write_document(&document_path, &document).await?;

        ldebug!(
            "system",
            LogStage::Storage,
            LogComponent::FileStorage,
            "stub_saved",
            &format!("桩已保存: identity={identity}, path={path}")
        );
        Ok(())
    }

    async fn remove_stub(&self, identity: &UpstreamIdentity, path: &str) -> Result<()> {
        let lock = self.lock_for(identity);
        let _guard = lock.lock().await;

        let document_path = self.document_path(identity);
        let mut document = self
            .read_document(&document_path)
            .await?
            .ok_or_else(|| ProxyError::not_found("stubs", identity.as_str()))?;

        if document.service.remove(path).is_none() {
            return Err(ProxyError::not_found("stub", path));
        }
        self.write_document(&document_path, &document).await?;

        ldebug!(
            "system",
            LogStage::Storage,
            LogComponent::FileStorage,
            "stub_removed",
            &format!("桩已删除: identity={identity}, path={path}")
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn identity() -> UpstreamIdentity {
        UpstreamIdentity::parse("http://upstream-a").unwrap()
    }

    async fn storage() -> (FileStubStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStubStorage::new(dir.path().join("stubs"));
        storage.initialize().await.unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_found() {
        let (storage, _dir) = storage().await;
        let err = storage.get_stub_map(&identity()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_save_then_read_round_trip() {
        let (storage, _dir) = storage().await;
        let record = StubRecord::new(201, "ok").with_header("X-Test", "1");

        storage.save_stub(&identity(), "/ping", record.clone()).await.unwrap();

        let map = storage.get_stub_map(&identity()).await.unwrap();
        assert_eq!(map.get("/ping"), Some(&record));
        assert!(storage.document_path(&identity()).ends_with("http_upstream-a_80.yml"));
    }

    #[tokio::test]
    async fn test_document_layout_is_service_map() {
        let (storage, _dir) = storage().await;
        storage
            .save_stub(&identity(), "/ping", StubRecord::new(200, "pong"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(storage.document_path(&identity())).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&content).unwrap();
        assert_eq!(value["service"]["/ping"]["code"], serde_yaml::Value::from(200));
        assert_eq!(value["service"]["/ping"]["data"], serde_yaml::Value::from("pong"));
    }

    #[tokio::test]
    async fn test_remove_missing_path_keeps_other_stubs() {
        let (storage, _dir) = storage().await;
        storage
            .save_stub(&identity(), "/keep", StubRecord::new(200, "kept"))
            .await
            .unwrap();

        let err = storage.remove_stub(&identity(), "/absent").await.unwrap_err();
        assert!(err.is_not_found());

        let map = storage.get_stub_map(&identity()).await.unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("/keep"));
    }

    #[tokio::test]
    async fn test_remove_for_unknown_identity_is_not_found() {
        let (storage, _dir) = storage().await;
        let err = storage.remove_stub(&identity(), "/ping").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_concurrent_saves_are_not_lost() {
        let (storage, _dir) = storage().await;
        let storage = Arc::new(storage);

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .save_stub(
                            &identity(),
                            &format!("/item/{i}"),
                            StubRecord::new(200, i.to_string()),
                        )
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let map = storage.get_stub_map(&identity()).await.unwrap();
        assert_eq!(map.len(), 20);
        assert_eq!(map["/item/7"].body, "7");
    }

    #[tokio::test]
    async fn test_corrupt_document_is_backend_error_and_reset_on_save() {
        let (storage, _dir) = storage().await;
        std::fs::write(storage.document_path(&identity()), "service: [unclosed").unwrap();

        let err = storage.get_stub_map(&identity()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Backend { .. }));

        storage
            .save_stub(&identity(), "/fresh", StubRecord::new(204, ""))
            .await
            .unwrap();
        let map = storage.get_stub_map(&identity()).await.unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["/fresh"]);
    }

    #[tokio::test]
    async fn test_initialize_rejects_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let err = FileStubStorage::new(&file).initialize().await.unwrap_err();
        assert!(matches!(err, ProxyError::Config { .. }));
    }
}
