//! Модуль для кэширования результатов TTS
//!
//! Ключ кэша — md5 канонического JSON нормализованных параметров, поэтому
//! логически одинаковые запросы попадают в одну запись. Хранилище подключаемое.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::error::{EdgeVoiceError, Result};
use crate::task::TaskResult;
use crate::text::NormalizedParams;
use crate::utils::files::{read_json, write_json};

/// Закэшированный артефакт
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedArtifact {
    /// URL аудио
    pub audio: String,
    /// URL субтитров
    pub srt: String,
    /// Имя аудиофайла в директории артефактов
    pub file: String,
    /// Имя файла субтитров
    pub srt_file: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl CachedArtifact {
    pub fn into_result(self) -> TaskResult {
        TaskResult {
            audio: self.audio,
            srt: self.srt,
            file: self.file,
            srt_file: self.srt_file,
            partial: false,
            size: self.size,
        }
    }
}

impl TryFrom<&TaskResult> for CachedArtifact {
    type Error = EdgeVoiceError;

    /// Частичный результат в кэш не попадает
    fn try_from(result: &TaskResult) -> Result<Self> {
        if result.partial {
            return Err(EdgeVoiceError::Cache("partial results are never cached".to_string()));
        }
        Ok(Self {
            audio: result.audio.clone(),
            srt: result.srt.clone(),
            file: result.file.clone(),
            srt_file: result.srt_file.clone(),
            size: result.size,
        })
    }
}

/// Канонический JSON: ключи в алфавитном порядке
fn canonical_json(params: &NormalizedParams) -> String {
    let canonical: BTreeMap<&str, &str> = [
        ("pitch", params.pitch.as_str()),
        ("rate", params.rate.as_str()),
        ("text", params.text.as_str()),
        ("voice", params.voice.as_str()),
        ("volume", params.volume.as_str()),
    ]
    .into_iter()
    .collect();
    serde_json::to_string(&canonical).unwrap_or_default()
}

/// Хранилище записей кэша
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Result<Option<CachedArtifact>>;
    async fn put(&self, fingerprint: &str, artifact: &CachedArtifact) -> Result<()>;
}

/// Хранилище в памяти процесса
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CachedArtifact>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<CachedArtifact>> {
        Ok(self.entries.read().get(fingerprint).cloned())
    }

    async fn put(&self, fingerprint: &str, artifact: &CachedArtifact) -> Result<()> {
        self.entries.write().insert(fingerprint.to_string(), artifact.clone());
        Ok(())
    }
}

/// Хранилище на диске: по JSON-файлу на отпечаток
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    cache_dir: PathBuf,
}

impl DiskCacheStore {
    /// Создать хранилище, при необходимости создав директорию
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            std::fs::create_dir_all(&cache_dir)?;
        }
        Ok(Self { cache_dir })
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", fingerprint))
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<CachedArtifact>> {
        let path = self.entry_path(fingerprint);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        read_json(&path)
            .await
            .map(Some)
            .map_err(|e| EdgeVoiceError::Cache(format!("cannot read {}: {}", path.display(), e)))
    }

    async fn put(&self, fingerprint: &str, artifact: &CachedArtifact) -> Result<()> {
        let path = self.entry_path(fingerprint);
        write_json(&path, artifact)
            .await
            .map_err(|e| EdgeVoiceError::Cache(format!("cannot write {}: {}", path.display(), e)))
    }
}

/// Кэш результатов синтеза
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    /// Отпечаток нормализованных параметров
    pub fn fingerprint(params: &NormalizedParams) -> String {
        format!("{:x}", md5::compute(canonical_json(params).as_bytes()))
    }

    /// Отпечаток отдельного сегмента потокового режима
    ///
    /// Записи сегментов лежат в своем пространстве ключей и не отдаются
    /// как результат целого запроса.
    pub fn segment_fingerprint(params: &NormalizedParams) -> String {
        let mut context = md5::Context::new();
        context.consume(b"segment:");
        context.consume(canonical_json(params).as_bytes());
        format!("{:x}", context.compute())
    }

    /// Найти запись
    ///
    /// Ошибка хранилища считается промахом. Запись, чей аудиофайл пропал
    /// из `audio_dir`, тоже считается промахом.
    pub async fn get(&self, fingerprint: &str, audio_dir: &Path) -> Option<CachedArtifact> {
        match self.store.get(fingerprint).await {
            Ok(Some(artifact)) => {
                if tokio::fs::try_exists(audio_dir.join(&artifact.file)).await.unwrap_or(false) {
                    log::debug!("Cache hit for {}", fingerprint);
                    Some(artifact)
                } else {
                    log::debug!("Cache entry {} points to a missing file", fingerprint);
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Cache lookup failed for {}: {}", fingerprint, e);
                None
            }
        }
    }

    /// Записать результат; повторная запись молча перезаписывает
    pub async fn put(&self, fingerprint: &str, artifact: &CachedArtifact) -> Result<()> {
        self.store.put(fingerprint, artifact).await?;
        log::debug!("Cached {} -> {}", fingerprint, artifact.file);
        Ok(())
    }

    /// Записать итог задачи, если он полный
    pub async fn put_result(&self, fingerprint: &str, result: &TaskResult) {
        let artifact = match CachedArtifact::try_from(result) {
            Ok(artifact) => artifact,
            Err(_) => {
                log::debug!("Skipping cache write for partial result {}", result.file);
                return;
            }
        };
        if let Err(e) = self.put(fingerprint, &artifact).await {
            log::warn!("Failed to cache result {}: {}", fingerprint, e);
        }
    }
}
