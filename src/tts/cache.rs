//! Модуль для кэширования результатов TTS
//!
//! Ключ - md5 от провайдера, голоса, модели и текста. Кэшем пользуются
//! параллельные запуски, поэтому файл сначала пишется во временный файл
//! в той же директории и только потом переименовывается в `<ключ>.mp3`:
//! по пути ключа всегда лежит либо ничего, либо файл целиком.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use crate::config::NarrationConfig;
use crate::error::{NarrationError, Result};

/// Расширение готовых файлов кэша; всё остальное в директории не трогаем
const CACHE_EXTENSION: &str = "mp3";

type CacheIndex = Arc<Mutex<HashMap<String, PathBuf>>>;

/// Структура для управления кэшем
pub struct TtsCache {
    /// Директория для кэша
    cache_dir: PathBuf,
    /// Максимальный размер кэша в байтах
    max_size: Option<u64>,
    /// Ключ -> путь к закэшированному файлу
    index: CacheIndex,
}

impl TtsCache {
    /// Создать кэш по настройкам
    pub fn new(config: &NarrationConfig) -> Result<Self> {
        let cache_dir = match &config.cache_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join("narration-sync-cache"),
        };
        Self::with_dir(cache_dir, config.max_cache_size)
    }

    /// Создать кэш в указанной директории
    pub fn with_dir(cache_dir: impl Into<PathBuf>, max_size: Option<u64>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }
        info!("Using TTS cache at {}", cache_dir.display());

        Ok(Self {
            cache_dir,
            max_size,
            index: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Генерировать ключ для кэша
    pub fn key(provider: &str, voice: &str, model: &str, text: &str) -> String {
        let mut hasher = md5::Context::new();
        for part in [provider, voice, model, text] {
            hasher.consume(part.as_bytes());
            // Разделитель, чтобы ("ab", "c") и ("a", "bc") не совпадали
            hasher.consume([0u8]);
        }
        format!("{:x}", hasher.compute())
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", key, CACHE_EXTENSION))
    }

    /// Путь к закэшированному файлу, если он есть.
    /// Файлы от прошлых запусков подхватываются с диска.
    pub async fn get(&self, key: &str) -> Option<PathBuf> {
        let known = self.index.lock().get(key).cloned();
        let path = known.unwrap_or_else(|| self.file_for(key));

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                self.index.lock().insert(key.to_string(), path.clone());
                Some(path)
            }
            _ => {
                self.index.lock().remove(key);
                None
            }
        }
    }

    /// Добавить файл в кэш
    pub async fn store(&self, key: &str, file: &Path) -> Result<PathBuf> {
        let cache_dir = self.cache_dir.clone();
        let cache_file = self.file_for(key);
        let source = file.to_path_buf();
        let max_size = self.max_size;
        let index = self.index.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            write_atomically(&cache_dir, &source, &cache_file)?;
            debug!("Cached {} as {}", source.display(), cache_file.display());

            index.lock().insert(key, cache_file.clone());
            if let Some(max_size) = max_size {
                evict_oldest(&cache_dir, max_size, &index)?;
            }
            Ok(cache_file)
        })
        .await
        .map_err(|e| NarrationError::Other(format!("Cache task failed: {}", e)))?
    }
}

/// Скопировать `source` во временный файл рядом с `target` и переименовать
fn write_atomically(cache_dir: &Path, source: &Path, target: &Path) -> Result<()> {
    let mut temp = NamedTempFile::new_in(cache_dir)?;
    let mut input = fs::File::open(source)?;
    std::io::copy(&mut input, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Удалять самые старые файлы, пока кэш не уложится в `max_size`
fn evict_oldest(cache_dir: &Path, max_size: u64, index: &CacheIndex) -> Result<()> {
    let mut total_size = 0;
    let mut files = Vec::new();
    for entry in fs::read_dir(cache_dir)? {
        let entry = entry?;
        let path = entry.path();
        // Временные файлы других запусков ещё пишутся
        if !entry.file_type()?.is_file() || path.extension().map_or(true, |ext| ext != CACHE_EXTENSION) {
            continue;
        }
        let metadata = entry.metadata()?;
        total_size += metadata.len();
        files.push((path, metadata.modified()?, metadata.len()));
    }

    if total_size <= max_size {
        return Ok(());
    }

    // От старых к новым
    files.sort_by(|a, b| a.1.cmp(&b.1));

    for (path, _, len) in files {
        if total_size <= max_size {
            break;
        }
        match fs::remove_file(&path) {
            Ok(()) => {}
            // Уже удалён параллельным запуском
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        total_size -= len;
        index.lock().retain(|_, cached| cached != &path);
        debug!("Evicted {} from TTS cache", path.display());
    }
    Ok(())
}
