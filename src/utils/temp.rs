//! Модуль для работы с временными файлами
//!
//! Каждый запуск владеет своей временной директорией. После успешного
//! завершения она удаляется, при ошибке остаётся на диске для разбора.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use crate::error::Result;

/// Временная директория одного запуска
pub struct RunWorkspace {
    /// Временная директория
    temp_dir: Option<TempDir>,
    /// Нужно ли удалять файлы при успешном завершении
    cleanup: bool,
}

impl RunWorkspace {
    /// Создать новую временную директорию
    pub fn new(cleanup: bool) -> Result<Self> {
        let temp_dir = tempfile::Builder::new().prefix("narration-sync-").tempdir()?;
        debug!("Created run workspace {}", temp_dir.path().display());

        Ok(Self {
            temp_dir: Some(temp_dir),
            cleanup,
        })
    }

    /// Путь к временной директории
    pub fn path(&self) -> &Path {
        self.temp_dir
            .as_ref()
            .map(|dir| dir.path())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Уникальный путь для нового файла (сам файл не создаётся)
    pub fn file(&self, prefix: &str, extension: &str) -> PathBuf {
        let file_name = format!("{}_{}.{}", prefix, uuid::Uuid::new_v4(), extension);
        self.path().join(file_name)
    }

    /// Запуск завершился успешно
    pub fn finish(mut self) -> Result<()> {
        if let Some(dir) = self.temp_dir.take() {
            if self.cleanup {
                dir.close()?;
            } else {
                let kept = dir.into_path();
                debug!("Keeping run workspace {}", kept.display());
            }
        }
        Ok(())
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        // Сюда попадаем, только если finish() не был вызван
        if let Some(dir) = self.temp_dir.take() {
            let kept = dir.into_path();
            warn!("Run did not finish, temporary files left in {}", kept.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_unique_and_inside_workspace() {
        let workspace = RunWorkspace::new(true).unwrap();
        let a = workspace.file("speech", "mp3");
        let b = workspace.file("speech", "mp3");
        assert_ne!(a, b);
        assert!(a.starts_with(workspace.path()));
        assert_eq!(a.extension().unwrap(), "mp3");
        workspace.finish().unwrap();
    }

    #[test]
    fn finish_removes_directory() {
        let workspace = RunWorkspace::new(true).unwrap();
        let dir = workspace.path().to_path_buf();
        std::fs::write(workspace.file("x", "txt"), b"data").unwrap();
        workspace.finish().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn dropped_workspace_is_kept_for_debugging() {
        let workspace = RunWorkspace::new(true).unwrap();
        let dir = workspace.path().to_path_buf();
        drop(workspace);
        assert!(dir.exists());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn finish_without_cleanup_keeps_directory() {
        let workspace = RunWorkspace::new(false).unwrap();
        let dir = workspace.path().to_path_buf();
        workspace.finish().unwrap();
        assert!(dir.exists());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
