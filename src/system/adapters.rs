use anyhow::Result;
use std::path::Path;

use crate::system::traits::FileSystemInterface;

/// Production implementation of FileSystemInterface using std::fs
pub struct StandardFileSystem;

impl FileSystemInterface for StandardFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write config file: {}", e))
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create config directory: {}", e))
    }

    fn get_config_modified_time(&self, path: &Path) -> Result<std::time::SystemTime> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| anyhow::anyhow!("Failed to get file metadata: {}", e))?;
        metadata
            .modified()
            .map_err(|e| anyhow::anyhow!("Failed to get modified time: {}", e))
    }
}

impl Default for StandardFileSystem {
    fn default() -> Self {
        Self
    }
}
