// File: ./src/context.rs
/*! Application context abstraction for filesystem paths.

The `AppContext` trait encapsulates how tasksheet determines its data and
config directories. Two concrete implementations are provided:

- `StandardContext`: Uses `directories::ProjectDirs` and optionally an
  override root (the `--root` command line flag).
- `TestContext`: Creates a temporary directory for isolated tests and
  cleans it up when dropped.

Everything that touches the disk takes a `&dyn AppContext`; there are no
environment-variable based path lookups.
*/

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Defines the file system context for the application.
///
/// The trait is object-safe so callers can hold `Arc<dyn AppContext>`.
pub trait AppContext: Send + Sync + std::fmt::Debug {
    fn get_data_dir(&self) -> Result<PathBuf>;
    fn get_config_dir(&self) -> Result<PathBuf>;

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(self.get_config_dir()?.join("config.toml"))
    }

    /// Durable key/value file holding the export checkpoint.
    fn get_state_path(&self) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join("state.json"))
    }

    fn get_triggers_path(&self) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join("triggers.json"))
    }

    fn get_report_path(&self) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join("report.json"))
    }

    fn get_log_path(&self) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join("tasksheet.log"))
    }

    /// Where `import` writes its sheet when no `--sheet` is given.
    fn get_default_sheet_path(&self) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join("sheet.json"))
    }
}

// --- Production Implementation ---

#[derive(Clone, Debug)]
pub struct StandardContext {
    override_root: Option<PathBuf>,
}

impl StandardContext {
    /// Create a new StandardContext.
    ///
    /// When `override_root` is `Some(path)`, all directories will be created
    /// under that root using `data` and `config` subdirectories.
    pub fn new(override_root: Option<PathBuf>) -> Self {
        Self { override_root }
    }

    fn ensure_exists(path: PathBuf) -> Result<PathBuf> {
        if !path.exists() {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(path)
    }

    fn get_proj_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("org", "tasksheet", "tasksheet")
    }
}

impl AppContext for StandardContext {
    fn get_data_dir(&self) -> Result<PathBuf> {
        if let Some(root) = &self.override_root {
            return Self::ensure_exists(root.join("data"));
        }
        let proj = Self::get_proj_dirs().ok_or_else(|| anyhow::anyhow!("No home directory"))?;
        Self::ensure_exists(proj.data_dir().to_path_buf())
    }

    fn get_config_dir(&self) -> Result<PathBuf> {
        if let Some(root) = &self.override_root {
            return Self::ensure_exists(root.join("config"));
        }
        let proj = Self::get_proj_dirs().ok_or_else(|| anyhow::anyhow!("No home directory"))?;
        Self::ensure_exists(proj.config_dir().to_path_buf())
    }
}

// --- Test Implementation ---

#[derive(Clone, Debug)]
pub struct TestContext {
    pub root: PathBuf,
}

impl TestContext {
    /// Creates a new TestContext backed by a unique temporary directory.
    ///
    /// The directory is created immediately and removed when the `TestContext`
    /// is dropped.
    pub fn new() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let root = std::env::temp_dir().join(format!("tasksheet_test_{}", uuid));
        // Best-effort create; the first IO call reports the failure otherwise.
        let _ = std::fs::create_dir_all(&root);
        Self { root }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext for TestContext {
    fn get_data_dir(&self) -> Result<PathBuf> {
        let p = self.root.join("data");
        std::fs::create_dir_all(&p)?;
        Ok(p)
    }

    fn get_config_dir(&self) -> Result<PathBuf> {
        let p = self.root.join("config");
        std::fs::create_dir_all(&p)?;
        Ok(p)
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        // Best-effort cleanup; ignore errors.
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
