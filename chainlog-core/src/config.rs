use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use dirs::home_dir;

use crate::error::{ChainlogError, Result};

pub const PROJECTS_DIR_ENV: &str = "CHAINLOG_PROJECTS_DIR";
pub const CONFIG_DIR_ENV: &str = "CLAUDE_CONFIG_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainlogRoots {
    pub projects_root: PathBuf,
}

impl ChainlogRoots {
    pub fn new(projects_root: impl Into<PathBuf>) -> Self {
        Self {
            projects_root: projects_root.into(),
        }
    }

    pub fn from_env_or_home() -> Result<Self> {
        Self::resolve(
            env::var_os(PROJECTS_DIR_ENV),
            env::var_os(CONFIG_DIR_ENV),
            home_dir(),
        )
    }

    fn resolve(
        projects_dir: Option<OsString>,
        config_dir: Option<OsString>,
        home: Option<PathBuf>,
    ) -> Result<Self> {
        // Precedence:
        // 1) CHAINLOG_PROJECTS_DIR (explicit projects root)
        // 2) CLAUDE_CONFIG_DIR/projects (producer's config root env)
        // 3) ~/.claude/projects (producer default)
        if let Some(path) = projects_dir.filter(|path| !path.is_empty()) {
            return Ok(Self::new(path));
        }
        if let Some(path) = config_dir.filter(|path| !path.is_empty()) {
            return Ok(Self::new(Path::new(&path).join("projects")));
        }

        let home = home.ok_or(ChainlogError::HomeDirectoryNotFound)?;
        Ok(Self::new(home.join(".claude/projects")))
    }
}
