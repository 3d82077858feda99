use std::cmp::Reverse;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ChainlogError, Result};
use crate::store::{SESSION_FILE_EXTENSION, is_agent_file_name, is_session_file_name};

const HEADER_SCAN_LINES: usize = 30;

const SESSION_FILE_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSession {
    pub session_id: String,
    pub path: PathBuf,
    pub source: String,
    pub candidate_count: usize,
    pub warnings: Vec<String>,
}

pub fn project_directories(projects_root: &Path) -> Vec<PathBuf> {
    if !projects_root.exists() {
        return Vec::new();
    }

    let mut dirs = WalkDir::new(projects_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(walkdir::DirEntry::into_path)
        .collect::<Vec<_>>();
    dirs.sort();
    dirs
}

fn session_files(projects_root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(projects_root)
        .min_depth(SESSION_FILE_DEPTH)
        .max_depth(SESSION_FILE_DEPTH)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
}

fn choose_latest(paths: Vec<PathBuf>) -> Option<(PathBuf, usize)> {
    let mut scored = paths
        .into_iter()
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (path, modified)
        })
        .collect::<Vec<_>>();
    scored.sort_by_key(|(_, modified)| Reverse(*modified));
    let count = scored.len();
    scored.into_iter().next().map(|(path, _)| (path, count))
}

fn find_by_filename(projects_root: &Path, session_id: &str) -> Vec<PathBuf> {
    let needle = format!("{session_id}.{SESSION_FILE_EXTENSION}");
    session_files(projects_root)
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name == needle)
        })
        .collect()
}

fn file_mentions_session_id(path: &Path, session_id: &str) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return false;
    };

    BufReader::new(file)
        .lines()
        .take(HEADER_SCAN_LINES)
        .map_while(std::result::Result::ok)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(&line).ok())
        .any(|value| value.get("sessionId").and_then(Value::as_str) == Some(session_id))
}

fn find_by_header_scan(projects_root: &Path, session_id: &str) -> Vec<PathBuf> {
    session_files(projects_root)
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| is_session_file_name(name) && !is_agent_file_name(name))
        })
        .filter(|path| file_mentions_session_id(path, session_id))
        .collect()
}

fn make_resolved(session_id: &str, selected: PathBuf, count: usize, source: &str) -> ResolvedSession {
    let mut warnings = Vec::new();
    if count > 1 {
        warnings.push(format!(
            "multiple matches found ({count}) for session_id={session_id}; selected latest: {}",
            selected.display()
        ));
    }

    ResolvedSession {
        session_id: session_id.to_string(),
        path: selected,
        source: source.to_string(),
        candidate_count: count,
        warnings,
    }
}

pub fn resolve_session_path(projects_root: &Path, session_id: &str) -> Result<ResolvedSession> {
    if projects_root.exists() {
        if let Some((selected, count)) = choose_latest(find_by_filename(projects_root, session_id))
        {
            return Ok(make_resolved(session_id, selected, count, "filename"));
        }

        debug!(session_id, root = %projects_root.display(), "falling back to header scan");
        if let Some((selected, count)) =
            choose_latest(find_by_header_scan(projects_root, session_id))
        {
            return Ok(make_resolved(session_id, selected, count, "header-scan"));
        }
    }

    Err(ChainlogError::SessionNotFound {
        session_id: session_id.to_string(),
        searched_roots: vec![projects_root.to_path_buf()],
    })
}
