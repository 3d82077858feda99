use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use futures::future::join_all;
use serde::Serialize;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chain::{ParseError, ParseStats, parse_chain};
use crate::error::{ChainlogError, Result};
use crate::metadata::extract_metadata_stream;
use crate::model::{Session, SessionListing, SubagentSession};
use crate::session::{LeafFailure, build_sessions, build_subagent_session};
use crate::uri::{SessionUri, is_valid_id};

pub const SESSION_FILE_EXTENSION: &str = "jsonl";
pub const AGENT_FILE_PREFIX: &str = "agent-";
pub const SUBAGENTS_DIR: &str = "subagents";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub modified: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

pub type LineReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Everything the store needs from the file system. Missing paths must fail
/// with [`io::ErrorKind::NotFound`].
pub trait FileSystem: Send + Sync {
    fn stat(&self, path: &Path) -> impl Future<Output = io::Result<FileStat>> + Send;
    fn read_dir(&self, path: &Path) -> impl Future<Output = io::Result<Vec<DirEntry>>> + Send;
    fn read_file(&self, path: &Path) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
    fn open_lines(&self, path: &Path) -> impl Future<Output = io::Result<LineReader>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            modified: metadata.modified()?,
        })
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_file() {
                EntryKind::File
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::Other
            };
            entries.push(DirEntry { name, kind });
        }
        Ok(entries)
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn open_lines(&self, path: &Path) -> io::Result<LineReader> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionLoad {
    pub uri: String,
    pub path: PathBuf,
    pub sessions: Vec<Session>,
    pub errors: Vec<ParseError>,
    pub stats: ParseStats,
    pub failures: Vec<LeafFailure>,
}

impl SessionLoad {
    fn empty(uri: &SessionUri, path: &Path) -> Self {
        Self {
            uri: uri.as_string(),
            path: path.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn primary(&self) -> Option<&Session> {
        let session_id = self.path.file_stem().and_then(|stem| stem.to_str());
        self.sessions
            .iter()
            .find(|session| Some(session.id.as_str()) == session_id)
            .or_else(|| self.sessions.first())
    }
}

#[derive(Debug, Clone)]
struct TrackedFile {
    modified: SystemTime,
    listing: Option<SessionListing>,
}

#[derive(Debug, Default)]
struct DirectorySnapshot {
    files: HashMap<PathBuf, TrackedFile>,
}

#[derive(Debug)]
struct CachedLoad {
    path: PathBuf,
    modified: SystemTime,
    load: Arc<SessionLoad>,
}

pub fn is_session_file_name(name: &str) -> bool {
    !name.starts_with(AGENT_FILE_PREFIX)
        && name
            .strip_suffix(SESSION_FILE_EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .is_some_and(is_valid_id)
}

pub fn is_agent_file_name(name: &str) -> bool {
    agent_id_from_file_name(name).is_some()
}

fn agent_id_from_file_name(name: &str) -> Option<&str> {
    name.strip_prefix(AGENT_FILE_PREFIX)?
        .strip_suffix(SESSION_FILE_EXTENSION)?
        .strip_suffix('.')
        .filter(|id| is_valid_id(id))
}

pub fn session_uri_for_path(path: &Path) -> Option<SessionUri> {
    let stem = path.file_stem()?.to_str()?;
    SessionUri::for_session(stem).ok()
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ChainlogError + '_ {
    move |source| ChainlogError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct SessionStore<F = LocalFileSystem> {
    fs: F,
    listings: Mutex<HashMap<PathBuf, Arc<DirectorySnapshot>>>,
    sessions: Mutex<HashMap<SessionUri, Arc<CachedLoad>>>,
}

impl SessionStore<LocalFileSystem> {
    pub fn new() -> Self {
        Self::with_file_system(LocalFileSystem)
    }
}

impl<F: FileSystem> SessionStore<F> {
    pub fn with_file_system(fs: F) -> Self {
        Self {
            fs,
            listings: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn has_cached_session(&self, uri: &SessionUri) -> bool {
        lock(&self.sessions).contains_key(&uri.main_session())
    }

    pub fn invalidate(&self, uri: &SessionUri) {
        lock(&self.sessions).remove(&uri.main_session());
    }

    // Loads are keyed by session id, which need not match the file stem.
    fn evict_for_path(&self, path: &Path) {
        lock(&self.sessions).retain(|uri, cached| {
            let stale = cached.path == path;
            if stale {
                debug!(uri = %uri, "evicted cached session after listing change");
            }
            !stale
        });
    }

    fn forget_directory(&self, dir: &Path) {
        let previous = lock(&self.listings).remove(dir);
        if let Some(previous) = previous {
            for path in previous.files.keys() {
                self.evict_for_path(path);
            }
        }
    }

    /// Lists every session file in `directories`, newest activity first.
    ///
    /// Unreadable directories and files are logged and skipped; the only
    /// error is [`ChainlogError::Cancelled`].
    pub async fn list_sessions(
        &self,
        directories: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<SessionListing>> {
        let mut listings = Vec::new();
        for dir in directories {
            if cancel.is_cancelled() {
                return Err(ChainlogError::Cancelled);
            }
            listings.extend(self.list_directory(dir, cancel).await?);
        }

        listings.sort_by(|left, right| {
            right
                .metadata
                .last_request_ended
                .cmp(&left.metadata.last_request_ended)
                .then_with(|| left.path.cmp(&right.path))
        });
        Ok(listings)
    }

    async fn list_directory(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<SessionListing>> {
        let entries = match self.fs.read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %err, "failed to read session directory");
                }
                self.forget_directory(dir);
                return Ok(Vec::new());
            }
        };

        let candidates = entries
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::File && is_session_file_name(&entry.name))
            .map(|entry| dir.join(entry.name))
            .collect::<Vec<_>>();

        let previous = lock(&self.listings).get(dir).cloned();
        let scans = candidates
            .iter()
            .map(|path| self.scan_file(path, previous.as_deref(), cancel));
        let results = join_all(scans).await;

        if cancel.is_cancelled() {
            return Err(ChainlogError::Cancelled);
        }

        let mut files = HashMap::new();
        for (path, result) in candidates.into_iter().zip(results) {
            match result {
                Ok(tracked) => {
                    files.insert(path, tracked);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable session file");
                }
            }
        }

        if let Some(previous) = &previous {
            for (path, old) in &previous.files {
                let unchanged = files
                    .get(path)
                    .is_some_and(|tracked| tracked.modified == old.modified);
                if !unchanged {
                    self.evict_for_path(path);
                }
            }
        }

        let listings = files
            .values()
            .filter_map(|tracked| tracked.listing.clone())
            .collect();
        lock(&self.listings).insert(dir.to_path_buf(), Arc::new(DirectorySnapshot { files }));
        Ok(listings)
    }

    async fn scan_file(
        &self,
        path: &Path,
        previous: Option<&DirectorySnapshot>,
        cancel: &CancellationToken,
    ) -> Result<TrackedFile> {
        let stat = self.fs.stat(path).await.map_err(io_error(path))?;

        if let Some(tracked) = previous.and_then(|snapshot| snapshot.files.get(path))
            && stat.modified <= tracked.modified
        {
            return Ok(tracked.clone());
        }

        let uri = session_uri_for_path(path)
            .ok_or_else(|| ChainlogError::InvalidSessionId(path.display().to_string()))?;
        let reader = self.fs.open_lines(path).await.map_err(io_error(path))?;
        let metadata = extract_metadata_stream(reader, path, cancel).await?;

        Ok(TrackedFile {
            modified: stat.modified,
            listing: metadata
                .map(|metadata| SessionListing::new(&uri, path.to_path_buf(), stat.modified, metadata)),
        })
    }

    /// Loads and builds the session file at `path`, reusing the cached build
    /// while the file's modification time has not moved forward.
    ///
    /// Read failures produce an empty load; the only error is
    /// [`ChainlogError::Cancelled`].
    pub async fn load_session(
        &self,
        uri: &SessionUri,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Arc<SessionLoad>> {
        if cancel.is_cancelled() {
            return Err(ChainlogError::Cancelled);
        }

        let key = uri.main_session();
        let stat = match self.fs.stat(path).await {
            Ok(stat) => stat,
            Err(err) => {
                if err.kind() == io::ErrorKind::NotFound {
                    debug!(path = %path.display(), "session file is gone");
                } else {
                    warn!(path = %path.display(), error = %err, "failed to stat session file");
                }
                self.invalidate(&key);
                return Ok(Arc::new(SessionLoad::empty(&key, path)));
            }
        };

        let cached = lock(&self.sessions).get(&key).cloned();
        if let Some(cached) = cached
            && cached.path == path
            && stat.modified <= cached.modified
        {
            return Ok(Arc::clone(&cached.load));
        }

        let bytes = match self.fs.read_file(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read session file");
                self.invalidate(&key);
                return Ok(Arc::new(SessionLoad::empty(&key, path)));
            }
        };

        let source = path.display().to_string();
        let parsed = parse_chain(&String::from_utf8_lossy(&bytes), Some(&source));
        let built = build_sessions(&parsed);
        let subagents = self.load_subagents(path, &key.session_id, cancel).await?;

        if cancel.is_cancelled() {
            return Err(ChainlogError::Cancelled);
        }

        let mut sessions = built.sessions;
        let owner = sessions
            .iter()
            .position(|session| session.id == key.session_id)
            .or_else(|| (!sessions.is_empty()).then_some(0));
        if let Some(owner) = owner {
            sessions[owner].subagents = subagents;
        }

        let load = Arc::new(SessionLoad {
            uri: key.as_string(),
            path: path.to_path_buf(),
            sessions,
            errors: parsed.errors,
            stats: parsed.stats,
            failures: built.failures,
        });
        lock(&self.sessions).insert(
            key,
            Arc::new(CachedLoad {
                path: path.to_path_buf(),
                modified: stat.modified,
                load: Arc::clone(&load),
            }),
        );
        Ok(load)
    }

    pub async fn load_subagent(
        &self,
        uri: &SessionUri,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<SubagentSession> {
        let agent_id = uri
            .agent_id
            .clone()
            .ok_or_else(|| ChainlogError::InvalidMode("missing agent id".to_string()))?;
        let load = self.load_session(uri, path, cancel).await?;

        load.sessions
            .iter()
            .flat_map(|session| session.subagents.iter())
            .find(|subagent| subagent.agent_id == agent_id)
            .cloned()
            .ok_or_else(|| ChainlogError::SubagentNotFound {
                session_id: uri.session_id.clone(),
                agent_id,
            })
    }

    async fn load_subagents(
        &self,
        session_path: &Path,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SubagentSession>> {
        let Some(parent) = session_path.parent() else {
            return Ok(Vec::new());
        };
        let dir = parent.join(session_id).join(SUBAGENTS_DIR);

        let entries = match self.fs.read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %err, "failed to read subagent directory");
                }
                return Ok(Vec::new());
            }
        };

        if cancel.is_cancelled() {
            return Err(ChainlogError::Cancelled);
        }

        let agents = entries
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::File)
            .filter_map(|entry| {
                let agent_id = agent_id_from_file_name(&entry.name)?.to_string();
                Some((agent_id, dir.join(&entry.name)))
            })
            .collect::<Vec<_>>();

        let loads = agents
            .iter()
            .map(|(agent_id, path)| self.load_subagent_file(agent_id, path));
        let mut subagents = join_all(loads)
            .await
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        subagents.sort_by(|left, right| left.agent_id.cmp(&right.agent_id));
        Ok(subagents)
    }

    async fn load_subagent_file(&self, agent_id: &str, path: &Path) -> Option<SubagentSession> {
        let bytes = match self.fs.read_file(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read subagent transcript");
                return None;
            }
        };
        let source = path.display().to_string();
        let parsed = parse_chain(&String::from_utf8_lossy(&bytes), Some(&source));
        build_subagent_session(&parsed, agent_id)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};

    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    use crate::error::ChainlogError;
    use crate::store::{SessionStore, is_agent_file_name, is_session_file_name};
    use crate::uri::SessionUri;

    const BASE_SECS: u64 = 1_771_804_800;

    fn session_body(session_id: &str, prompt: &str) -> String {
        format!(
            "{{\"type\":\"user\",\"uuid\":\"{session_id}-u1\",\"parentUuid\":null,\"sessionId\":\"{session_id}\",\"timestamp\":\"2026-02-23T00:00:00Z\",\"message\":{{\"role\":\"user\",\"content\":\"{prompt}\"}}}}\n{{\"type\":\"assistant\",\"uuid\":\"{session_id}-a1\",\"parentUuid\":\"{session_id}-u1\",\"sessionId\":\"{session_id}\",\"timestamp\":\"2026-02-23T00:00:01Z\",\"message\":{{\"role\":\"assistant\",\"content\":\"ok\"}}}}\n"
        )
    }

    fn write_session(dir: &Path, session_id: &str, prompt: &str, mtime_secs: u64) {
        let path = dir.join(format!("{session_id}.jsonl"));
        fs::write(&path, session_body(session_id, prompt)).expect("write session");
        set_mtime(&path, mtime_secs);
    }

    fn set_mtime(path: &Path, secs: u64) {
        let file = fs::File::options()
            .write(true)
            .open(path)
            .expect("open for mtime");
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .expect("set mtime");
    }

    fn labels(listings: &[crate::model::SessionListing]) -> Vec<String> {
        let mut labels = listings
            .iter()
            .map(|listing| listing.metadata.label.clone())
            .collect::<Vec<_>>();
        labels.sort();
        labels
    }

    #[test]
    fn file_name_filters() {
        assert!(is_session_file_name("2823d1df-720a-4c31-ac55-ae8ba726721f.jsonl"));
        assert!(!is_session_file_name("agent-a4f21c7.jsonl"));
        assert!(!is_session_file_name("notes.txt"));
        assert!(!is_session_file_name(".jsonl"));
        assert!(is_agent_file_name("agent-a4f21c7.jsonl"));
        assert!(!is_agent_file_name("agent-.jsonl"));
    }

    #[tokio::test]
    async fn unchanged_mtime_serves_cached_metadata() {
        let temp = tempdir().expect("tempdir");
        write_session(temp.path(), "s1", "original prompt", BASE_SECS);

        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        let dirs = vec![temp.path().to_path_buf()];
        let first = store.list_sessions(&dirs, &cancel).await.expect("list");
        assert_eq!(labels(&first), vec!["original prompt".to_string()]);

        write_session(temp.path(), "s1", "rewritten prompt", BASE_SECS);
        let second = store.list_sessions(&dirs, &cancel).await.expect("list");
        assert_eq!(labels(&second), vec!["original prompt".to_string()]);
    }

    #[tokio::test]
    async fn touching_forward_recomputes_and_evicts_full_session() {
        let temp = tempdir().expect("tempdir");
        write_session(temp.path(), "s1", "original prompt", BASE_SECS);
        write_session(temp.path(), "s2", "other prompt", BASE_SECS);

        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        let dirs = vec![temp.path().to_path_buf()];
        store.list_sessions(&dirs, &cancel).await.expect("list");

        let uri = SessionUri::parse("chainlog://s1").expect("uri");
        let other = SessionUri::parse("chainlog://s2").expect("uri");
        let path = temp.path().join("s1.jsonl");
        store.load_session(&uri, &path, &cancel).await.expect("load");
        store
            .load_session(&other, &temp.path().join("s2.jsonl"), &cancel)
            .await
            .expect("load");
        assert!(store.has_cached_session(&uri));

        write_session(temp.path(), "s1", "rewritten prompt", BASE_SECS + 60);
        let listings = store.list_sessions(&dirs, &cancel).await.expect("list");

        assert_eq!(
            labels(&listings),
            vec!["other prompt".to_string(), "rewritten prompt".to_string()]
        );
        assert!(!store.has_cached_session(&uri));
        assert!(store.has_cached_session(&other));
    }

    #[tokio::test]
    async fn removed_and_added_files_change_listing_size() {
        let temp = tempdir().expect("tempdir");
        write_session(temp.path(), "s1", "one", BASE_SECS);
        write_session(temp.path(), "s2", "two", BASE_SECS);

        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        let dirs = vec![temp.path().to_path_buf()];
        assert_eq!(store.list_sessions(&dirs, &cancel).await.expect("list").len(), 2);

        let uri = SessionUri::parse("chainlog://s2").expect("uri");
        store
            .load_session(&uri, &temp.path().join("s2.jsonl"), &cancel)
            .await
            .expect("load");
        fs::remove_file(temp.path().join("s2.jsonl")).expect("remove");
        assert_eq!(store.list_sessions(&dirs, &cancel).await.expect("list").len(), 1);
        assert!(!store.has_cached_session(&uri));

        write_session(temp.path(), "s3", "three", BASE_SECS);
        write_session(temp.path(), "s4", "four", BASE_SECS);
        assert_eq!(store.list_sessions(&dirs, &cancel).await.expect("list").len(), 3);
    }

    #[tokio::test]
    async fn listing_change_evicts_load_cached_under_another_session_id() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("renamed.jsonl");
        fs::write(&path, session_body("s-real", "original")).expect("write");
        set_mtime(&path, BASE_SECS);

        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        let dirs = vec![temp.path().to_path_buf()];
        store.list_sessions(&dirs, &cancel).await.expect("list");

        let uri = SessionUri::parse("chainlog://s-real").expect("uri");
        store.load_session(&uri, &path, &cancel).await.expect("load");
        assert!(store.has_cached_session(&uri));

        fs::write(&path, session_body("s-real", "rewritten")).expect("write");
        set_mtime(&path, BASE_SECS + 60);
        store.list_sessions(&dirs, &cancel).await.expect("list");
        assert!(!store.has_cached_session(&uri));
    }

    #[tokio::test]
    async fn listing_skips_non_session_files_and_bad_content() {
        let temp = tempdir().expect("tempdir");
        write_session(temp.path(), "s1", "good", BASE_SECS + 10);
        write_session(temp.path(), "s0", "older", BASE_SECS);
        fs::write(temp.path().join("garbage.jsonl"), [0xff, 0xfe, b'\n', b'{']).expect("write");
        fs::write(temp.path().join("agent-a1.jsonl"), session_body("s1", "agent")).expect("write");
        fs::write(temp.path().join("notes.md"), "# notes").expect("write");
        fs::create_dir_all(temp.path().join("s1.jsonl.d")).expect("mkdir");

        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        let listings = store
            .list_sessions(&[temp.path().to_path_buf()], &cancel)
            .await
            .expect("list");

        let ids = listings
            .iter()
            .map(|listing| listing.session_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["s0", "s1"]);
        assert_eq!(listings[1].uri, "chainlog://s1");
    }

    #[tokio::test]
    async fn missing_directory_resolves_to_empty_listing() {
        let temp = tempdir().expect("tempdir");
        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        let listings = store
            .list_sessions(&[temp.path().join("missing")], &cancel)
            .await
            .expect("list");
        assert!(listings.is_empty());
    }

    #[tokio::test]
    async fn cancelled_listing_reports_cancellation() {
        let temp = tempdir().expect("tempdir");
        write_session(temp.path(), "s1", "one", BASE_SECS);

        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = store
            .list_sessions(&[temp.path().to_path_buf()], &cancel)
            .await
            .expect_err("must cancel");
        assert!(matches!(err, ChainlogError::Cancelled));
    }

    #[tokio::test]
    async fn load_session_caches_until_mtime_moves_forward() {
        let temp = tempdir().expect("tempdir");
        write_session(temp.path(), "s1", "first", BASE_SECS);
        let path = temp.path().join("s1.jsonl");
        let uri = SessionUri::parse("chainlog://s1").expect("uri");

        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        let first = store.load_session(&uri, &path, &cancel).await.expect("load");
        let again = store.load_session(&uri, &path, &cancel).await.expect("load");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.sessions[0].label, "first");

        write_session(temp.path(), "s1", "second", BASE_SECS + 1);
        let refreshed = store.load_session(&uri, &path, &cancel).await.expect("load");
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(refreshed.sessions[0].label, "second");

        let subagent_uri = SessionUri::parse("chainlog://s1/agent-x").expect("uri");
        store.invalidate(&subagent_uri);
        assert!(!store.has_cached_session(&uri));
    }

    #[tokio::test]
    async fn load_session_attaches_subagents() {
        let temp = tempdir().expect("tempdir");
        write_session(temp.path(), "s1", "parent", BASE_SECS);
        let subagents = temp.path().join("s1").join("subagents");
        fs::create_dir_all(&subagents).expect("mkdir");
        fs::write(subagents.join("agent-a4f21c7.jsonl"), session_body("s1", "agent task"))
            .expect("write agent");
        fs::write(subagents.join("agent-empty.jsonl"), "").expect("write agent");

        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        let uri = SessionUri::parse("chainlog://s1").expect("uri");
        let load = store
            .load_session(&uri, &temp.path().join("s1.jsonl"), &cancel)
            .await
            .expect("load");

        let session = load.primary().expect("session");
        assert_eq!(session.subagents.len(), 1);
        assert_eq!(session.subagents[0].agent_id, "a4f21c7");
        assert_eq!(session.subagents[0].messages.len(), 2);

        let subagent_uri = SessionUri::parse("chainlog://s1/a4f21c7").expect("uri");
        let subagent = store
            .load_subagent(&subagent_uri, &temp.path().join("s1.jsonl"), &cancel)
            .await
            .expect("subagent");
        assert_eq!(subagent.timestamp, "2026-02-23T00:00:00Z");
    }

    #[tokio::test]
    async fn missing_session_file_loads_empty() {
        let temp = tempdir().expect("tempdir");
        let store = SessionStore::new();
        let cancel = CancellationToken::new();
        let uri = SessionUri::parse("chainlog://gone").expect("uri");
        let load = store
            .load_session(&uri, &temp.path().join("gone.jsonl"), &cancel)
            .await
            .expect("load");
        assert!(load.sessions.is_empty());
        assert!(!store.has_cached_session(&uri));
    }
}
