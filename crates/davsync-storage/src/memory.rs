//! In-process [`DavBackend`] for tests and dry runs
//!
//! Models a WebDAV tree with collection semantics (MKCOL/PUT need an
//! existing parent), can refuse `Depth: infinity` the way many hosted
//! servers do, can fail chosen range reads, and journals every request so
//! callers can assert on the traffic an operation produced.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use davsync_core::{BlockRange, DavsyncError, DavsyncResult, Depth};

use crate::backend::{trim_dir, DavBackend, DavEntry};

#[derive(Debug, Clone)]
enum Node {
    Dir { modified: i64 },
    File { data: Bytes, modified: i64, etag: String },
}

/// One request as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Propfind { path: String, depth: Depth },
    Get { path: String, range: BlockRange },
    Put { path: String, len: usize },
    Delete { path: String },
    Mkcol { path: String },
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    reject_infinity: bool,
    failing_offsets: HashSet<u64>,
    journal: Vec<Request>,
    version: u64,
}

#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

fn is_descendant(candidate: &str, dir: &str) -> bool {
    candidate != dir
        && (dir == "/" || candidate.starts_with(dir) && candidate[dir.len()..].starts_with('/'))
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node::Dir {
                modified: now_millis(),
            },
        );
        Self {
            state: Mutex::new(State {
                nodes,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not cascade into every other assertion.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer `Depth: infinity` with 403 Forbidden.
    pub fn reject_infinity(self) -> Self {
        self.lock().reject_infinity = true;
        self
    }

    /// Fail any ranged GET starting at `offset` with a transport error.
    pub fn fail_range_at(&self, offset: u64) {
        self.lock().failing_offsets.insert(offset);
    }

    /// Create `path` and any missing ancestors as collections.
    pub fn create_dir_all(&self, path: &str) {
        let mut state = self.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            state.nodes.entry(current.clone()).or_insert(Node::Dir {
                modified: now_millis(),
            });
        }
    }

    /// Store a file directly, creating ancestors; not journaled.
    pub fn insert_file(&self, path: &str, data: impl Into<Bytes>) {
        let path = trim_dir(path).to_string();
        self.create_dir_all(parent_of(&path));
        let mut state = self.lock();
        state.version += 1;
        let node = Node::File {
            data: data.into(),
            modified: now_millis(),
            etag: format!("v{}", state.version),
        };
        state.nodes.insert(path, node);
    }

    /// Contents of the file at `path`, if any.
    pub fn file(&self, path: &str) -> Option<Bytes> {
        match self.lock().nodes.get(trim_dir(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(trim_dir(path))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.lock().nodes.get(trim_dir(path)), Some(Node::Dir { .. }))
    }

    pub fn journal(&self) -> Vec<Request> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    pub fn count_requests(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.lock().journal.iter().filter(|r| pred(r)).count()
    }

    pub fn put_count(&self) -> usize {
        self.count_requests(|r| matches!(r, Request::Put { .. }))
    }

    fn entry(path: &str, node: &Node) -> DavEntry {
        match node {
            Node::Dir { modified } => DavEntry {
                path: path.to_string(),
                is_dir: true,
                size: 0,
                last_modified: *modified,
                etag: None,
            },
            Node::File {
                data,
                modified,
                etag,
            } => DavEntry {
                path: path.to_string(),
                is_dir: false,
                size: data.len() as u64,
                last_modified: *modified,
                etag: Some(etag.clone()),
            },
        }
    }
}

#[async_trait]
impl DavBackend for MemoryBackend {
    async fn propfind(&self, path: &str, depth: Depth) -> DavsyncResult<Vec<DavEntry>> {
        let path = trim_dir(path);
        let mut state = self.lock();
        state.journal.push(Request::Propfind {
            path: path.to_string(),
            depth,
        });

        if depth == Depth::Infinity && state.reject_infinity {
            return Err(DavsyncError::Http {
                status: 403,
                path: path.to_string(),
            });
        }
        let Some(node) = state.nodes.get(path) else {
            return Err(DavsyncError::NotFound(path.to_string()));
        };

        let mut entries = vec![Self::entry(path, node)];
        if matches!(node, Node::Dir { .. }) && depth != Depth::Zero {
            for (candidate, child) in &state.nodes {
                if !is_descendant(candidate, path) {
                    continue;
                }
                if depth == Depth::One && parent_of(candidate) != path {
                    continue;
                }
                entries.push(Self::entry(candidate, child));
            }
        }
        Ok(entries)
    }

    async fn get_range(&self, path: &str, range: BlockRange) -> DavsyncResult<Bytes> {
        let path = trim_dir(path);
        let mut state = self.lock();
        state.journal.push(Request::Get {
            path: path.to_string(),
            range,
        });

        if state.failing_offsets.contains(&range.start) {
            return Err(DavsyncError::Transport(format!(
                "injected failure reading {path} at {}",
                range.start
            )));
        }
        match state.nodes.get(path) {
            Some(Node::File { data, .. }) => {
                let len = data.len() as u64;
                let start = range.start.min(len) as usize;
                let end = range.end.min(len) as usize;
                Ok(data.slice(start..end))
            }
            Some(Node::Dir { .. }) => Err(DavsyncError::Http {
                status: 405,
                path: path.to_string(),
            }),
            None => Err(DavsyncError::NotFound(path.to_string())),
        }
    }

    async fn put(&self, path: &str, body: Bytes) -> DavsyncResult<()> {
        let path = trim_dir(path);
        let mut state = self.lock();
        state.journal.push(Request::Put {
            path: path.to_string(),
            len: body.len(),
        });

        if !matches!(state.nodes.get(parent_of(path)), Some(Node::Dir { .. })) {
            return Err(DavsyncError::Http {
                status: 409,
                path: path.to_string(),
            });
        }
        if matches!(state.nodes.get(path), Some(Node::Dir { .. })) {
            return Err(DavsyncError::Http {
                status: 405,
                path: path.to_string(),
            });
        }
        state.version += 1;
        let node = Node::File {
            data: body,
            modified: now_millis(),
            etag: format!("v{}", state.version),
        };
        state.nodes.insert(path.to_string(), node);
        Ok(())
    }

    async fn delete(&self, path: &str) -> DavsyncResult<()> {
        let path = trim_dir(path);
        let mut state = self.lock();
        state.journal.push(Request::Delete {
            path: path.to_string(),
        });

        if state.nodes.remove(path).is_none() {
            return Err(DavsyncError::NotFound(path.to_string()));
        }
        state.nodes.retain(|candidate, _| !is_descendant(candidate, path));
        if path == "/" {
            state.nodes.insert("/".to_string(), Node::Dir { modified: now_millis() });
        }
        Ok(())
    }

    async fn mkcol(&self, path: &str) -> DavsyncResult<()> {
        let path = trim_dir(path);
        let mut state = self.lock();
        state.journal.push(Request::Mkcol {
            path: path.to_string(),
        });

        match state.nodes.get(path) {
            Some(Node::Dir { .. }) => return Ok(()),
            Some(Node::File { .. }) => {
                return Err(DavsyncError::Http {
                    status: 405,
                    path: path.to_string(),
                })
            }
            None => {}
        }
        if !matches!(state.nodes.get(parent_of(path)), Some(Node::Dir { .. })) {
            return Err(DavsyncError::Http {
                status: 409,
                path: path.to_string(),
            });
        }
        state.nodes.insert(
            path.to_string(),
            Node::Dir {
                modified: now_millis(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(entries: &[DavEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_propfind_depths() {
        let backend = MemoryBackend::new();
        backend.insert_file("/vault/a.md", "a");
        backend.insert_file("/vault/sub/b.md", "bb");

        let zero = backend.propfind("/vault/", Depth::Zero).await.unwrap();
        assert_eq!(paths(&zero), ["/vault"]);

        let one = backend.propfind("/vault", Depth::One).await.unwrap();
        assert_eq!(paths(&one), ["/vault", "/vault/a.md", "/vault/sub"]);

        let all = backend.propfind("/vault", Depth::Infinity).await.unwrap();
        assert_eq!(
            paths(&all),
            ["/vault", "/vault/a.md", "/vault/sub", "/vault/sub/b.md"]
        );
        assert_eq!(all[3].size, 2);
    }

    #[tokio::test]
    async fn test_reject_infinity() {
        let backend = MemoryBackend::new().reject_infinity();
        let err = backend.propfind("/", Depth::Infinity).await.unwrap_err();
        assert!(err.is_forbidden());
        assert!(backend.propfind("/", Depth::One).await.is_ok());
    }

    #[tokio::test]
    async fn test_collection_semantics() {
        let backend = MemoryBackend::new();
        let err = backend.put("/missing/a", Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, DavsyncError::Http { status: 409, .. }));

        backend.mkcol("/d").await.unwrap();
        backend.mkcol("/d").await.unwrap();
        backend.put("/d/a", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(backend.file("/d/a").unwrap(), Bytes::from_static(b"x"));

        backend.delete("/d").await.unwrap();
        assert!(!backend.contains("/d/a"));
        assert!(backend.delete("/d").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_get_range_and_fault_injection() {
        let backend = MemoryBackend::new();
        backend.insert_file("/f", "0123456789");
        let bytes = backend.get_range("/f", BlockRange::new(2, 5)).await.unwrap();
        assert_eq!(&bytes[..], b"234");

        let past_end = backend.get_range("/f", BlockRange::new(8, 20)).await.unwrap();
        assert_eq!(&past_end[..], b"89");

        backend.fail_range_at(4);
        assert!(matches!(
            backend.get_range("/f", BlockRange::new(4, 6)).await,
            Err(DavsyncError::Transport(_))
        ));
        assert_eq!(
            backend.count_requests(|r| matches!(r, Request::Get { .. })),
            3
        );
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/a/b"), "/a");
        assert!(is_descendant("/a/b", "/a"));
        assert!(!is_descendant("/ab", "/a"));
        assert!(is_descendant("/a", "/"));
        assert!(!is_descendant("/", "/"));
    }
}
