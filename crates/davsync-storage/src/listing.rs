//! Full-tree enumeration of the remote base directory
//!
//! With `Depth: infinity` one PROPFIND returns everything. Otherwise the tree
//! is walked breadth-first: each level's directories are listed with
//! `Depth: 1` in concurrent batches of `list_batch_size`, and the
//! subdirectories found feed the next level.

use std::collections::{HashSet, VecDeque};

use davsync_core::{DavsyncResult, Depth, RemoteItem, TransportCapability};
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::backend::{trim_dir, DavBackend, DavEntry};
use crate::transport::WebdavTransport;

/// List every file and directory below the base directory (the base
/// directory itself excluded). Each object appears once.
pub async fn list_remote(transport: &WebdavTransport) -> DavsyncResult<Vec<RemoteItem>> {
    let capability = transport.init().await?;
    let root = transport.base_root();
    let backend = transport.backend().as_ref();

    let entries = match capability {
        TransportCapability::InfinitySupported => list_infinity(backend, &root).await?,
        TransportCapability::DepthOneOnly | TransportCapability::Unknown => {
            list_breadth_first(backend, &root, transport.list_batch_size()).await?
        }
    };

    let items = entries
        .iter()
        .map(|entry| transport.to_remote_item(entry))
        .collect::<DavsyncResult<Vec<_>>>()?;
    info!(count = items.len(), ?capability, "remote listing complete");
    Ok(items)
}

async fn list_infinity(backend: &dyn DavBackend, root: &str) -> DavsyncResult<Vec<DavEntry>> {
    let root_key = trim_dir(root);
    let mut seen = HashSet::new();
    Ok(backend
        .propfind(root, Depth::Infinity)
        .await?
        .into_iter()
        .filter(|e| e.path != root_key && seen.insert(e.path.clone()))
        .collect())
}

/// Direct children of `dir`, without `dir` itself.
async fn list_children(backend: &dyn DavBackend, dir: &str) -> DavsyncResult<Vec<DavEntry>> {
    let dir_key = trim_dir(dir);
    let entries = backend.propfind(dir, Depth::One).await?;
    Ok(entries.into_iter().filter(|e| e.path != dir_key).collect())
}

async fn list_breadth_first(
    backend: &dyn DavBackend,
    root: &str,
    batch_size: usize,
) -> DavsyncResult<Vec<DavEntry>> {
    let mut queue = VecDeque::from([root.to_string()]);
    let mut visited: HashSet<String> = HashSet::from([trim_dir(root).to_string()]);
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    let mut level = 0usize;

    while !queue.is_empty() {
        let dirs: Vec<String> = queue.drain(..).collect();
        debug!(level, dirs = dirs.len(), "listing level");

        for batch in dirs.chunks(batch_size.max(1)) {
            let listings =
                try_join_all(batch.iter().map(|dir| list_children(backend, dir))).await?;

            for entry in listings.into_iter().flatten() {
                if !seen.insert(entry.path.clone()) {
                    continue;
                }
                if entry.is_dir && visited.insert(entry.path.clone()) {
                    queue.push_back(format!("{}/", entry.path));
                }
                out.push(entry);
            }
        }
        level += 1;
    }
    Ok(out)
}
