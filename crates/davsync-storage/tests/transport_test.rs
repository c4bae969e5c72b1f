//! Capability negotiation, persistence, and listing over the in-memory backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use davsync_core::config::{DepthSetting, TransferConfig, WebdavConfig};
use davsync_core::{Depth, TransportCapability};
use davsync_storage::memory::Request;
use davsync_storage::{
    list_remote, MemoryBackend, MemorySettingsStore, SettingsStore, WebdavTransport,
};

fn webdav(base: &str) -> WebdavConfig {
    WebdavConfig {
        address: "https://dav.example.com".into(),
        remote_base_dir: base.into(),
        ..Default::default()
    }
}

fn populate(backend: &MemoryBackend) {
    backend.insert_file("/vault/a.md", "alpha");
    backend.insert_file("/vault/notes/b.md", "beta");
    backend.insert_file("/vault/notes/deep/c.md", "gamma");
    backend.insert_file("/vault/attachments/img.png", vec![0u8; 64]);
    backend.create_dir_all("/vault/empty");
    backend.insert_file("/outside.md", "not listed");
}

fn transport_over(
    backend: Arc<MemoryBackend>,
    webdav: WebdavConfig,
    store: Arc<MemorySettingsStore>,
) -> WebdavTransport {
    let transfer = TransferConfig {
        list_batch_size: 2,
        ..Default::default()
    };
    WebdavTransport::new(backend, webdav, &transfer).with_settings_store(store)
}

async fn keys(transport: &WebdavTransport) -> BTreeSet<String> {
    list_remote(transport)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.key)
        .collect()
}

#[tokio::test]
async fn test_probe_learns_infinity_and_persists_once() {
    let backend = Arc::new(MemoryBackend::new());
    populate(&backend);
    let store = Arc::new(MemorySettingsStore::new(webdav("vault")));
    let transport = transport_over(backend.clone(), webdav("vault"), store.clone());

    assert_eq!(transport.capability(), TransportCapability::Unknown);
    assert_eq!(transport.init().await.unwrap(), TransportCapability::InfinitySupported);
    assert_eq!(transport.init().await.unwrap(), TransportCapability::InfinitySupported);
    transport.list().await.unwrap();

    assert_eq!(store.save_count(), 1);
    let saved = store.load_webdav().await.unwrap();
    assert_eq!(saved.depth, DepthSetting::AutoInfinity);
    assert!(!saved.manual_recursive);

    let infinity_probes = backend.count_requests(|r| {
        matches!(r, Request::Propfind { depth: Depth::Infinity, path } if path == "/vault")
    });
    // one probe plus one listing
    assert_eq!(infinity_probes, 2);
}

#[tokio::test]
async fn test_forbidden_infinity_falls_back_and_persists() {
    let backend = Arc::new(MemoryBackend::new().reject_infinity());
    populate(&backend);
    let store = Arc::new(MemorySettingsStore::new(webdav("vault")));
    let transport = transport_over(backend.clone(), webdav("vault"), store.clone());

    assert_eq!(transport.init().await.unwrap(), TransportCapability::DepthOneOnly);
    assert_eq!(store.save_count(), 1);
    let saved = store.current();
    assert_eq!(saved.depth, DepthSetting::AutoOne);
    assert!(saved.manual_recursive);
}

#[tokio::test]
async fn test_persisted_capability_skips_probe() {
    let backend = Arc::new(MemoryBackend::new());
    populate(&backend);
    let mut settings = webdav("vault");
    settings.depth = DepthSetting::AutoOne;
    settings.manual_recursive = true;
    let store = Arc::new(MemorySettingsStore::new(settings.clone()));
    let transport = transport_over(backend.clone(), settings, store.clone());

    assert_eq!(transport.init().await.unwrap(), TransportCapability::DepthOneOnly);
    assert_eq!(store.save_count(), 0);
    assert_eq!(
        backend.count_requests(|r| matches!(r, Request::Propfind { depth: Depth::Infinity, .. })),
        0
    );
}

#[tokio::test]
async fn test_manual_depth_setting_is_honored() {
    let backend = Arc::new(MemoryBackend::new());
    populate(&backend);
    let mut settings = webdav("vault");
    settings.depth = DepthSetting::ManualOne;
    let store = Arc::new(MemorySettingsStore::new(settings.clone()));
    let transport = transport_over(backend.clone(), settings, store.clone());

    transport.list().await.unwrap();
    assert_eq!(
        backend.count_requests(|r| matches!(r, Request::Propfind { depth: Depth::Infinity, .. })),
        0
    );
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_both_strategies_list_the_same_tree() {
    let infinity_backend = Arc::new(MemoryBackend::new());
    populate(&infinity_backend);
    let walking_backend = Arc::new(MemoryBackend::new().reject_infinity());
    populate(&walking_backend);

    let store = Arc::new(MemorySettingsStore::default());
    let by_infinity = transport_over(infinity_backend, webdav("vault"), store.clone());
    let by_walk = transport_over(walking_backend, webdav("vault"), store);

    let expected: BTreeSet<String> = [
        "a.md",
        "notes/",
        "notes/b.md",
        "notes/deep/",
        "notes/deep/c.md",
        "attachments/",
        "attachments/img.png",
        "empty/",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    assert_eq!(keys(&by_infinity).await, expected);
    assert_eq!(keys(&by_walk).await, expected);
    assert_eq!(by_walk.capability(), TransportCapability::DepthOneOnly);
}

#[tokio::test]
async fn test_walk_visits_each_directory_once() {
    let backend = Arc::new(MemoryBackend::new().reject_infinity());
    populate(&backend);
    let store = Arc::new(MemorySettingsStore::default());
    let transport = transport_over(backend.clone(), webdav("vault"), store);
    transport.init().await.unwrap();
    backend.clear_journal();

    let items = transport.list().await.unwrap();
    assert_eq!(items.len(), 8);

    let mut per_dir: HashMap<String, usize> = HashMap::new();
    for request in backend.journal() {
        if let Request::Propfind { path, depth } = request {
            assert_eq!(depth, Depth::One);
            *per_dir.entry(path).or_default() += 1;
        }
    }
    let mut dirs: Vec<_> = per_dir.keys().cloned().collect();
    dirs.sort();
    assert_eq!(
        dirs,
        [
            "/vault",
            "/vault/attachments",
            "/vault/empty",
            "/vault/notes",
            "/vault/notes/deep"
        ]
    );
    assert!(per_dir.values().all(|n| *n == 1));
}

#[tokio::test]
async fn test_init_creates_missing_base_dir() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(MemorySettingsStore::default());
    let transport = transport_over(backend.clone(), webdav("apps/vault"), store);

    transport.init().await.unwrap();
    assert!(backend.is_dir("/apps"));
    assert!(backend.is_dir("/apps/vault"));
    assert!(transport.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_items_carry_metadata() {
    let backend = Arc::new(MemoryBackend::new());
    populate(&backend);
    let store = Arc::new(MemorySettingsStore::default());
    let transport = transport_over(backend, webdav("vault"), store);

    let items = transport.list().await.unwrap();
    let image = items
        .iter()
        .find(|i| i.key == "attachments/img.png")
        .unwrap();
    assert_eq!(image.size, 64);
    assert!(image.etag.is_some());
    assert!(image.last_modified > 0);

    let stat = transport.stat("attachments/img.png").await.unwrap();
    assert_eq!(stat.size, 64);
    assert!(transport.stat("nope.md").await.unwrap_err().is_not_found());
}
