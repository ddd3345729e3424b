//! File sync test utilities.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.
#![allow(dead_code)]

use konakore_core::IdleTiers;
use konakore_filesync::{FileSync, LoopSettings};
use konakore_metadata::models::NewPost;
use konakore_metadata::{MemoryStore, MetadataStore};
use konakore_remote::{DaemonClient, UrlProbe};
use konakore_storage::Library;
use serde_json::Value;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Daemon URL nothing listens on, for tests that never submit.
pub const UNUSED_DAEMON: &str = "http://127.0.0.1:9/jsonrpc";

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Memory store plus a temporary library root.
pub struct SyncEnv {
    pub memory: MemoryStore,
    pub store: Arc<dyn MetadataStore>,
    pub library: Library,
    _root: TempDir,
}

impl SyncEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp directory");
        let memory = MemoryStore::new();
        let store: Arc<dyn MetadataStore> = Arc::new(memory.clone());
        let library = Library::new(root.path(), 10_000, 200);
        Self {
            memory,
            store,
            library,
            _root: root,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.library.root().to_path_buf()
    }

    pub fn file_sync(&self, daemon_url: &str) -> FileSync {
        let daemon = DaemonClient::new(daemon_url, None, Duration::from_secs(2))
            .expect("valid daemon URL");
        FileSync::new(
            self.store.clone(),
            self.library.clone(),
            daemon,
            UrlProbe::new(Duration::from_secs(2)),
            100,
        )
    }

    /// Insert a post with the given payload and set its liked flag.
    pub async fn post(&self, id: i64, raw_data: Value, liked: bool) {
        self.store
            .upsert_posts(&[NewPost { id, raw_data }])
            .await
            .unwrap();
        if liked {
            assert!(self.store.set_post_liked(id, true).await.unwrap());
        }
    }

    /// Write a file into the post's bucket and return its path.
    pub fn place_file(&self, post_id: i64, name: &str, bytes: &[u8]) -> PathBuf {
        let dir = self.library.bucket_dir(post_id);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

/// Loop settings with no sleeping between cycles.
pub fn fast_loop(max_idle_cycles: u32, deep_reconcile_every: u32) -> LoopSettings {
    LoopSettings {
        max_idle_cycles,
        idle_tiers: IdleTiers::from_secs(&[0]),
        deep_reconcile_every,
    }
}

/// Loop settings that park the loop in a long sleep after its first cycle.
pub fn parked_loop() -> LoopSettings {
    LoopSettings {
        max_idle_cycles: 100,
        idle_tiers: IdleTiers::from_secs(&[3600]),
        deep_reconcile_every: 0,
    }
}
