#![allow(dead_code)]

use konakore_core::RemoteTag;
use konakore_core::config::BatchWorkerConfig;
use konakore_metadata::MemoryStore;
use konakore_metadata::MetadataStore;
use konakore_metadata::models::NewPost;
use serde_json::json;
use std::net::TcpListener;
use std::sync::Arc;

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn memory_store() -> (MemoryStore, Arc<dyn MetadataStore>) {
    let store = MemoryStore::new();
    let shared: Arc<dyn MetadataStore> = Arc::new(store.clone());
    (store, shared)
}

pub fn fast_worker(batch_size: i64) -> BatchWorkerConfig {
    BatchWorkerConfig {
        batch_size,
        cooldown_secs: 0,
        idle_step_secs: 1,
        idle_max_secs: 1,
    }
}

pub fn tag(id: i64, name: &str) -> RemoteTag {
    RemoteTag {
        id,
        name: name.to_string(),
        count: 1,
        tag_type: 0,
        ambiguous: false,
    }
}

pub async fn seed_post(store: &dyn MetadataStore, id: i64, tags: &str) {
    let post = NewPost {
        id,
        raw_data: json!({"id": id, "tags": tags}),
    };
    store.upsert_posts(&[post]).await.unwrap();
}
