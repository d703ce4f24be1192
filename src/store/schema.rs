//! Schema for the local durable store.
//!
//! Four record collections (payments, suborganizers, sync_queue, images)
//! plus the request-response cache used by the network cache layer. The
//! whole batch is idempotent so schema setup can run any number of times.

pub const SCHEMA: &str = r#"
-- Pending payment records (serialized JSON), keyed by client-generated id
CREATE TABLE IF NOT EXISTS payments (
    local_id TEXT PRIMARY KEY,
    server_id TEXT,
    data BLOB NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_payments_synced ON payments(synced);

-- Pending suborganizer records
CREATE TABLE IF NOT EXISTS suborganizers (
    local_id TEXT PRIMARY KEY,
    server_id TEXT,
    data BLOB NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_suborganizers_synced ON suborganizers(synced);

-- Operations waiting for replay against the remote API.
-- seq orders the queue; requeued items move to the back.
CREATE TABLE IF NOT EXISTS sync_queue (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    action TEXT NOT NULL,
    payload BLOB NOT NULL,
    enqueued_at TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'pending',
    seq INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_entity ON sync_queue(entity_type);
CREATE INDEX IF NOT EXISTS idx_sync_queue_state ON sync_queue(state, seq);

-- Cached binary assets (images), keyed by URL
CREATE TABLE IF NOT EXISTS images (
    url TEXT PRIMARY KEY,
    blob BLOB NOT NULL,
    content_type TEXT NOT NULL,
    cached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_images_cached_at ON images(cached_at);

-- Stored copies of network responses, grouped by named cache generation
CREATE TABLE IF NOT EXISTS request_cache (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (cache_name, request_key)
);
"#;
