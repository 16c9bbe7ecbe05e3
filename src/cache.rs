use moka::future::Cache;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::session::SessionStatus;
use crate::selection::watcher::CancelToken;

pub static SESSION_CACHE: Lazy<Arc<Cache<Uuid, SessionStatus>>> = Lazy::new(|| {
    Arc::new(Cache::new(256))
});

/// Cancel handles of sessions that are still running
pub static ACTIVE_SESSIONS: Lazy<Mutex<HashMap<Uuid, CancelToken>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
