use crate::cache::{ACTIVE_SESSIONS, SESSION_CACHE};
use crate::models::session::SessionStatus;
use uuid::Uuid;

pub async fn all_sessions() -> Vec<SessionStatus> {
    let mut sessions: Vec<_> = SESSION_CACHE.iter().map(|entry| entry.1.clone()).collect();
    sessions.sort_by_key(|status| status.updated_at);
    sessions
}

pub async fn session(id: Uuid) -> Option<SessionStatus> {
    SESSION_CACHE.get(&id).await
}

/// Cancels a running session; `false` if no such session is running.
pub fn stop(id: Uuid) -> bool {
    match ACTIVE_SESSIONS.lock().unwrap().get(&id) {
        Some(cancel) => {
            tracing::info!("Stopping selection session {}", id);
            cancel.cancel();
            true
        }
        None => false,
    }
}
