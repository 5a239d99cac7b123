use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::AppResult;
use crate::store::models::{Session, User};
use crate::store::Store;

/// Create a new session for a user. Returns the stored session record.
pub async fn create_session(store: &Store, user: &User, ttl_minutes: i64) -> AppResult<Session> {
    let now = Utc::now();
    let session = Session {
        id: generate_token(),
        user: user.public(),
        created_at: now,
        expires_at: now + Duration::minutes(ttl_minutes),
        last_activity: now,
    };

    let record = session.clone();
    store
        .sessions
        .update(move |sessions| {
            sessions.push(record);
            Ok(())
        })
        .await?;

    Ok(session)
}

/// Look up a session by token and slide its expiry forward.
///
/// Returns None for unknown tokens and for expired sessions alike. Expired
/// records stay in the file and are rejected here lazily; nothing sweeps
/// them.
pub async fn authenticate(store: &Store, token: &str, ttl_minutes: i64) -> AppResult<Option<Session>> {
    let now = Utc::now();
    store
        .sessions
        .update(move |sessions| {
            let Some(session) = sessions.iter_mut().find(|s| s.id == token) else {
                return Ok(None);
            };
            if is_expired(session, now) {
                return Ok(None);
            }
            session.expires_at = now + Duration::minutes(ttl_minutes);
            session.last_activity = now;
            Ok(Some(session.clone()))
        })
        .await
}

/// Delete a session by token. Returns whether a record was removed; expired
/// records are deleted the same way as live ones.
pub async fn delete_session(store: &Store, token: &str) -> AppResult<bool> {
    store
        .sessions
        .update(move |sessions| {
            let before = sessions.len();
            sessions.retain(|s| s.id != token);
            Ok(sessions.len() != before)
        })
        .await
}

fn is_expired(session: &Session, now: DateTime<Utc>) -> bool {
    now > session.expires_at
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
