pub mod models;

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::AppResult;
use self::models::{Post, Session, User};

/// One JSON-array file on disk. Every operation reads the whole file and
/// writes the whole file back; the mutex serializes those cycles so
/// concurrent writers cannot drop each other's changes.
pub struct Collection<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<T>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// A missing file reads as the empty collection. A file that exists but
    /// does not parse is an error, not an empty result.
    fn load(&self) -> AppResult<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write through a temp file and rename it into place, so a crash
    /// mid-write cannot leave a torn file behind.
    fn save(&self, items: &[T]) -> AppResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(items)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Snapshot of the collection.
    pub async fn read(&self) -> AppResult<Vec<T>> {
        let _guard = self.lock.lock().await;
        self.load()
    }

    /// Read-modify-write under the collection lock. The file is only
    /// rewritten when the closure succeeds.
    pub async fn update<R, F>(&self, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut Vec<T>) -> AppResult<R>,
    {
        let _guard = self.lock.lock().await;
        let mut items = self.load()?;
        let result = f(&mut items)?;
        self.save(&items)?;
        Ok(result)
    }
}

/// The flat-file datastore: one JSON array per collection under the data
/// directory.
pub struct Store {
    pub users: Collection<User>,
    pub sessions: Collection<Session>,
    pub posts: Collection<Post>,
}

impl Store {
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            users: Collection::new(data_dir.join("users.json")),
            sessions: Collection::new(data_dir.join("sessions.json")),
            posts: Collection::new(data_dir.join("posts.json")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use tempfile::TempDir;

    #[test]
    fn missing_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        let users = tokio_test::block_on(store.users.read()).unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn update_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        let user = User {
            id: "u1".to_string(),
            username: "ana".to_string(),
            password_hash: "hash".to_string(),
            phone_number: None,
            is_admin: false,
            created_at: chrono::Utc::now(),
        };
        tokio_test::block_on(store.users.update(move |users| {
            users.push(user);
            Ok(())
        }))
        .unwrap();

        let reopened = Store::open(tmp.path()).unwrap();
        let users = tokio_test::block_on(reopened.users.read()).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "ana");
    }

    #[test]
    fn failed_update_leaves_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        let user = User {
            id: "u1".to_string(),
            username: "ana".to_string(),
            password_hash: "hash".to_string(),
            phone_number: None,
            is_admin: false,
            created_at: chrono::Utc::now(),
        };
        tokio_test::block_on(store.users.update(move |users| {
            users.push(user);
            Ok(())
        }))
        .unwrap();

        let result = tokio_test::block_on(store.users.update(|users| {
            users.clear();
            Err::<(), _>(AppError::BadRequest("nope".to_string()))
        }));
        assert!(result.is_err());

        let users = tokio_test::block_on(store.users.read()).unwrap();
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        tokio_test::block_on(store.posts.update(|_| Ok(()))).unwrap();
        assert!(tmp.path().join("posts.json").exists());
        assert!(!tmp.path().join("posts.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("posts.json"), "not json").unwrap();
        let store = Store::open(tmp.path()).unwrap();
        assert!(tokio_test::block_on(store.posts.read()).is_err());
    }
}
