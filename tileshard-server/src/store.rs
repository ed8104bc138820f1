use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A persisted player account. The backing store lives outside this crate;
/// this is the shape the core reads and writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerAccount {
    pub user_id: u64,
    pub username: String,
    pub level: u32,
    pub exp: u64,
    pub gold: u64,
    pub hp: u16,
    pub mp: u16,
    pub x: i16,
    pub y: i16,
    pub map_id: u32,
}

/// Account persistence: synchronous reads, queued writes.
///
/// Reads happen inline (login is already an asynchronous affair from the
/// client's point of view); writes go through [`SaveQueue`] and are drained
/// by a dedicated worker so the tick thread never blocks on storage.
pub trait AccountStore: Send + Sync {
    fn load_by_username(&self, username: &str) -> Option<PlayerAccount>;

    /// Creates the account if the username is free; returns it either way.
    fn login_or_register(&self, username: &str) -> PlayerAccount;

    fn save_position(&self, user_id: u64, x: i16, y: i16, map_id: u32);
}

/// In-memory store: the collaborator stand-in and test double.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    accounts: HashMap<u64, PlayerAccount>,
    by_username: HashMap<String, u64>,
    next_user_id: u64,
}

impl AccountStore for MemoryStore {
    fn load_by_username(&self, username: &str) -> Option<PlayerAccount> {
        let inner = self.inner.lock().unwrap();
        let user_id = inner.by_username.get(username)?;
        inner.accounts.get(user_id).cloned()
    }

    fn login_or_register(&self, username: &str) -> PlayerAccount {
        if let Some(account) = self.load_by_username(username) {
            return account;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(&user_id) = inner.by_username.get(username) {
            return inner.accounts[&user_id].clone();
        }
        inner.next_user_id += 1;
        let account = PlayerAccount {
            user_id: inner.next_user_id,
            username: username.to_owned(),
            level: 1,
            exp: 0,
            gold: 0,
            hp: 100,
            mp: 50,
            x: 5,
            y: 5,
            map_id: 0,
        };
        inner.by_username.insert(username.to_owned(), account.user_id);
        inner.accounts.insert(account.user_id, account.clone());
        log::info!("registered account '{username}' (user {})", account.user_id);
        account
    }

    fn save_position(&self, user_id: u64, x: i16, y: i16, map_id: u32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.get_mut(&user_id) {
            account.x = x;
            account.y = y;
            account.map_id = map_id;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveRequest {
    Position {
        user_id: u64,
        x: i16,
        y: i16,
        map_id: u32,
    },
}

/// Producer handle to the async write queue. Dropping every handle flushes
/// the worker: it drains what is queued and exits, giving at-most-once
/// semantics on shutdown.
#[derive(Clone, Debug)]
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<SaveRequest>,
}

impl SaveQueue {
    pub fn queue(&self, request: SaveRequest) {
        if self.tx.send(request).is_err() {
            log::error!("save queue worker is gone; dropping write");
        }
    }
}

/// Spawns the write-queue worker on the current tokio runtime.
pub fn spawn_save_worker(store: Arc<dyn AccountStore>) -> (SaveQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            match request {
                SaveRequest::Position {
                    user_id,
                    x,
                    y,
                    map_id,
                } => store.save_position(user_id, x, y, map_id),
            }
        }
        log::debug!("save queue drained, worker exiting");
    });
    (SaveQueue { tx }, task)
}
