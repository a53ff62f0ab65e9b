//! Shared server state.
//!
//! One [`State`] is built at startup and handed to every worker: the
//! account registry, the channel registry, the address ban list and the
//! listener's connection table.  Each registry has its own lock; the only
//! place two kinds of lock nest is the account deletion cascade, which
//! takes the account registry, then each remaining account, then each
//! channel, always in that order.  Channel code checks the account
//! registry *before* taking a channel lock, never under it.

use crate::account::Account;
use crate::channel::Channel;
use crate::client::Client;
use crate::config::Config;
use hickory_resolver::TokioAsyncResolver;
use slab::Slab;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

#[cfg(test)]
pub(crate) mod test;

/// The account registry: username to account, usernames unique, sorted for
/// stable listings.
pub struct Accounts {
    inner: Mutex<BTreeMap<String, Arc<Account>>>,
}

impl Accounts {
    pub fn new() -> Accounts {
        Accounts {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn restore(&self, accounts: BTreeMap<String, Arc<Account>>) {
        *self.inner.lock().await = accounts;
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.inner.lock().await.contains_key(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Account>> {
        self.inner.lock().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.inner.lock().await.keys().cloned().collect()
    }

    pub async fn snapshot(&self) -> Vec<(String, Arc<Account>)> {
        self.inner
            .lock()
            .await
            .iter()
            .map(|(name, account)| (name.clone(), account.clone()))
            .collect()
    }

    /// Creates the account, reserving the name.  The very first account on
    /// the server is an administrator.
    pub async fn register(&self, name: &str) -> Option<Arc<Account>> {
        let mut map = self.inner.lock().await;
        if map.contains_key(name) {
            return None;
        }
        let account = Arc::new(Account::new(map.is_empty()));
        map.insert(name.to_owned(), account.clone());
        Some(account)
    }

    /// Drops a reserved name again when registration falls through, with
    /// no cascade.
    pub async fn unregister(&self, name: &str) {
        self.inner.lock().await.remove(name);
    }

    /// `None` when no such account exists.
    pub async fn is_administrator(&self, name: &str) -> Option<bool> {
        let account = self.inner.lock().await.get(name).cloned();
        match account {
            Some(account) => Some(account.is_administrator().await),
            None => None,
        }
    }

    pub async fn is_online(&self, name: &str) -> bool {
        let account = self.inner.lock().await.get(name).cloned();
        match account {
            Some(account) => account.is_online().await,
            None => false,
        }
    }

    /// Appends a message to `target`'s inbox.  False when the account does
    /// not exist.  The registry lock is held through delivery so a
    /// concurrent deletion cannot swallow the message silently.
    pub async fn deliver(&self, source: &str, target: &str, text: &str) -> bool {
        let map = self.inner.lock().await;
        match map.get(target) {
            Some(account) => {
                account.push_message(source, text).await;
                true
            }
            None => false,
        }
    }

    /// Removes the account and scrubs its name everywhere: other accounts'
    /// contact lists, and every channel's ban, kick and mute state.
    pub async fn delete(&self, name: &str, channels: &Channels) -> bool {
        let removed = {
            let mut map = self.inner.lock().await;
            if map.remove(name).is_none() {
                return false;
            }
            for account in map.values() {
                account.remove_contact(name).await;
            }
            true
        };
        for channel in channels.all().await {
            channel.purge_name(name).await;
        }
        log::debug!("Account {} deleted", name);
        removed
    }
}

impl Default for Accounts {
    fn default() -> Self {
        Accounts::new()
    }
}

/// The channel registry.  Names are unique and map to stable ids; deleting
/// a name keeps the channel object alive for whoever is still inside.
pub struct Channels {
    inner: Mutex<ChannelsInner>,
}

pub struct ChannelsInner {
    pub names: BTreeMap<String, u64>,
    pub by_id: BTreeMap<u64, Arc<Channel>>,
    pub next_id: u64,
}

impl Channels {
    pub fn new() -> Channels {
        Channels {
            inner: Mutex::new(ChannelsInner {
                names: BTreeMap::new(),
                by_id: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    pub async fn restore(
        &self,
        names: BTreeMap<String, u64>,
        by_id: BTreeMap<u64, Arc<Channel>>,
        next_id: u64,
    ) {
        let mut inner = self.inner.lock().await;
        let min_next = by_id.keys().next_back().map_or(1, |max| max + 1);
        inner.next_id = next_id.max(min_next);
        inner.names = names;
        inner.by_id = by_id;
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.inner.lock().await.names.contains_key(name)
    }

    pub async fn names(&self) -> Vec<String> {
        self.inner.lock().await.names.keys().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Channel>> {
        let inner = self.inner.lock().await;
        let id = inner.names.get(name)?;
        inner.by_id.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<Channel>> {
        self.inner.lock().await.by_id.values().cloned().collect()
    }

    pub async fn snapshot(&self) -> (BTreeMap<String, u64>, BTreeMap<u64, Arc<Channel>>, u64) {
        let inner = self.inner.lock().await;
        (inner.names.clone(), inner.by_id.clone(), inner.next_id)
    }

    /// Fetches `name`, creating a fresh channel owned by `owner` when it
    /// does not exist.  Returns the channel and whether it was created.
    pub async fn open(&self, name: &str, owner: &str) -> (Arc<Channel>, bool) {
        let mut inner = self.inner.lock().await;
        if let Some(id) = inner.names.get(name) {
            if let Some(channel) = inner.by_id.get(id) {
                return (channel.clone(), false);
            }
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let channel = Arc::new(Channel::new(id, name, owner));
        inner.names.insert(name.to_owned(), id);
        inner.by_id.insert(id, channel.clone());
        log::debug!("Channel {} created with id {}", name, id);
        (channel, true)
    }

    /// Unbinds the name.  The channel object stays registered by id so the
    /// users inside keep a working room.
    pub async fn delete_name(&self, name: &str) -> bool {
        self.inner.lock().await.names.remove(name).is_some()
    }

    /// `None`: `old` is not bound.  `Some(false)`: `new` is taken.
    pub async fn rename(&self, old: &str, new: &str) -> Option<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.names.contains_key(old) {
            return None;
        }
        if inner.names.contains_key(new) {
            return Some(false);
        }
        let id = inner.names.remove(old)?;
        inner.names.insert(new.to_owned(), id);
        Some(true)
    }
}

impl Default for Channels {
    fn default() -> Self {
        Channels::new()
    }
}

/// The global address ban list: hostnames, aliases and numeric addresses,
/// in insertion order.  Name forms match case-insensitively, numeric forms
/// exactly.
pub struct BanList {
    inner: Mutex<Vec<String>>,
}

impl BanList {
    pub fn new() -> BanList {
        BanList {
            inner: Mutex::new(Vec::new()),
        }
    }

    pub async fn restore(&self, entries: Vec<String>) {
        *self.inner.lock().await = entries;
    }

    pub async fn contains(&self, entry: &str) -> bool {
        self.inner.lock().await.iter().any(|e| e == entry)
    }

    pub async fn matches_name(&self, name: &str) -> bool {
        self.inner
            .lock()
            .await
            .iter()
            .any(|e| e.eq_ignore_ascii_case(name))
    }

    /// Adds once; false when the entry is already listed.
    pub async fn add(&self, entry: &str) -> bool {
        let mut list = self.inner.lock().await;
        if list.iter().any(|e| e == entry) {
            false
        } else {
            list.push(entry.to_owned());
            true
        }
    }

    /// Appends unconditionally, the forgiveness trap's blunt instrument.
    pub async fn push(&self, entry: String) {
        self.inner.lock().await.push(entry);
    }

    pub async fn remove_all(&self, entry: &str) -> bool {
        let mut list = self.inner.lock().await;
        let before = list.len();
        list.retain(|e| e != entry);
        before != list.len()
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.inner.lock().await.clone()
    }
}

impl Default for BanList {
    fn default() -> Self {
        BanList::new()
    }
}

/// Listener-side state: whether we still accept connections, and the table
/// of live ones.  The slab key is the connection's worker id.
pub struct NetState {
    inner: Mutex<NetInner>,
    /// Wakes the accept loop when a shutdown begins.
    pub shutdown: Notify,
}

pub struct NetInner {
    pub running: bool,
    pub clients: Slab<Arc<Client>>,
}

impl NetState {
    pub fn new() -> NetState {
        NetState {
            inner: Mutex::new(NetInner {
                running: true,
                clients: Slab::new(),
            }),
            shutdown: Notify::new(),
        }
    }

    /// Registers a connection, unless the server has stopped accepting.
    pub async fn insert(&self, client: Arc<Client>) -> Option<usize> {
        let mut inner = self.inner.lock().await;
        if inner.running {
            Some(inner.clients.insert(client))
        } else {
            None
        }
    }

    pub async fn remove(&self, id: usize) {
        self.inner.lock().await.clients.try_remove(id);
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.running
    }

    /// Flips the server to not-accepting and wakes the listener.  Returns
    /// the current connections for the caller to sift through, or `None`
    /// when someone already shut the server down.
    pub async fn begin_shutdown(&self) -> Option<Vec<Arc<Client>>> {
        let mut inner = self.inner.lock().await;
        if !inner.running {
            return None;
        }
        inner.running = false;
        self.shutdown.notify_one();
        Some(inner.clients.iter().map(|(_, c)| c.clone()).collect())
    }
}

impl Default for NetState {
    fn default() -> Self {
        NetState::new()
    }
}

/// Everything a screen needs, threaded explicitly through every handler.
pub struct State {
    pub config: Config,
    pub banner: String,
    pub accounts: Accounts,
    pub channels: Channels,
    pub bans: BanList,
    pub net: NetState,
    /// Reverse lookups for the ban filter; `None` leaves the filter
    /// matching numeric addresses only.
    pub resolver: Option<TokioAsyncResolver>,
}

impl State {
    pub fn new(config: Config, resolver: Option<TokioAsyncResolver>) -> Arc<State> {
        let banner = config.banner();
        Arc::new(State {
            config,
            banner,
            accounts: Accounts::new(),
            channels: Channels::new(),
            bans: BanList::new(),
            net: NetState::new(),
            resolver,
        })
    }
}
