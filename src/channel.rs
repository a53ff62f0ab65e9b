//! Channel data.
//!
//! A channel is a named room with a bounded history, a membership map and
//! its moderation lists.  The registry may drop a channel's name while
//! members are still inside; the object then lives on, unreachable for
//! newcomers, until the last member leaves.
//!
//! Locking: `data` guards every field.  Broadcasts pick their recipients
//! and push onto their queues under it, so each member sees lines in
//! lock-acquisition order; socket I/O happens in the writer tasks, outside
//! every lock.  `admin` is the separate single-writer console lock,
//! try-acquired and never held across channel entry.

use crate::client::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// Hard cap on stored history, whatever the owner configures.
pub const BUFFER_LIMIT: usize = 10_000;

/// Source name used for join/leave/notice lines.
pub const EVENT_SOURCE: &str = "EVENT";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, configuration dialogue not yet run.
    Start,
    /// The owner is inside the configuration dialogue.
    Setup,
    /// Open for business.
    Ready,
    /// Reformatted; returns to `Start` when the owner next enters.
    Reset,
    /// Dead for good.  Entry is refused; members already inside leave
    /// cleanly.
    Final,
}

/// One line of channel history, rendered as `[source] body`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLine {
    pub source: String,
    pub body: String,
}

impl ChannelLine {
    pub fn new(source: &str, body: &str) -> ChannelLine {
        ChannelLine {
            source: source.to_owned(),
            body: body.to_owned(),
        }
    }

    pub fn event(body: String) -> ChannelLine {
        ChannelLine {
            source: EVENT_SOURCE.to_owned(),
            body,
        }
    }

    pub fn render(&self) -> String {
        crate::lines::channel_line(&self.source, &self.body)
    }
}

/// A connected member: the session's username plus its shared handle.
pub struct Member {
    pub name: String,
    pub client: Arc<Client>,
}

pub struct ChannelData {
    /// `None` once the registry binding was deleted.
    pub name: Option<String>,
    pub owner: String,
    /// Empty means no password.
    pub password: String,
    pub buffer: VecDeque<ChannelLine>,
    /// `None` is unlimited (still capped at [`BUFFER_LIMIT`]); zero stores
    /// nothing.
    pub buffer_size: Option<usize>,
    /// `None` replays the whole buffer; zero replays nothing.
    pub replay_size: Option<usize>,
    pub status: Status,
    /// Worker id to member.
    pub connected: HashMap<usize, Member>,
    /// Muted name to the members who muted them.  Values are never empty.
    pub muted_to_muter: HashMap<String, Vec<String>>,
    /// Members scheduled for ejection; duplicates allowed.
    pub kicked: Vec<String>,
    pub banned: Vec<String>,
    /// Last holder of the admin console, for the busy message.
    pub admin_name: String,
}

impl ChannelData {
    fn capacity(&self) -> usize {
        self.buffer_size.unwrap_or(BUFFER_LIMIT).min(BUFFER_LIMIT)
    }
}

/// Outcome of a mute addition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuteAdd {
    Muted,
    AlreadyMuted,
}

pub struct Channel {
    id: u64,
    data: Mutex<ChannelData>,
    admin: Arc<Mutex<()>>,
}

impl Channel {
    pub fn new(id: u64, name: &str, owner: &str) -> Channel {
        Channel::from_data(
            id,
            ChannelData {
                name: Some(name.to_owned()),
                owner: owner.to_owned(),
                password: String::new(),
                buffer: VecDeque::new(),
                buffer_size: None,
                replay_size: Some(10),
                status: Status::Start,
                connected: HashMap::new(),
                muted_to_muter: HashMap::new(),
                kicked: Vec::new(),
                banned: Vec::new(),
                admin_name: String::new(),
            },
        )
    }

    pub fn from_data(id: u64, data: ChannelData) -> Channel {
        Channel {
            id,
            data: Mutex::new(data),
            admin: Arc::new(Mutex::new(())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn lock(&self) -> MutexGuard<'_, ChannelData> {
        self.data.lock().await
    }

    /// Claims the single admin console, without blocking.
    pub fn try_admin(&self) -> Option<OwnedMutexGuard<()>> {
        self.admin.clone().try_lock_owned().ok()
    }

    pub async fn name(&self) -> Option<String> {
        self.data.lock().await.name.clone()
    }

    pub async fn owner(&self) -> String {
        self.data.lock().await.owner.clone()
    }

    pub async fn status(&self) -> Status {
        self.data.lock().await.status
    }

    /// Registers a member under its worker id.
    pub async fn connect(&self, id: usize, name: &str, client: Arc<Client>) {
        let mut data = self.data.lock().await;
        data.connected.insert(
            id,
            Member {
                name: name.to_owned(),
                client,
            },
        );
    }

    /// Drops the member and sweeps its leftover kick entries.
    pub async fn depart(&self, id: usize, name: &str) {
        let mut data = self.data.lock().await;
        data.kicked.retain(|k| k != name);
        data.connected.remove(&id);
    }

    pub async fn connected_count(&self) -> usize {
        self.data.lock().await.connected.len()
    }

    pub async fn member_names(&self) -> Vec<String> {
        let data = self.data.lock().await;
        let mut names: Vec<String> = data.connected.values().map(|m| m.name.clone()).collect();
        names.sort();
        names
    }

    pub async fn is_banned(&self, name: &str) -> bool {
        self.data.lock().await.banned.iter().any(|b| b == name)
    }

    /// Appends one line to the history, trimming the head down to the
    /// effective capacity.  A capacity of zero stores nothing; the line is
    /// still returned for broadcast.
    pub async fn add_line(&self, source: &str, body: &str) -> ChannelLine {
        let mut data = self.data.lock().await;
        let line = ChannelLine::new(source, body);
        let capacity = data.capacity();
        if capacity > 0 {
            data.buffer.push_back(line.clone());
            while data.buffer.len() > capacity {
                data.buffer.pop_front();
            }
        }
        line
    }

    /// Delivers one line to the current members.
    ///
    /// Members scheduled for ejection and members who muted the source are
    /// skipped.  `echo` controls whether the sender (identified by worker
    /// id) receives its own line; events exclude it.
    pub async fn broadcast(&self, line: &ChannelLine, echo: bool, sender: usize) {
        let data = self.data.lock().await;
        let text = line.render();
        let muters = data.muted_to_muter.get(&line.source);
        for (&id, member) in &data.connected {
            if data.kicked.iter().any(|k| *k == member.name) {
                continue;
            }
            if muters.is_some_and(|m| m.iter().any(|n| *n == member.name)) {
                continue;
            }
            if !echo && id == sender {
                continue;
            }
            member.client.print(&text);
        }
    }

    /// The lines a fresh entrant is shown: the last `replay_size`, the
    /// whole buffer when unset, nothing when zero.
    pub async fn replay_lines(&self) -> Vec<ChannelLine> {
        let data = self.data.lock().await;
        let take = match data.replay_size {
            None => data.buffer.len(),
            Some(n) => n.min(data.buffer.len()),
        };
        data.buffer
            .iter()
            .skip(data.buffer.len() - take)
            .cloned()
            .collect()
    }

    pub async fn buffer_snapshot(&self) -> Vec<ChannelLine> {
        self.data.lock().await.buffer.iter().cloned().collect()
    }

    /// Schedules a connected member for ejection.  False when nobody by
    /// that name is inside.
    pub async fn kick_connected(&self, name: &str) -> bool {
        let mut data = self.data.lock().await;
        if data.connected.values().any(|m| m.name == name) {
            data.kicked.push(name.to_owned());
            true
        } else {
            false
        }
    }

    /// Consumes one pending kick for `name`, if any.
    pub async fn take_kick(&self, name: &str) -> bool {
        let mut data = self.data.lock().await;
        match data.kicked.iter().position(|k| k == name) {
            Some(at) => {
                data.kicked.remove(at);
                true
            }
            None => false,
        }
    }

    /// Adds `name` to the ban list.  False when already present.
    pub async fn add_ban(&self, name: &str) -> bool {
        let mut data = self.data.lock().await;
        if data.banned.iter().any(|b| b == name) {
            false
        } else {
            data.banned.push(name.to_owned());
            true
        }
    }

    pub async fn del_ban(&self, name: &str) -> bool {
        let mut data = self.data.lock().await;
        match data.banned.iter().position(|b| b == name) {
            Some(at) => {
                data.banned.remove(at);
                true
            }
            None => false,
        }
    }

    pub async fn banned_names(&self) -> Vec<String> {
        self.data.lock().await.banned.clone()
    }

    /// Records that `muter` no longer wants to hear `muted`.
    pub async fn add_mute(&self, muted: &str, muter: &str) -> MuteAdd {
        let mut data = self.data.lock().await;
        let muters = data.muted_to_muter.entry(muted.to_owned()).or_default();
        if muters.iter().any(|m| m == muter) {
            MuteAdd::AlreadyMuted
        } else {
            muters.push(muter.to_owned());
            MuteAdd::Muted
        }
    }

    /// Undoes a mute.  Empty muter lists are dropped so the map never
    /// carries dead keys.
    pub async fn del_mute(&self, muted: &str, muter: &str) -> bool {
        let mut data = self.data.lock().await;
        let Some(muters) = data.muted_to_muter.get_mut(muted) else {
            return false;
        };
        let Some(at) = muters.iter().position(|m| m == muter) else {
            return false;
        };
        muters.remove(at);
        if muters.is_empty() {
            data.muted_to_muter.remove(muted);
        }
        true
    }

    /// Everyone `muter` has muted here.
    pub async fn mutes_of(&self, muter: &str) -> Vec<String> {
        let data = self.data.lock().await;
        let mut names: Vec<String> = data
            .muted_to_muter
            .iter()
            .filter(|(_, muters)| muters.iter().any(|m| m == muter))
            .map(|(muted, _)| muted.clone())
            .collect();
        names.sort();
        names
    }

    /// Finds the connected target of a whisper, unless the target has muted
    /// the sender; inbox delivery handles the rest.
    pub async fn whisper_target(&self, sender: &str, target: &str) -> Option<Arc<Client>> {
        let data = self.data.lock().await;
        if data
            .muted_to_muter
            .get(sender)
            .is_some_and(|muters| muters.iter().any(|m| m == target))
        {
            return None;
        }
        data.connected
            .values()
            .find(|m| m.name == target)
            .map(|m| m.client.clone())
    }

    /// Purges every trace of a deleted account: bans, pending kicks, mute
    /// keys and mute list entries.
    pub async fn purge_name(&self, name: &str) {
        let mut data = self.data.lock().await;
        data.banned.retain(|b| b != name);
        data.kicked.retain(|k| k != name);
        data.muted_to_muter.remove(name);
        data.muted_to_muter.retain(|_, muters| {
            muters.retain(|m| m != name);
            !muters.is_empty()
        });
    }

    /// Restores the new-channel condition with `owner` in charge.  Status
    /// is left for the caller, which is what separates `reset` from
    /// `finalize`.
    pub async fn reset_by(&self, owner: &str) {
        let mut data = self.data.lock().await;
        data.owner = owner.to_owned();
        data.password.clear();
        data.buffer.clear();
        data.buffer_size = None;
        data.replay_size = Some(10);
        data.muted_to_muter.clear();
        data.banned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MessageQueueItem;
    use tokio::sync::mpsc;

    fn member() -> (Arc<Client>, mpsc::UnboundedReceiver<MessageQueueItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 40002));
        (Arc::new(Client::new(addr, tx)), rx)
    }

    fn received(queue: &mut mpsc::UnboundedReceiver<MessageQueueItem>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(item) = queue.try_recv() {
            out.push(item.as_ref().to_owned());
        }
        out
    }

    #[tokio::test]
    async fn buffer_keeps_the_last_capacity_lines() {
        let channel = Channel::new(1, "main", "alice");
        channel.lock().await.buffer_size = Some(3);
        for i in 0..5 {
            channel.add_line("alice", &format!("L{}", i)).await;
        }
        let bodies: Vec<String> = channel
            .buffer_snapshot()
            .await
            .into_iter()
            .map(|l| l.body)
            .collect();
        assert_eq!(bodies, vec!["L2", "L3", "L4"]);
    }

    #[tokio::test]
    async fn zero_capacity_stores_nothing_but_still_returns_the_line() {
        let channel = Channel::new(1, "main", "alice");
        channel.lock().await.buffer_size = Some(0);
        let line = channel.add_line("alice", "gone").await;
        assert_eq!(line.body, "gone");
        assert!(channel.buffer_snapshot().await.is_empty());
        assert!(channel.replay_lines().await.is_empty());
    }

    #[tokio::test]
    async fn replay_respects_the_configured_window() {
        let channel = Channel::new(1, "main", "alice");
        for i in 1..=12 {
            channel.add_line("alice", &format!("L{}", i)).await;
        }
        // default replay window of 10
        let lines = channel.replay_lines().await;
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0].body, "L3");
        assert_eq!(lines[9].body, "L12");

        channel.lock().await.replay_size = None;
        assert_eq!(channel.replay_lines().await.len(), 12);

        channel.lock().await.replay_size = Some(0);
        assert!(channel.replay_lines().await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_filters_muters_and_echo() {
        let channel = Channel::new(1, "main", "alice");
        let (alice, mut alice_q) = member();
        let (bob, mut bob_q) = member();
        let (carol, mut carol_q) = member();
        channel.connect(1, "alice", alice).await;
        channel.connect(2, "bob", bob).await;
        channel.connect(3, "carol", carol).await;
        channel.add_mute("alice", "bob").await;

        let line = channel.add_line("alice", "hello").await;
        channel.broadcast(&line, true, 1).await;

        assert_eq!(received(&mut alice_q), vec!["[alice] hello\r\n"]);
        assert!(received(&mut bob_q).is_empty());
        assert_eq!(received(&mut carol_q), vec!["[alice] hello\r\n"]);
    }

    #[tokio::test]
    async fn events_skip_their_sender() {
        let channel = Channel::new(1, "main", "alice");
        let (alice, mut alice_q) = member();
        let (bob, mut bob_q) = member();
        channel.connect(1, "alice", alice).await;
        channel.connect(2, "bob", bob).await;

        let event = ChannelLine::event(crate::lines::joining("alice"));
        channel.broadcast(&event, false, 1).await;

        assert!(received(&mut alice_q).is_empty());
        assert_eq!(received(&mut bob_q), vec!["[EVENT] alice is joining.\r\n"]);
    }

    #[tokio::test]
    async fn kicked_members_receive_nothing_until_ejected() {
        let channel = Channel::new(1, "main", "alice");
        let (alice, _alice_q) = member();
        let (bob, mut bob_q) = member();
        channel.connect(1, "alice", alice).await;
        channel.connect(2, "bob", bob).await;
        assert!(channel.kick_connected("bob").await);

        let line = channel.add_line("alice", "bye bob").await;
        channel.broadcast(&line, true, 1).await;
        assert!(received(&mut bob_q).is_empty());

        assert!(channel.take_kick("bob").await);
        assert!(!channel.take_kick("bob").await);
    }

    #[tokio::test]
    async fn mute_add_then_del_restores_the_map() {
        let channel = Channel::new(1, "main", "alice");
        assert_eq!(channel.add_mute("alice", "bob").await, MuteAdd::Muted);
        assert_eq!(channel.add_mute("alice", "bob").await, MuteAdd::AlreadyMuted);
        assert!(channel.del_mute("alice", "bob").await);
        assert!(!channel.del_mute("alice", "bob").await);
        assert!(channel.lock().await.muted_to_muter.is_empty());
    }

    #[tokio::test]
    async fn whispers_fall_back_when_the_target_muted_the_sender() {
        let channel = Channel::new(1, "main", "alice");
        let (bob, _bob_q) = member();
        channel.connect(2, "bob", bob).await;

        assert!(channel.whisper_target("alice", "bob").await.is_some());
        channel.add_mute("alice", "bob").await;
        assert!(channel.whisper_target("alice", "bob").await.is_none());
        assert!(channel.whisper_target("alice", "carol").await.is_none());
    }

    #[tokio::test]
    async fn purge_name_scrubs_every_list() {
        let channel = Channel::new(1, "main", "alice");
        channel.add_ban("bob").await;
        channel.lock().await.kicked.push("bob".to_owned());
        channel.add_mute("bob", "carol").await;
        channel.add_mute("carol", "bob").await;
        channel.purge_name("bob").await;

        let data = channel.lock().await;
        assert!(data.banned.is_empty());
        assert!(data.kicked.is_empty());
        assert!(data.muted_to_muter.is_empty());
    }

    #[tokio::test]
    async fn the_admin_console_is_single_writer() {
        let channel = Channel::new(1, "main", "alice");
        let guard = channel.try_admin().expect("free lock");
        assert!(channel.try_admin().is_none());
        drop(guard);
        assert!(channel.try_admin().is_some());
    }
}
