//! Testing utilities for the shared state and the screens.

use super::State;
use crate::client::{Client, Conn, MessageQueueItem};
use crate::config::Config;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

pub(crate) type Queue = mpsc::UnboundedReceiver<MessageQueueItem>;

pub(crate) fn test_state() -> Arc<State> {
    State::new(Config::default(), None)
}

fn test_addr(id: usize) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 41000 + id as u16))
}

/// A connection whose entire input is scripted up front.  The script runs
/// out as an end of stream, which unwinds the worker like any dropped
/// peer.
pub(crate) fn script_conn(id: usize, script: &str) -> (Conn, Queue) {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = Arc::new(Client::new(test_addr(id), tx));
    let reader = Cursor::new(script.as_bytes().to_vec());
    (Conn::new(id, Box::new(reader), client), rx)
}

/// A connection fed interactively through the returned duplex handle.
pub(crate) fn live_conn(id: usize) -> (Conn, DuplexStream, Queue) {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = Arc::new(Client::new(test_addr(id), tx));
    let (feed, read_end) = tokio::io::duplex(1 << 16);
    (Conn::new(id, Box::new(read_end), client), feed, rx)
}

/// Everything the connection was sent so far, as one string.
pub(crate) fn drain(queue: &mut Queue) -> String {
    let mut out = String::new();
    while let Ok(item) = queue.try_recv() {
        out.push_str(item.as_ref());
    }
    out
}

/// Registers an account the short way, bypassing the outside menu.
pub(crate) async fn add_account(state: &State, name: &str, password: &str) -> Arc<crate::account::Account> {
    let account = state
        .accounts
        .register(name)
        .await
        .expect("fresh account name");
    account.set_password(password).await;
    account
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MuteAdd;

    #[tokio::test]
    async fn the_first_account_is_the_administrator() {
        let state = test_state();
        let alice = add_account(&state, "alice", "pw1").await;
        let bob = add_account(&state, "bob", "pw2").await;
        assert!(alice.is_administrator().await);
        assert!(!bob.is_administrator().await);
    }

    #[tokio::test]
    async fn names_are_reserved_once() {
        let state = test_state();
        add_account(&state, "alice", "pw").await;
        assert!(state.accounts.register("alice").await.is_none());
    }

    #[tokio::test]
    async fn register_then_delete_restores_the_registry() {
        let state = test_state();
        add_account(&state, "alice", "pw").await;
        assert!(state.accounts.delete("alice", &state.channels).await);
        assert!(state.accounts.names().await.is_empty());
        // the next registrant is first again, so administrator again
        let again = add_account(&state, "bob", "pw").await;
        assert!(again.is_administrator().await);
    }

    #[tokio::test]
    async fn deletion_cascades_through_contacts_and_channels() {
        let state = test_state();
        add_account(&state, "alice", "pw").await;
        let bob = add_account(&state, "bob", "pw").await;
        bob.add_contact("alice", true).await;

        let (channel, _) = state.channels.open("main", "bob").await;
        channel.add_ban("alice").await;
        channel.lock().await.kicked.push("alice".to_owned());
        channel.add_mute("alice", "bob").await;
        channel.add_mute("bob", "alice").await;

        assert!(state.accounts.delete("alice", &state.channels).await);

        assert!(!bob.contacts().await.iter().any(|c| c == "alice"));
        let data = channel.lock().await;
        assert!(data.banned.is_empty());
        assert!(data.kicked.is_empty());
        assert!(data.muted_to_muter.is_empty());
    }

    #[tokio::test]
    async fn delivery_to_a_missing_account_reports_failure() {
        let state = test_state();
        assert!(!state.accounts.deliver("alice", "ghost", "boo").await);
        add_account(&state, "bob", "pw").await;
        assert!(state.accounts.deliver("alice", "bob", "hi").await);
    }

    #[tokio::test]
    async fn channel_ids_are_stable_and_names_unique() {
        let state = test_state();
        let (main, created) = state.channels.open("main", "alice").await;
        assert!(created);
        let (same, created) = state.channels.open("main", "bob").await;
        assert!(!created);
        assert_eq!(main.id(), same.id());
        assert_eq!(main.owner().await, "alice");

        let (other, _) = state.channels.open("other", "bob").await;
        assert_ne!(main.id(), other.id());
    }

    #[tokio::test]
    async fn deleting_a_name_keeps_the_channel_object() {
        let state = test_state();
        let (channel, _) = state.channels.open("main", "alice").await;
        assert!(state.channels.delete_name("main").await);
        assert!(state.channels.get("main").await.is_none());
        assert!(state
            .channels
            .all()
            .await
            .iter()
            .any(|c| c.id() == channel.id()));
        // the name is free again for a brand-new channel
        let (fresh, created) = state.channels.open("main", "bob").await;
        assert!(created);
        assert_ne!(fresh.id(), channel.id());
    }

    #[tokio::test]
    async fn rename_refuses_taken_names() {
        let state = test_state();
        state.channels.open("main", "alice").await;
        state.channels.open("other", "alice").await;
        assert_eq!(state.channels.rename("main", "other").await, Some(false));
        assert_eq!(state.channels.rename("main", "fresh").await, Some(true));
        assert_eq!(state.channels.rename("gone", "x").await, None);
        assert!(state.channels.exists("fresh").await);
        assert!(!state.channels.exists("main").await);
    }

    #[tokio::test]
    async fn mute_round_trip_is_clean() {
        let state = test_state();
        let (channel, _) = state.channels.open("main", "alice").await;
        assert_eq!(channel.add_mute("alice", "bob").await, MuteAdd::Muted);
        assert!(channel.del_mute("alice", "bob").await);
        assert!(channel.lock().await.muted_to_muter.is_empty());
    }

    #[tokio::test]
    async fn ban_list_matches_names_case_insensitively() {
        let state = test_state();
        state.bans.add("EVIL.example.org").await;
        state.bans.add("10.0.0.7").await;
        assert!(state.bans.matches_name("evil.example.ORG").await);
        assert!(state.bans.contains("10.0.0.7").await);
        assert!(!state.bans.contains("10.0.0.8").await);
        assert!(state.bans.remove_all("10.0.0.7").await);
        assert!(!state.bans.contains("10.0.0.7").await);
    }

    #[tokio::test]
    async fn shutdown_stops_the_connection_table() {
        let state = test_state();
        let (conn, _queue) = script_conn(0, "");
        let id = state.net.insert(conn.client().clone()).await.expect("running");
        let snapshot = state.net.begin_shutdown().await.expect("first shutdown");
        assert_eq!(snapshot.len(), 1);
        assert!(state.net.begin_shutdown().await.is_none());
        assert!(state.net.insert(conn.client().clone()).await.is_none());
        state.net.remove(id).await;
    }
}
