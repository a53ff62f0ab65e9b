//! Account data.
//!
//! An account outlives any connection.  Its persistent half (password,
//! contacts, inbox, flags) survives restarts; the session half (`online`,
//! the weak back-reference to the live connection) is rebuilt empty on
//! load.  The back-reference must stay weak: the connection owns the
//! account binding, never the other way around.

use crate::client::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, MutexGuard};

/// One inbox message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub source: String,
    pub body: String,
    pub new: bool,
}

impl Message {
    pub fn new(source: &str, body: &str) -> Message {
        Message {
            source: source.to_owned(),
            body: body.to_owned(),
            new: true,
        }
    }
}

pub struct AccountData {
    pub administrator: bool,
    pub password: String,
    pub contacts: Vec<String>,
    pub messages: Vec<Message>,
    pub forgiven: u32,

    // Session half, never persisted.
    pub online: bool,
    pub client: Option<Weak<Client>>,
}

pub struct Account {
    data: Mutex<AccountData>,
}

/// Outcome of a contact addition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactAdd {
    Added,
    Duplicate,
    NoSuchAccount,
}

impl Account {
    pub fn new(administrator: bool) -> Account {
        Account::from_data(AccountData {
            administrator,
            password: String::new(),
            contacts: Vec::new(),
            messages: Vec::new(),
            forgiven: 0,
            online: false,
            client: None,
        })
    }

    pub fn from_data(data: AccountData) -> Account {
        Account {
            data: Mutex::new(data),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, AccountData> {
        self.data.lock().await
    }

    pub async fn is_administrator(&self) -> bool {
        self.data.lock().await.administrator
    }

    pub async fn is_online(&self) -> bool {
        self.data.lock().await.online
    }

    pub async fn password_matches(&self, word: &str) -> bool {
        self.data.lock().await.password == word
    }

    pub async fn set_password(&self, word: &str) {
        self.data.lock().await.password = word.to_owned();
    }

    /// Claims the single online session.  Fails when some other connection
    /// already holds it.
    pub async fn try_login(&self, client: &Arc<Client>) -> bool {
        let mut data = self.data.lock().await;
        if data.online {
            return false;
        }
        data.online = true;
        data.client = Some(Arc::downgrade(client));
        true
    }

    pub async fn set_offline(&self) {
        let mut data = self.data.lock().await;
        data.online = false;
        data.client = None;
    }

    /// Bumps the warning counter and returns its new value.
    pub async fn bump_forgiven(&self) -> u32 {
        let mut data = self.data.lock().await;
        data.forgiven += 1;
        data.forgiven
    }

    pub async fn add_contact(&self, name: &str, exists: bool) -> ContactAdd {
        let mut data = self.data.lock().await;
        if data.contacts.iter().any(|c| c == name) {
            ContactAdd::Duplicate
        } else if exists {
            data.contacts.push(name.to_owned());
            ContactAdd::Added
        } else {
            ContactAdd::NoSuchAccount
        }
    }

    pub async fn remove_contact(&self, name: &str) -> bool {
        let mut data = self.data.lock().await;
        match data.contacts.iter().position(|c| c == name) {
            Some(at) => {
                data.contacts.remove(at);
                true
            }
            None => false,
        }
    }

    pub async fn contacts(&self) -> Vec<String> {
        self.data.lock().await.contacts.clone()
    }

    pub async fn purge_contacts(&self) {
        self.data.lock().await.contacts.clear();
    }

    pub async fn purge_messages(&self) {
        self.data.lock().await.messages.clear();
    }

    /// Appends an inbox message and, when the account is online, tells the
    /// live connection about it.
    pub async fn push_message(&self, source: &str, body: &str) {
        let mut data = self.data.lock().await;
        data.messages.push(Message::new(source, body));
        notify(&data, &crate::lines::message_event(source));
    }

    pub async fn new_message_count(&self) -> usize {
        let data = self.data.lock().await;
        data.messages.iter().filter(|m| m.new).count()
    }

    /// Shows `text` on the account's live connection, if any.
    pub async fn broadcast(&self, text: &str) {
        let data = self.data.lock().await;
        notify(&data, text);
    }

    /// Severs the account's live connection, if any.
    pub async fn force_disconnect(&self) {
        let data = self.data.lock().await;
        if data.online {
            if let Some(client) = data.client.as_ref().and_then(Weak::upgrade) {
                client.close();
            }
        }
    }
}

fn notify(data: &AccountData, text: &str) {
    if data.online {
        if let Some(client) = data.client.as_ref().and_then(Weak::upgrade) {
            client.print(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_client() -> (
        Arc<Client>,
        mpsc::UnboundedReceiver<crate::client::MessageQueueItem>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 40001));
        (Arc::new(Client::new(addr, tx)), rx)
    }

    #[tokio::test]
    async fn only_one_session_can_be_online() {
        let (client, _queue) = test_client();
        let account = Account::new(false);
        assert!(account.try_login(&client).await);
        assert!(!account.try_login(&client).await);
        account.set_offline().await;
        assert!(account.try_login(&client).await);
    }

    #[tokio::test]
    async fn push_message_notifies_the_live_connection() {
        let (client, mut queue) = test_client();
        let account = Account::new(false);
        account.try_login(&client).await;
        account.push_message("alice", "hello there").await;
        assert_eq!(account.new_message_count().await, 1);
        let item = queue.try_recv().unwrap();
        assert_eq!(
            item.as_ref(),
            "[EVENT] alice has sent you a message.\r\n"
        );
    }

    #[tokio::test]
    async fn offline_accounts_collect_messages_silently() {
        let account = Account::new(false);
        account.push_message("alice", "while you were out").await;
        assert_eq!(account.new_message_count().await, 1);
    }

    #[tokio::test]
    async fn contact_addition_outcomes() {
        let account = Account::new(false);
        assert_eq!(account.add_contact("bob", true).await, ContactAdd::Added);
        assert_eq!(account.add_contact("bob", true).await, ContactAdd::Duplicate);
        assert_eq!(
            account.add_contact("ghost", false).await,
            ContactAdd::NoSuchAccount
        );
        assert!(account.remove_contact("bob").await);
        assert!(!account.remove_contact("bob").await);
    }
}
