//! The contact list screen.

use crate::account::{Account, ContactAdd};
use crate::client::Conn;
use crate::handler::{self, Command, Flow, Handler, SessionResult, Step};
use crate::lines;
use crate::state::State;
use async_trait::async_trait;
use std::sync::Arc;

/// Prints the contact list, optionally with online/offline status.
/// Shared with the administrator's account editor.
pub(crate) async fn show_contacts(
    conn: &Conn,
    state: &Arc<State>,
    account: &Arc<Account>,
    status: bool,
) -> SessionResult<()> {
    let contacts = account.contacts().await;
    if contacts.is_empty() {
        return conn.print("Contact list is empty.");
    }
    for (index, name) in contacts.iter().enumerate() {
        if status {
            let online = state.accounts.is_online(name).await;
            conn.print(&format!(
                "({}) {} [{}]",
                index + 1,
                name,
                if online { "ONline" } else { "OFFline" }
            ))?;
        } else {
            conn.print(&format!("({}) {}", index + 1, name))?;
        }
    }
    Ok(())
}

pub struct ContactManager;

impl ContactManager {
    pub fn new() -> ContactManager {
        ContactManager
    }

    async fn who(&self, conn: &mut Conn, args: &[String]) -> SessionResult<String> {
        match args.first() {
            Some(name) => Ok(name.clone()),
            None => conn.input(Some(lines::WHO_PROMPT)).await,
        }
    }
}

impl Default for ContactManager {
    fn default() -> Self {
        ContactManager::new()
    }
}

const COMMANDS: &[Command] = &[
    Command {
        name: "add",
        help: "Add a friend to your contact list.",
    },
    Command {
        name: "exit",
        help: "Exit from this area of the server.",
    },
    Command {
        name: "help",
        help: "Call help with a command name for more information.",
    },
    Command {
        name: "remove",
        help: "Remove someone from your contact list.",
    },
    Command {
        name: "show",
        help: "Display your friend list with online/offline status.",
    },
];

#[async_trait]
impl Handler for ContactManager {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        conn.print(lines::OPENING_CONTACT_MANAGER)?;
        handler::command_loop(self, conn, state, lines::COMMAND_PROMPT).await
    }

    fn commands(&self) -> &'static [Command] {
        COMMANDS
    }

    async fn dispatch(
        &mut self,
        conn: &mut Conn,
        state: &Arc<State>,
        cmd: &str,
        args: &[String],
    ) -> SessionResult<Flow> {
        match cmd {
            "add" => {
                let name = self.who(conn, args).await?;
                let exists = state.accounts.exists(&name).await;
                let account = conn.account()?;
                match account.add_contact(&name, exists).await {
                    ContactAdd::Added => {
                        conn.print(&format!("{} has been added to your contact list.", name))?
                    }
                    ContactAdd::Duplicate => {
                        conn.print(&format!("{} is already in your contact list.", name))?
                    }
                    ContactAdd::NoSuchAccount => {
                        conn.print(&format!("{} does not currently exist.", name))?
                    }
                }
                Ok(Flow::Continue)
            }
            "remove" => {
                let name = self.who(conn, args).await?;
                let account = conn.account()?;
                if account.remove_contact(&name).await {
                    conn.print(&format!("{} has been removed from your contact list.", name))?;
                } else {
                    conn.print(&format!("{} is not in your contact list.", name))?;
                }
                Ok(Flow::Continue)
            }
            "show" => {
                let account = conn.account()?;
                show_contacts(conn, state, &account, true).await?;
                Ok(Flow::Continue)
            }
            _ => unreachable!("unregistered command {}", cmd),
        }
    }
}
