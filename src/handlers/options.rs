//! Per-account settings: password change, purges, self-deletion.

use crate::client::Conn;
use crate::handler::{self, Command, Flow, Handler, SessionError, SessionResult, Step};
use crate::lines;
use crate::state::State;
use crate::util;
use async_trait::async_trait;
use std::sync::Arc;

pub struct AccountOptions;

impl AccountOptions {
    pub fn new() -> AccountOptions {
        AccountOptions
    }

    async fn delete_account(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<Flow> {
        let delete = if args.first().is_some_and(|a| a.as_str() == "force") {
            true
        } else {
            util::yes(&conn.input(Some("Seriously?")).await?)
        };
        if !delete {
            conn.print(lines::CANCELLING)?;
            return Ok(Flow::Continue);
        }
        let name = conn.name()?;
        conn.print("Your account and connection are being closed.")?;
        state.accounts.delete(&name, &state.channels).await;
        conn.client().close();
        Err(SessionError::Closed)
    }

    async fn password(&self, conn: &mut Conn, args: &[String]) -> SessionResult<()> {
        let old = match args.first() {
            Some(old) => old.clone(),
            None => conn.input(Some("Old password:")).await?,
        };
        let account = conn.account()?;
        if !account.password_matches(&old).await {
            conn.print("Old password is not correct.")?;
            return Ok(());
        }
        let new = match args.get(1) {
            Some(new) => new.clone(),
            None => conn.input(Some("New password:")).await?,
        };
        if new.is_empty() {
            conn.print("Your password may not be empty.")?;
        } else {
            account.set_password(&new).await;
            conn.print("Your password has been changed.")?;
        }
        Ok(())
    }

    async fn purge(&self, conn: &mut Conn, args: &[String]) -> SessionResult<()> {
        let what = match args.first() {
            Some(what) => what.clone(),
            None => conn.input(Some("What?")).await?,
        };
        let account = conn.account()?;
        match what.as_str() {
            "messages" => {
                account.purge_messages().await;
                conn.print("All of your messages have been deleted.")
            }
            "contacts" => {
                account.purge_contacts().await;
                conn.print("All of your contacts have been deleted.")
            }
            "both" => {
                account.purge_messages().await;
                account.purge_contacts().await;
                conn.print("Your messages and contacts have been deleted.")
            }
            _ => conn.print("Try messages, contacts, or both."),
        }
    }
}

impl Default for AccountOptions {
    fn default() -> Self {
        AccountOptions::new()
    }
}

const COMMANDS: &[Command] = &[
    Command {
        name: "delete_account",
        help: "Delete your account permanently.",
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
        name: "password",
        help: "Change your password.",
    },
    Command {
        name: "purge",
        help: "Purge your messages, contacts, or both.",
    },
];

#[async_trait]
impl Handler for AccountOptions {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        conn.print(lines::OPENING_ACCOUNT_OPTIONS)?;
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
            "delete_account" => self.delete_account(conn, state, args).await,
            "password" => {
                self.password(conn, args).await?;
                Ok(Flow::Continue)
            }
            "purge" => {
                self.purge(conn, args).await?;
                Ok(Flow::Continue)
            }
            _ => unreachable!("unregistered command {}", cmd),
        }
    }
}
