//! The post-login hub.
//!
//! Everything an account can do branches from here: channels, contacts,
//! the inbox, options, the expression evaluators and the administration
//! console.  The console command doubles as the forgiveness trap: repeat
//! offenders lose their account and their address.

use crate::client::Conn;
use crate::handler::{self, Command, Flow, Handler, SessionError, SessionResult, Step};
use crate::handlers::{
    AccountOptions, AdminConsole, ChannelSession, ContactManager, MessageManager,
    NewMathEvaluator, OldMathEvaluator,
};
use crate::lines;
use crate::state::State;
use crate::util;
use async_trait::async_trait;
use std::sync::Arc;

/// Warnings a non-administrator gets before the trap springs.
pub const MAX_FORGIVENESS: u32 = 2;

pub struct InsideMenu;

impl InsideMenu {
    pub fn new() -> InsideMenu {
        InsideMenu
    }

    async fn print_status(&self, conn: &mut Conn, state: &Arc<State>) -> SessionResult<()> {
        let account = conn.account()?;
        if account.is_administrator().await {
            conn.print(lines::WELCOME_ADMIN)?;
        }
        let new = account.new_message_count().await;
        conn.print(&format!(
            "You have {} new message{}.",
            new,
            util::plural(new)
        ))?;
        let contacts = account.contacts().await;
        let mut online = 0;
        for name in &contacts {
            if state.accounts.is_online(name).await {
                online += 1;
            }
        }
        let total = contacts.len();
        conn.print(&format!(
            "{} of your {} friend{} {} online.",
            online,
            total,
            util::plural(total),
            if online == 1 { "is" } else { "are" }
        ))
    }

    async fn admin(&self, conn: &mut Conn, state: &Arc<State>) -> SessionResult<Flow> {
        let account = conn.account()?;
        if account.is_administrator().await {
            return Ok(Flow::Push(Box::new(AdminConsole::new())));
        }
        let forgiven = account.bump_forgiven().await;
        if forgiven >= MAX_FORGIVENESS {
            let name = conn.name()?;
            state.bans.push(conn.client().ip()).await;
            state.accounts.delete(&name, &state.channels).await;
            log::info!(
                "{}: account {} trapped at the admin console and removed",
                conn.client().addr(),
                name
            );
            conn.print(lines::WARNED_LAST_TIME)?;
            conn.print(lines::ADDRESS_BLOCKED)?;
            conn.print(lines::ACCOUNT_REMOVED_TOO)?;
            conn.client().close();
            return Err(SessionError::Closed);
        }
        conn.print(lines::NOT_AUTHORIZED)?;
        Ok(Flow::Pop)
    }

    async fn channel(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<Flow> {
        let name = match args.first() {
            Some(name) => name.clone(),
            None => conn.input(Some(lines::CHANNEL_PROMPT)).await?,
        };
        if args.len() > 1 || name.split_whitespace().count() > 1 || name.trim() != name {
            conn.print(lines::CHANNEL_HAS_WHITESPACE)?;
            return Ok(Flow::Continue);
        }
        if name.is_empty() {
            conn.print(lines::CHANNEL_EMPTY)?;
            return Ok(Flow::Continue);
        }
        let user = conn.name()?;
        let (channel, _created) = state.channels.open(&name, &user).await;
        conn.print(&format!("Opening the {} channel ...", name))?;
        channel
            .connect(conn.id(), &user, conn.client().clone())
            .await;
        Ok(Flow::Push(Box::new(ChannelSession::new(channel))))
    }

    async fn eval(&self, conn: &mut Conn, args: &[String]) -> SessionResult<Flow> {
        let version = match args.first() {
            Some(version) => version.clone(),
            None => conn.input(Some("Version?")).await?,
        };
        match version.as_str() {
            "old" => Ok(Flow::Push(Box::new(OldMathEvaluator::new()))),
            "new" => Ok(Flow::Push(Box::new(NewMathEvaluator::new()))),
            _ => {
                conn.print("Try old or new.")?;
                Ok(Flow::Continue)
            }
        }
    }
}

impl Default for InsideMenu {
    fn default() -> Self {
        InsideMenu::new()
    }
}

const COMMANDS: &[Command] = &[
    Command {
        name: "admin",
        help: "Access the administration console (if you are an administrator).",
    },
    Command {
        name: "channel",
        help: "Create and connect to message channels.",
    },
    Command {
        name: "contacts",
        help: "Open up your contacts list and edit it.",
    },
    Command {
        name: "eval",
        help: "Proof of concept: a math expression evaluator.",
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
        name: "messages",
        help: "Open up your account's inbox to read and send messages.",
    },
    Command {
        name: "options",
        help: "Change some of your account settings.",
    },
];

#[async_trait]
impl Handler for InsideMenu {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        self.print_status(conn, state).await?;
        let step = handler::command_loop(self, conn, state, lines::COMMAND_PROMPT).await;
        if let Ok(None) = step {
            // Orderly logout; abrupt exits are cleaned up by the driver.
            if let Some(account) = conn.client().account() {
                account.set_offline().await;
            }
            conn.client().unbind();
        }
        step
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
            "admin" => self.admin(conn, state).await,
            "channel" => self.channel(conn, state, args).await,
            "contacts" => Ok(Flow::Push(Box::new(ContactManager::new()))),
            "eval" => self.eval(conn, args).await,
            "messages" => Ok(Flow::Push(Box::new(MessageManager::new()))),
            "options" => Ok(Flow::Push(Box::new(AccountOptions::new()))),
            _ => unreachable!("unregistered command {}", cmd),
        }
    }
}
