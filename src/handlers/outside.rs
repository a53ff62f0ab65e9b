//! The unauthenticated menu: register, login, read about the server.

use crate::account::Account;
use crate::client::Conn;
use crate::handler::{self, Command, Flow, Handler, SessionResult, Step};
use crate::handlers::InsideMenu;
use crate::lines;
use crate::state::State;
use crate::util;
use async_trait::async_trait;
use std::sync::Arc;

pub struct OutsideMenu;

impl OutsideMenu {
    pub fn new() -> OutsideMenu {
        OutsideMenu
    }

    async fn login(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<Flow> {
        let name = match args.first() {
            Some(name) => name.clone(),
            None => conn.input(Some(lines::USERNAME_PROMPT)).await?,
        };
        let word = match args.get(1) {
            Some(word) => word.clone(),
            None => conn.input(Some(lines::PASSWORD_PROMPT)).await?,
        };
        let Some(account) = state.accounts.get(&name).await else {
            conn.print(lines::AUTH_FAILED)?;
            return Ok(Flow::Continue);
        };
        if !account.password_matches(&word).await {
            conn.print(lines::AUTH_FAILED)?;
            return Ok(Flow::Continue);
        }
        if !account.try_login(conn.client()).await {
            conn.print(lines::ALREADY_LOGGED_IN)?;
            return Ok(Flow::Continue);
        }
        Ok(enter(conn, &name, account))
    }

    async fn register(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<Flow> {
        if !self.accept_terms(conn).await? {
            return Ok(Flow::Pop);
        }
        let name = match args.first() {
            Some(name) => name.clone(),
            None => conn.input(Some(lines::USERNAME_PROMPT)).await?,
        };
        if name.split_whitespace().count() > 1 || name.trim() != name {
            conn.print(lines::NAME_HAS_WHITESPACE)?;
            return Ok(Flow::Continue);
        }
        if name.is_empty() {
            conn.print(lines::NAME_EMPTY)?;
            return Ok(Flow::Continue);
        }
        // Reserve the name before prompting, so nobody takes it while the
        // client types a password.
        let Some(account) = state.accounts.register(&name).await else {
            conn.print(lines::ACCOUNT_EXISTS)?;
            return Ok(Flow::Continue);
        };
        let word = match args.get(1) {
            Some(word) => word.clone(),
            None => match conn.input(Some(lines::PASSWORD_PROMPT)).await {
                Ok(word) => word,
                Err(err) => {
                    state.accounts.unregister(&name).await;
                    return Err(err);
                }
            },
        };
        if word.is_empty() || word.split_whitespace().count() != 1 || word.trim() != word {
            state.accounts.unregister(&name).await;
            conn.print(lines::PASSWORD_HAS_WHITESPACE)?;
            return Ok(Flow::Continue);
        }
        account.set_password(&word).await;
        if !account.try_login(conn.client()).await {
            conn.print(lines::ALREADY_LOGGED_IN)?;
            return Ok(Flow::Continue);
        }
        log::info!("Account {} registered", name);
        Ok(enter(conn, &name, account))
    }

    async fn accept_terms(&self, conn: &mut Conn) -> SessionResult<bool> {
        conn.print(lines::TERMS_OF_SERVICE)?;
        let answer = conn.input(Some(lines::TERMS_PROMPT)).await?;
        Ok(util::yes(&answer))
    }

    async fn open_source(&self, conn: &mut Conn, args: &[String]) -> SessionResult<()> {
        let show = if args.first().is_some_and(|a| a.as_str() == "show") {
            true
        } else {
            util::yes(&conn.input(Some("Are you sure?")).await?)
        };
        if show {
            conn.print(lines::ABOUT)?;
        }
        Ok(())
    }
}

/// Binds the freshly authenticated account to this connection and moves
/// on to the inside menu.
fn enter(conn: &Conn, name: &str, account: Arc<Account>) -> Flow {
    conn.client().bind(name, account);
    Flow::Push(Box::new(InsideMenu::new()))
}

impl Default for OutsideMenu {
    fn default() -> Self {
        OutsideMenu::new()
    }
}

const COMMANDS: &[Command] = &[
    Command {
        name: "exit",
        help: "Exit from this area of the server.",
    },
    Command {
        name: "help",
        help: "Call help with a command name for more information.",
    },
    Command {
        name: "login",
        help: "Login to the server to access your account.",
    },
    Command {
        name: "open_source",
        help: "Learn where this server's source is maintained.",
    },
    Command {
        name: "register",
        help: "Register for an account using this command.",
    },
];

#[async_trait]
impl Handler for OutsideMenu {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        conn.print(&state.banner)?;
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
            "login" => self.login(conn, state, args).await,
            "register" => self.register(conn, state, args).await,
            "open_source" => {
                self.open_source(conn, args).await?;
                Ok(Flow::Continue)
            }
            _ => unreachable!("unregistered command {}", cmd),
        }
    }
}
