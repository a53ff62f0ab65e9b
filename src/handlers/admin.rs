//! The server administration console and the account editor it opens.
//!
//! Reached from the inside menu, administrators only; the inside menu has
//! already dealt with impostors.

use crate::account::Account;
use crate::client::Conn;
use crate::handler::{self, Command, Flow, Handler, SessionError, SessionResult, Step};
use crate::lines;
use crate::state::State;
use crate::util;
use async_trait::async_trait;
use std::sync::Arc;

/// How far a shutdown reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Shutdown {
    /// Stop accepting; disconnect connections that never logged in.
    Server,
    /// Also disconnect every non-administrator account.
    Users,
    /// Also disconnect the other administrators.
    Admin,
    /// Also disconnect the caller.
    All,
}

impl Shutdown {
    fn parse(word: &str) -> Option<Shutdown> {
        match word {
            "server" => Some(Shutdown::Server),
            "users" => Some(Shutdown::Users),
            "admin" => Some(Shutdown::Admin),
            "all" => Some(Shutdown::All),
            _ => None,
        }
    }
}

pub struct AdminConsole;

impl AdminConsole {
    pub fn new() -> AdminConsole {
        AdminConsole
    }

    async fn account(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<Flow> {
        match args.first().map(String::as_str) {
            Some("view") => {
                self.print_names(conn, &state.accounts.names().await)?;
                Ok(Flow::Continue)
            }
            Some("remove") => {
                self.account_remove(conn, state, &args[1..]).await?;
                Ok(Flow::Continue)
            }
            Some("edit") => self.account_edit(conn, state, &args[1..]).await,
            _ => {
                conn.print("Try view, remove, or edit.")?;
                Ok(Flow::Continue)
            }
        }
    }

    fn print_names(&self, conn: &Conn, names: &[String]) -> SessionResult<()> {
        for (index, name) in names.iter().enumerate() {
            conn.print(&format!("({}) {}", index + 1, name))?;
        }
        Ok(())
    }

    async fn account_remove(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let name = match args.first() {
            Some(name) => name.clone(),
            None => match self.pick_account_name(conn, state).await? {
                Some(name) => name,
                None => return Ok(()),
            },
        };
        if name == conn.name()? {
            conn.print("You cannot remove yourself.")?;
            return Ok(());
        }
        let Some(account) = state.accounts.get(&name).await else {
            conn.print("Account does not exist.")?;
            return Ok(());
        };
        account.force_disconnect().await;
        state.accounts.delete(&name, &state.channels).await;
        conn.print("Account has been removed.")
    }

    async fn account_edit(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<Flow> {
        let name = match args.first() {
            Some(name) => name.clone(),
            None => match self.pick_account_name(conn, state).await? {
                Some(name) => name,
                None => return Ok(Flow::Continue),
            },
        };
        if name == conn.name()? {
            conn.print("You may not edit yourself.")?;
            return Ok(Flow::Continue);
        }
        let Some(account) = state.accounts.get(&name).await else {
            conn.print("Unable to access account.")?;
            return Ok(Flow::Continue);
        };
        Ok(Flow::Push(Box::new(AccountEditor::new(name, account))))
    }

    /// Lists every other account and reads a pick by number.
    async fn pick_account_name(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
    ) -> SessionResult<Option<String>> {
        let own = conn.name()?;
        let names: Vec<String> = state
            .accounts
            .names()
            .await
            .into_iter()
            .filter(|name| *name != own)
            .collect();
        if names.is_empty() {
            conn.print("There are no other accounts.")?;
            return Ok(None);
        }
        self.print_names(conn, &names)?;
        let answer = conn.input(Some("Account number?")).await?;
        match answer.parse::<usize>() {
            Ok(number) if (1..=names.len()).contains(&number) => {
                Ok(Some(names[number - 1].clone()))
            }
            _ => {
                conn.print("You must enter a valid number.")?;
                Ok(None)
            }
        }
    }

    async fn ban(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        match args.first().map(String::as_str) {
            Some("view") => self.ban_view(conn, &state.bans.snapshot().await),
            Some("add") => self.ban_add(conn, state, &args[1..]).await,
            Some("remove") => self.ban_remove(conn, state, &args[1..]).await,
            _ => conn.print("Try view, add, or remove."),
        }
    }

    fn ban_view(&self, conn: &Conn, entries: &[String]) -> SessionResult<()> {
        if entries.is_empty() {
            conn.print("No one is in the ban list.")
        } else {
            self.print_names(conn, entries)
        }
    }

    async fn ban_add(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let addr = match args.first() {
            Some(addr) => addr.clone(),
            None => conn.input(Some("Address:")).await?,
        };
        if addr.is_empty() {
            conn.print("Empty address may not be added.")?;
        } else if state.bans.add(&addr).await {
            conn.print("Address has been successfully added.")?;
        } else {
            conn.print("Address is already in ban list.")?;
        }
        Ok(())
    }

    async fn ban_remove(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        if let Some(addr) = args.first() {
            if !state.bans.remove_all(addr).await {
                conn.print("Address not found.")?;
                return Ok(());
            }
        } else {
            let entries = state.bans.snapshot().await;
            self.ban_view(conn, &entries)?;
            if entries.is_empty() {
                return Ok(());
            }
            let answer = conn.input(Some("Item number?")).await?;
            match answer.parse::<usize>() {
                Ok(number) if (1..=entries.len()).contains(&number) => {
                    state.bans.remove_all(&entries[number - 1]).await;
                }
                _ => {
                    conn.print("You must enter a valid number.")?;
                    return Ok(());
                }
            }
        }
        conn.print("Address has been removed.")
    }

    async fn channels(&self, conn: &mut Conn, state: &Arc<State>) -> SessionResult<()> {
        let names = state.channels.names().await;
        if names.is_empty() {
            conn.print("There are no channels at this time.")
        } else {
            let header = format!(
                "Channel{}currently in existence:",
                if names.len() == 1 { " " } else { "s " }
            );
            conn.print_list(&header, &names)
        }
    }

    async fn shutdown(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let Some(level) = args.first().and_then(|a| Shutdown::parse(a)) else {
            conn.print("Try server, users, admin, or all.")?;
            return Ok(());
        };
        let message = lines::shutting_down(&conn.name()?);
        self.shutdown_server(conn, state, &message).await?;
        if level > Shutdown::Server {
            self.disconnect_accounts(conn, state, &message, level).await?;
        }
        Ok(())
    }

    /// Stops the listener and drops the connections that never made it
    /// past the outside menu.
    async fn shutdown_server(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        message: &str,
    ) -> SessionResult<()> {
        let Some(clients) = state.net.begin_shutdown().await else {
            conn.print("Server was already closed.")?;
            return Ok(());
        };
        log::info!("Shutdown requested by {}", conn.name()?);
        conn.print("Server has been shutdown.")?;
        let mut count = 0;
        for client in clients {
            if client.name().is_none() {
                client.print(message);
                client.close();
                count += 1;
            }
        }
        conn.print(&format!(
            "{} sleeper{} disconnected.",
            count,
            if count == 1 { " was" } else { "s were" }
        ))
    }

    async fn disconnect_accounts(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        message: &str,
        level: Shutdown,
    ) -> SessionResult<()> {
        let own = conn.account()?;
        for (_, account) in state.accounts.snapshot().await {
            if Arc::ptr_eq(&own, &account) {
                continue;
            }
            if level > Shutdown::Users || !account.is_administrator().await {
                account.broadcast(message).await;
                account.force_disconnect().await;
            }
        }
        conn.print("Shutdown process has been completed.")?;
        if level == Shutdown::All {
            conn.client().close();
            return Err(SessionError::Closed);
        }
        Ok(())
    }
}

impl Default for AdminConsole {
    fn default() -> Self {
        AdminConsole::new()
    }
}

const CONSOLE_COMMANDS: &[Command] = &[
    Command {
        name: "account",
        help: "Access all account related controls.",
    },
    Command {
        name: "ban",
        help: "Access all address ban filter controls.",
    },
    Command {
        name: "channels",
        help: "View a list of all current channels.",
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
        name: "shutdown",
        help: "Arrange for the server to shutdown and save its data.",
    },
];

#[async_trait]
impl Handler for AdminConsole {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        conn.print(lines::OPENING_ADMIN_CONSOLE)?;
        handler::command_loop(self, conn, state, lines::COMMAND_PROMPT).await
    }

    fn commands(&self) -> &'static [Command] {
        CONSOLE_COMMANDS
    }

    async fn dispatch(
        &mut self,
        conn: &mut Conn,
        state: &Arc<State>,
        cmd: &str,
        args: &[String],
    ) -> SessionResult<Flow> {
        match cmd {
            "account" => self.account(conn, state, args).await,
            "ban" => {
                self.ban(conn, state, args).await?;
                Ok(Flow::Continue)
            }
            "channels" => {
                self.channels(conn, state).await?;
                Ok(Flow::Continue)
            }
            "shutdown" => {
                self.shutdown(conn, state, args).await?;
                Ok(Flow::Continue)
            }
            _ => unreachable!("unregistered command {}", cmd),
        }
    }
}

/// Administrator's view of one other account.
pub struct AccountEditor {
    name: String,
    account: Arc<Account>,
}

impl AccountEditor {
    pub fn new(name: String, account: Arc<Account>) -> AccountEditor {
        AccountEditor { name, account }
    }

    async fn edit(&self, conn: &mut Conn, args: &[String]) -> SessionResult<()> {
        let attr = match args.first() {
            Some(attr) => attr.clone(),
            None => conn.input(Some("What?")).await?,
        };
        match attr.as_str() {
            "admin" => {
                let admin = {
                    let mut data = self.account.lock().await;
                    data.administrator = !data.administrator;
                    data.administrator
                };
                conn.print(&format!(
                    "{} is {}an administrator now.",
                    self.name,
                    if admin { "" } else { "not " }
                ))
            }
            "password" => {
                let word = match args.get(1) {
                    Some(word) => word.clone(),
                    None => conn.input(Some(lines::PASSWORD_PROMPT)).await?,
                };
                self.account.set_password(&word).await;
                conn.print(&format!("Password has been changed to {:?}", word))
            }
            "forgiven" => {
                let reset = if args.get(1).is_some_and(|a| a.as_str() == "reset") {
                    true
                } else {
                    util::yes(&conn.input(Some("Reset?")).await?)
                };
                if reset {
                    self.account.lock().await.forgiven = 0;
                    conn.print("Forgiven count has been set to zero.")?;
                }
                Ok(())
            }
            _ => conn.print("Try admin, password, or forgiven."),
        }
    }

    async fn info(&self, conn: &mut Conn) -> SessionResult<()> {
        conn.print(&format!("About account {:?}:", self.name))?;
        let data = self.account.lock().await;
        conn.print(&format!("Admin    = {}", data.administrator))?;
        conn.print(&format!("Online   = {}", data.online))?;
        conn.print(&format!("Friends  = {}", data.contacts.len()))?;
        conn.print(&format!("Messages = {}", data.messages.len()))?;
        conn.print(&format!("Forgiven = {}", data.forgiven))
    }

    async fn password(&self, conn: &mut Conn) -> SessionResult<()> {
        conn.print(&format!("Username: {:?}", self.name))?;
        let data = self.account.lock().await;
        conn.print(&format!("Password: {:?}", data.password))
    }

    async fn read(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let attr = match args.first() {
            Some(attr) => attr.clone(),
            None => conn.input(Some("Contacts or messages?")).await?,
        };
        match attr.as_str() {
            "contacts" => {
                conn.print(&format!("{}'s contact list:", self.name))?;
                crate::handlers::contacts::show_contacts(conn, state, &self.account, false).await
            }
            "messages" => {
                conn.print("First 70 bytes of each message:")?;
                crate::handlers::messages::show_summary(
                    conn,
                    &self.account,
                    false,
                    crate::handlers::messages::Filter::All,
                )
                .await
                .map(|_| ())
            }
            _ => conn.print("Try contacts or messages."),
        }
    }
}

const EDITOR_COMMANDS: &[Command] = &[
    Command {
        name: "edit",
        help: "Change various attributes of the account.",
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
        name: "info",
        help: "Show information about the current account.",
    },
    Command {
        name: "password",
        help: "Show the password on the account.",
    },
    Command {
        name: "read",
        help: "Show the account's contact list or read message summaries.",
    },
];

#[async_trait]
impl Handler for AccountEditor {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        conn.print(lines::OPENING_ACCOUNT_EDITOR)?;
        handler::command_loop(self, conn, state, lines::COMMAND_PROMPT).await
    }

    fn commands(&self) -> &'static [Command] {
        EDITOR_COMMANDS
    }

    async fn dispatch(
        &mut self,
        conn: &mut Conn,
        state: &Arc<State>,
        cmd: &str,
        args: &[String],
    ) -> SessionResult<Flow> {
        match cmd {
            "edit" => {
                self.edit(conn, args).await?;
                Ok(Flow::Continue)
            }
            "info" => {
                self.info(conn).await?;
                Ok(Flow::Continue)
            }
            "password" => {
                self.password(conn).await?;
                Ok(Flow::Continue)
            }
            "read" => {
                self.read(conn, state, args).await?;
                Ok(Flow::Continue)
            }
            _ => unreachable!("unregistered command {}", cmd),
        }
    }
}
