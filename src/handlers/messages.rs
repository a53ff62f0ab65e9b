//! The inbox screen: compose, summaries, reading, deletion.

use crate::account::Account;
use crate::client::Conn;
use crate::handler::{self, Command, Flow, Handler, SessionResult, Step};
use crate::lines;
use crate::state::State;
use crate::util;
use async_trait::async_trait;
use std::sync::Arc;

const PREVIEW_LENGTH: usize = 70;

/// Which messages a summary covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Filter {
    All,
    /// `true` selects unread.
    Status(bool),
    Source(String),
}

/// Prints a summary of the selected messages and returns their indices in
/// the account's inbox, in display order.  Also used by the account
/// editor's read-only view.
pub(crate) async fn show_summary(
    conn: &Conn,
    account: &Arc<Account>,
    status: bool,
    filter: Filter,
) -> SessionResult<Vec<usize>> {
    let mut picked = Vec::new();
    let data = account.lock().await;
    let selected: Vec<(usize, &crate::account::Message)> = data
        .messages
        .iter()
        .enumerate()
        .filter(|(_, message)| match &filter {
            Filter::All => true,
            Filter::Status(unread) => message.new == *unread,
            Filter::Source(source) => message.source == *source,
        })
        .collect();
    if selected.is_empty() {
        conn.print("There are no messages.")?;
        return Ok(picked);
    }
    for (position, (index, message)) in selected.iter().enumerate() {
        let statext = if status {
            if message.new {
                " [UNread]"
            } else {
                " [read]"
            }
        } else {
            ""
        };
        conn.print(&format!(
            "Message {} from {}{}:",
            position + 1,
            message.source,
            statext
        ))?;
        conn.print(&format!(
            "    {}",
            util::preview(&message.body, PREVIEW_LENGTH)
        ))?;
        picked.push(*index);
    }
    Ok(picked)
}

pub struct MessageManager;

impl MessageManager {
    pub fn new() -> MessageManager {
        MessageManager
    }

    /// Resolves the user's message choice to inbox indices.  With an
    /// argument: a 1-based index into the whole inbox, `all` for
    /// everything (deletion only), `read`/`unread` or a source name for a
    /// filtered summary followed by a pick.  Without: a full summary
    /// followed by a pick.
    async fn select(
        &self,
        conn: &mut Conn,
        account: &Arc<Account>,
        args: &[String],
        allow_all: bool,
    ) -> SessionResult<Vec<usize>> {
        let Some(clue) = args.first() else {
            let shown = show_summary(conn, account, true, Filter::All).await?;
            return self.pick(conn, shown, allow_all).await;
        };
        if allow_all && clue.as_str() == "all" {
            let count = account.lock().await.messages.len();
            return Ok((0..count).collect());
        }
        if let Ok(number) = clue.parse::<usize>() {
            let count = account.lock().await.messages.len();
            if number >= 1 && number <= count {
                return Ok(vec![number - 1]);
            }
            conn.print("That is not a valid message number.")?;
            return Ok(Vec::new());
        }
        let filter = match clue.as_str() {
            "read" => Filter::Status(false),
            "unread" => Filter::Status(true),
            source => Filter::Source(source.to_owned()),
        };
        let shown = show_summary(conn, account, true, filter).await?;
        self.pick(conn, shown, allow_all).await
    }

    /// Reads a pick against a just-shown summary.
    async fn pick(
        &self,
        conn: &mut Conn,
        shown: Vec<usize>,
        allow_all: bool,
    ) -> SessionResult<Vec<usize>> {
        while !shown.is_empty() {
            let answer = conn.input(Some("Which one?")).await?;
            if answer.is_empty() {
                conn.print(lines::CANCELLING)?;
                break;
            }
            if allow_all && answer == "all" {
                return Ok(shown);
            }
            match answer.parse::<usize>() {
                Ok(number) if number >= 1 && number <= shown.len() => {
                    return Ok(vec![shown[number - 1]]);
                }
                _ => conn.print("Please enter a valid message number.")?,
            }
        }
        Ok(Vec::new())
    }

    async fn read(
        &self,
        conn: &mut Conn,
        account: &Arc<Account>,
        args: &[String],
    ) -> SessionResult<()> {
        let selected = self.select(conn, account, args, false).await?;
        let Some(&index) = selected.first() else {
            return Ok(());
        };
        let (source, body) = {
            let mut data = account.lock().await;
            let Some(message) = data.messages.get_mut(index) else {
                return Ok(());
            };
            message.new = false;
            (message.source.clone(), message.body.clone())
        };
        conn.print(&format!("From: {}", source))?;
        conn.print(lines::RULE)?;
        let paragraphs: Vec<&str> = body.split("\n\n").collect();
        for (at, paragraph) in paragraphs.iter().enumerate() {
            for line in util::wrap(&paragraph.replace('\n', " "), PREVIEW_LENGTH) {
                conn.print(&line)?;
            }
            if at + 1 < paragraphs.len() {
                conn.print("")?;
            }
        }
        conn.print(lines::RULE)
    }

    async fn delete(
        &self,
        conn: &mut Conn,
        account: &Arc<Account>,
        args: &[String],
    ) -> SessionResult<()> {
        let mut selected = self.select(conn, account, args, true).await?;
        if selected.is_empty() {
            return Ok(());
        }
        selected.sort_unstable();
        let mut data = account.lock().await;
        for index in selected.into_iter().rev() {
            if index < data.messages.len() {
                data.messages.remove(index);
            }
        }
        drop(data);
        conn.print("Deletion has been completed.")
    }

    async fn send(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let name = match args.first() {
            Some(name) => name.clone(),
            None => conn.input(Some("Destination:")).await?,
        };
        if name == conn.name()? {
            conn.print("You are not allowed to talk to yourself.")?;
            return Ok(());
        }
        if !state.accounts.exists(&name).await {
            conn.print("Account does not exist.")?;
            return Ok(());
        }
        let text = self.compose(conn).await?;
        if text.is_empty() {
            conn.print("Empty messages may not be sent.")?;
            return Ok(());
        }
        if state.accounts.deliver(&conn.name()?, &name, &text).await {
            conn.print("Message has been delivered.")?;
        } else {
            conn.print(&format!("{} was removed while you were writing.", name))?;
        }
        Ok(())
    }

    /// Multi-line composition, ended by two blank lines.
    async fn compose(&self, conn: &mut Conn) -> SessionResult<String> {
        conn.print("Please compose your message.")?;
        conn.print("Enter 2 blank lines to send.")?;
        conn.print(lines::RULE)?;
        let mut composed: Vec<String> = Vec::new();
        while composed.len() < 2
            || !composed[composed.len() - 2..].iter().all(|line| line.is_empty())
        {
            composed.push(conn.input(None).await?);
        }
        conn.print(lines::RULE)?;
        let body_end = composed.len() - 2;
        let start = composed
            .iter()
            .position(|line| !line.is_empty())
            .unwrap_or(body_end);
        Ok(composed[start.min(body_end)..body_end].join("\n"))
    }
}

impl Default for MessageManager {
    fn default() -> Self {
        MessageManager::new()
    }
}

const COMMANDS: &[Command] = &[
    Command {
        name: "delete",
        help: "Various options for deleting your messages.",
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
        name: "read",
        help: "Read a message in its entirety.",
    },
    Command {
        name: "send",
        help: "Send a message to someone else.",
    },
    Command {
        name: "show",
        help: "Show message summaries with status information.",
    },
];

#[async_trait]
impl Handler for MessageManager {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        conn.print(lines::OPENING_MESSAGE_MANAGER)?;
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
            "delete" => {
                let account = conn.account()?;
                self.delete(conn, &account, args).await?;
                Ok(Flow::Continue)
            }
            "read" => {
                let account = conn.account()?;
                self.read(conn, &account, args).await?;
                Ok(Flow::Continue)
            }
            "send" => {
                self.send(conn, state, args).await?;
                Ok(Flow::Continue)
            }
            "show" => {
                let account = conn.account()?;
                show_summary(conn, &account, true, Filter::All).await?;
                Ok(Flow::Continue)
            }
            _ => unreachable!("unregistered command {}", cmd),
        }
    }
}
