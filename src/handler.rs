//! The modal screen contract and its driver.
//!
//! A connection is driven through a stack of screens.  Each screen exposes
//! one blocking `handle` that converses with the client and returns either
//! the next screen to push or nothing to pop itself.  Most screens are
//! command loops; the loop, `help`, `?`, `exit` and the `__json_help__`
//! machine-readable dump are implemented once here against each screen's
//! static command registry.

use crate::client::Conn;
use crate::lines;
use crate::state::State;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection is gone: forced disconnect, orderly close, end of
    /// stream.  Unwinds the worker silently.
    #[error("connection closed")]
    Closed,

    /// The transport failed under us: peer reset, oversize line, bytes that
    /// are not text.  Unwinds the worker.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A broken invariant.  Reported to the client in a bordered block,
    /// then the session is torn down.  Other sessions are unaffected.
    #[error("{0}")]
    Internal(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// What `handle` hands back to the driver: the screen to push, or `None`
/// to pop.
pub type Step = SessionResult<Option<Box<dyn Handler>>>;

/// One entry in a screen's command registry.
pub struct Command {
    pub name: &'static str,
    pub help: &'static str,
}

/// What one dispatched command does to the screen stack.
pub enum Flow {
    Continue,
    Pop,
    Push(Box<dyn Handler>),
    /// The machine-readable help dump was sent; the loop suppresses its
    /// next prompt so line clients can read it unambiguously.
    JsonHelp,
}

const JSON_HELP: &str = "__json_help__";

#[async_trait]
pub trait Handler: Send {
    /// Converses with the client until this screen is done.
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step;

    /// The screen's command registry, sorted by name.  `help` and
    /// `__json_help__` read it; the command loop rejects anything not in
    /// it.
    fn commands(&self) -> &'static [Command] {
        &[]
    }

    /// Runs one registered command.  Only called with names present in
    /// `commands`, minus the built-ins handled by the loop itself.
    async fn dispatch(
        &mut self,
        conn: &mut Conn,
        state: &Arc<State>,
        cmd: &str,
        args: &[String],
    ) -> SessionResult<Flow> {
        let _ = (conn, state, cmd, args);
        Ok(Flow::Continue)
    }
}

/// Prompt, read, dispatch, repeat, until a command pops or pushes.
pub async fn command_loop<H>(
    handler: &mut H,
    conn: &mut Conn,
    state: &Arc<State>,
    prompt: &str,
) -> Step
where
    H: Handler + ?Sized,
{
    let mut mute = false;
    loop {
        let line = conn.input(if mute { None } else { Some(prompt) }).await?;
        mute = false;
        match run_command(handler, conn, state, &line).await? {
            Flow::Continue => {}
            Flow::JsonHelp => mute = true,
            Flow::Pop => return Ok(None),
            Flow::Push(next) => return Ok(Some(next)),
        }
    }
}

/// Tokenises one input line and runs it against the screen's registry.
/// Shared by the command loop and the channel message loop.
pub async fn run_command<H>(
    handler: &mut H,
    conn: &mut Conn,
    state: &Arc<State>,
    line: &str,
) -> SessionResult<Flow>
where
    H: Handler + ?Sized,
{
    let mut tokens = line.split_whitespace();
    let cmd = match tokens.next() {
        Some(cmd) => cmd,
        None => return Ok(Flow::Continue),
    };
    let args: Vec<String> = tokens.map(str::to_owned).collect();
    if cmd.ends_with(JSON_HELP) {
        json_help(handler, conn)?;
        return Ok(Flow::JsonHelp);
    }
    let cmd = if cmd == "?" { "help" } else { cmd };
    match cmd {
        "exit" => Ok(Flow::Pop),
        "help" => {
            help(handler, conn, &args)?;
            Ok(Flow::Continue)
        }
        _ if handler.commands().iter().all(|c| c.name != cmd) => {
            conn.print(lines::COMMAND_NOT_FOUND)?;
            Ok(Flow::Continue)
        }
        _ => handler.dispatch(conn, state, cmd, &args).await,
    }
}

fn help<H>(handler: &H, conn: &Conn, args: &[String]) -> SessionResult<()>
where
    H: Handler + ?Sized,
{
    if let Some(arg) = args.first() {
        let name = if arg.as_str() == "?" { "help" } else { arg.as_str() };
        match handler.commands().iter().find(|c| c.name == name) {
            Some(command) => conn.print(command.help),
            None => conn.print(lines::COMMAND_NOT_FOUND),
        }
    } else {
        let names: Vec<String> = handler
            .commands()
            .iter()
            .map(|c| c.name.to_owned())
            .collect();
        conn.print_list("Command list:", &names)?;
        conn.print(lines::HELP_FOOTER)
    }
}

fn json_help<H>(handler: &H, conn: &Conn) -> SessionResult<()>
where
    H: Handler + ?Sized,
{
    let map: BTreeMap<&str, &str> = handler
        .commands()
        .iter()
        .map(|c| (c.name, c.help))
        .collect();
    let payload =
        serde_json::to_string(&map).map_err(|err| SessionError::Internal(err.to_string()))?;
    conn.print(&payload)
}

/// Drives one connection's screen stack to completion, then tears the
/// connection down.
///
/// A screen that fails with an internal error, or panics outright, has the
/// failure reported to its own client in a bordered block; no other
/// session ever observes it.
pub async fn run_session(mut conn: Conn, state: Arc<State>, root: Box<dyn Handler>) {
    let addr = conn.client().addr();
    log::debug!("{}: Connected", addr);
    let mut stack: Vec<Box<dyn Handler>> = vec![root];
    while let Some(top) = stack.last_mut() {
        let step = AssertUnwindSafe(top.handle(&mut conn, &state))
            .catch_unwind()
            .await;
        match step {
            Ok(Ok(Some(next))) => stack.push(next),
            Ok(Ok(None)) => {
                stack.pop();
            }
            Ok(Err(SessionError::Closed)) => break,
            Ok(Err(SessionError::Transport(err))) => {
                log::debug!("{}: transport failed: {}", addr, err);
                break;
            }
            Ok(Err(SessionError::Internal(detail))) => {
                log::error!("{}: session failed: {}", addr, detail);
                report_failure(&conn, &detail);
                break;
            }
            Err(panic) => {
                let detail = panic_message(panic);
                log::error!("{}: session panicked: {}", addr, detail);
                report_failure(&conn, &detail);
                break;
            }
        }
    }
    teardown(&conn, &state).await;
    log::debug!("{}: Disconnected", addr);
}

/// Best-effort bordered failure report, straight through the shared handle
/// so a dead transport cannot unwind us again.
fn report_failure(conn: &Conn, detail: &str) {
    let client = conn.client();
    client.print(lines::ERROR_RULE);
    client.print(lines::REPORT_ERROR);
    client.print(lines::ERROR_RULE);
    client.print(detail);
    client.print(lines::ERROR_RULE);
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unidentified panic".to_owned()
    }
}

/// Frees the connection's slot and clears the account session, whatever
/// path the worker took out of the stack.
async fn teardown(conn: &Conn, state: &Arc<State>) {
    state.net.remove(conn.id()).await;
    if let Some(account) = conn.client().account() {
        account.set_offline().await;
    }
    conn.client().unbind();
    conn.client().close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test::{drain, script_conn};

    struct Probe;

    #[async_trait]
    impl Handler for Probe {
        async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
            command_loop(self, conn, state, lines::COMMAND_PROMPT).await
        }

        fn commands(&self) -> &'static [Command] {
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
                    name: "ping",
                    help: "Answer with a pong.",
                },
            ];
            COMMANDS
        }

        async fn dispatch(
            &mut self,
            conn: &mut Conn,
            _state: &Arc<State>,
            cmd: &str,
            _args: &[String],
        ) -> SessionResult<Flow> {
            match cmd {
                "ping" => {
                    conn.print("pong")?;
                    Ok(Flow::Continue)
                }
                _ => unreachable!("unregistered command {}", cmd),
            }
        }
    }

    #[tokio::test]
    async fn unknown_commands_are_reported_and_the_loop_continues() {
        let state = crate::state::test::test_state();
        let (mut conn, mut queue) = script_conn(1, "bogus\r\nping\r\nexit\r\n");
        let step = Probe.handle(&mut conn, &state).await.unwrap();
        assert!(step.is_none());
        let out = drain(&mut queue);
        assert!(out.contains(lines::COMMAND_NOT_FOUND));
        assert!(out.contains("pong"));
    }

    #[tokio::test]
    async fn empty_lines_just_reprompt() {
        let state = crate::state::test::test_state();
        let (mut conn, mut queue) = script_conn(1, "\r\n\r\nexit\r\n");
        Probe.handle(&mut conn, &state).await.unwrap();
        let out = drain(&mut queue);
        assert_eq!(out.matches(lines::COMMAND_PROMPT).count(), 3);
    }

    #[tokio::test]
    async fn json_help_dumps_the_registry_and_mutes_one_prompt() {
        let state = crate::state::test::test_state();
        let (mut conn, mut queue) = script_conn(1, "__json_help__\r\nexit\r\n");
        Probe.handle(&mut conn, &state).await.unwrap();
        let out = drain(&mut queue);
        // one prompt for the dump request, none before `exit`
        assert_eq!(out.matches(lines::COMMAND_PROMPT).count(), 1);
        let json_line = out
            .lines()
            .find(|line| line.starts_with('{'))
            .expect("json line");
        let map: BTreeMap<String, String> = serde_json::from_str(json_line).unwrap();
        assert_eq!(map.len(), 3);
        assert!(map.contains_key("ping"));
    }

    #[tokio::test]
    async fn help_lists_every_registered_command() {
        let state = crate::state::test::test_state();
        let (mut conn, mut queue) = script_conn(1, "?\r\nhelp ping\r\nexit\r\n");
        Probe.handle(&mut conn, &state).await.unwrap();
        let out = drain(&mut queue);
        assert!(out.contains("Command list:"));
        assert!(out.contains("\n    ping"));
        assert!(out.contains("Answer with a pong."));
    }
}
