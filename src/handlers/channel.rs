//! Life inside a channel.
//!
//! Entry walks the channel's lifecycle machine: fresh channels put their
//! creator through the configuration dialogue, channels being configured
//! or reformatted turn others away, finalized channels refuse entry
//! outright.  Once inside, plain lines go to the buffer and the members;
//! `:`-prefixed lines are commands.

use crate::channel::{Channel, ChannelLine, MuteAdd, Status};
use crate::client::Conn;
use crate::handler::{self, Command, Flow, Handler, SessionResult, Step};
use crate::handlers::{ChannelAdmin, Summarizer};
use crate::lines;
use crate::state::State;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ChannelSession {
    channel: Arc<Channel>,
}

impl ChannelSession {
    pub fn new(channel: Arc<Channel>) -> ChannelSession {
        ChannelSession { channel }
    }

    /// Reads a size answer: a non-negative number, or `all`, `infinite`
    /// or `total` for no limit.  Re-prompts until satisfied.
    pub async fn get_size(
        conn: &mut Conn,
        mut arg: Option<&str>,
    ) -> SessionResult<Option<usize>> {
        loop {
            let line = match arg.take() {
                Some(arg) => arg.to_owned(),
                None => conn.input(Some(lines::SIZE_PROMPT)).await?,
            };
            if matches!(line.as_str(), "all" | "infinite" | "total") {
                return Ok(None);
            }
            match line.parse::<usize>() {
                Ok(size) => return Ok(Some(size)),
                Err(_) => conn.print(lines::SIZE_INVALID)?,
            }
        }
    }

    async fn entry(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        let name = conn.name()?;
        let (status, owner) = {
            let mut data = self.channel.lock().await;
            if data.status == Status::Final {
                return Ok(None);
            }
            if data.status == Status::Reset && data.owner == name {
                data.status = Status::Start;
            }
            let status = data.status;
            if status == Status::Start {
                data.status = Status::Setup;
            }
            (status, data.owner.clone())
        };
        let status = if status == Status::Start {
            let outcome = self.setup_channel(conn).await;
            self.channel.lock().await.status = Status::Ready;
            outcome?;
            Status::Ready
        } else {
            status
        };
        match status {
            Status::Setup | Status::Reset => {
                conn.print(&lines::setting_up(&owner))?;
                Ok(None)
            }
            Status::Ready => self.run_channel(conn, state).await,
            _ => Err(crate::handler::SessionError::Internal(format!(
                "channel {} entered in state {:?}",
                self.channel.id(),
                status
            ))),
        }
    }

    /// The owner-only configuration dialogue.  Whatever happens, the
    /// caller flips the channel to ready afterwards.
    async fn setup_channel(&self, conn: &mut Conn) -> SessionResult<()> {
        // password
        let answer = conn
            .input(Some("Password protect this channel?"))
            .await?;
        if crate::util::yes(&answer) {
            loop {
                let password = conn.input(Some("Set password to:")).await?;
                if password.is_empty() {
                    conn.print("Password may not be empty.")?;
                } else {
                    self.channel.lock().await.password = password;
                    break;
                }
            }
        }
        // buffer size
        let answer = conn
            .input(Some("Do you want to set the buffer size?"))
            .await?;
        if crate::util::yes(&answer) {
            let size = Self::get_size(conn, None).await?;
            self.channel.lock().await.buffer_size = size;
        }
        // replay size
        let answer = conn
            .input(Some("Do you want to set the replay size?"))
            .await?;
        if crate::util::yes(&answer) {
            let size = Self::get_size(conn, None).await?;
            self.channel.lock().await.replay_size = size;
        }
        Ok(())
    }

    async fn run_channel(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        let name = conn.name()?;
        if self.channel.is_banned(&name).await {
            conn.print(lines::CHANNEL_BANNED)?;
            return Ok(None);
        }
        if !self.authenticate(conn, state).await? {
            conn.print(lines::CHANNEL_AUTH_FAILED)?;
            return Ok(None);
        }
        for line in self.channel.replay_lines().await {
            conn.print(&line.render())?;
        }
        let connected = self.channel.connected_count().await;
        conn.print(&format!(
            "{} {} connected.",
            connected,
            if connected == 1 {
                "person is"
            } else {
                "people are"
            }
        ))?;
        let step = self.message_loop(conn, state).await;
        self.channel
            .broadcast(&ChannelLine::event(lines::leaving(&name)), false, conn.id())
            .await;
        step
    }

    async fn authenticate(&self, conn: &mut Conn, state: &Arc<State>) -> SessionResult<bool> {
        let password = self.channel.lock().await.password.clone();
        if password.is_empty() || self.privileged(conn, state, false).await? {
            return Ok(true);
        }
        let answer = conn.input(Some(lines::CHANNEL_PASSWORD_PROMPT)).await?;
        Ok(answer == password)
    }

    async fn message_loop(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        let name = conn.name()?;
        self.channel
            .broadcast(&ChannelLine::event(lines::joining(&name)), false, conn.id())
            .await;
        loop {
            let line = conn.input(None).await?;
            if self.channel.take_kick(&name).await {
                conn.print(lines::CHANNEL_KICKED)?;
                return Ok(None);
            }
            if let Some(command) = line.strip_prefix(':') {
                match handler::run_command(self, conn, state, command).await? {
                    Flow::Continue | Flow::JsonHelp => {}
                    Flow::Pop => return Ok(None),
                    Flow::Push(next) => return Ok(Some(next)),
                }
            } else {
                let channel_line = self.channel.add_line(&name, &line).await;
                self.channel.broadcast(&channel_line, true, conn.id()).await;
            }
        }
    }

    /// Administrators and the owner pass; everyone else is told off when
    /// `verbose`.
    async fn privileged(
        &self,
        conn: &Conn,
        _state: &Arc<State>,
        verbose: bool,
    ) -> SessionResult<bool> {
        let account = conn.account()?;
        if account.is_administrator().await {
            return Ok(true);
        }
        if self.channel.owner().await == conn.name()? {
            return Ok(true);
        }
        if verbose {
            conn.print(lines::NOT_PRIVILEGED)?;
        }
        Ok(false)
    }

    /// Owner protection check.  `None` means the name does not exist (and
    /// the caller was told).
    async fn is_protected(
        &self,
        conn: &Conn,
        state: &Arc<State>,
        name: &str,
    ) -> SessionResult<Option<bool>> {
        if self.channel.owner().await == name {
            return Ok(Some(true));
        }
        match state.accounts.is_administrator(name).await {
            Some(admin) => Ok(Some(admin)),
            None => {
                conn.print(&format!("{} does not exist.", name))?;
                Ok(None)
            }
        }
    }

    async fn who(&self, conn: &mut Conn, args: &[String]) -> SessionResult<Option<String>> {
        match args.first() {
            Some(name) => Ok(Some(name.clone())),
            None => {
                let name = conn.input(Some(lines::WHO_PROMPT)).await?;
                if name.is_empty() {
                    conn.print(lines::CANCELLING)?;
                    Ok(None)
                } else {
                    Ok(Some(name))
                }
            }
        }
    }

    async fn kick(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        name: &str,
        verbose: bool,
    ) -> SessionResult<()> {
        let Some(protected) = self.is_protected(conn, state, name).await? else {
            return Ok(());
        };
        if protected {
            if verbose {
                conn.print(&format!("{} cannot be kicked.", name))?;
            }
            return Ok(());
        }
        let kicked = self.channel.kick_connected(name).await;
        if verbose {
            if kicked {
                conn.print(&format!("{} has been kicked.", name))?;
            } else {
                conn.print(&format!("{} is not on this channel.", name))?;
            }
        }
        Ok(())
    }

    async fn ban(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let Some(sub) = args.first() else {
            conn.print(lines::TRY_ADD_DEL_LIST)?;
            return Ok(());
        };
        match sub.as_str() {
            "add" => {
                let Some(name) = self.who(conn, &args[1..]).await? else {
                    return Ok(());
                };
                let Some(protected) = self.is_protected(conn, state, &name).await? else {
                    return Ok(());
                };
                if protected {
                    conn.print(&format!("{} cannot be banned.", name))?;
                } else if self.channel.add_ban(&name).await {
                    self.kick(conn, state, &name, false).await?;
                    conn.print(&format!("{} has been banned.", name))?;
                } else {
                    conn.print(&format!("{} was already banned.", name))?;
                }
            }
            "del" => {
                let Some(name) = self.who(conn, &args[1..]).await? else {
                    return Ok(());
                };
                if self.channel.del_ban(&name).await {
                    conn.print(&format!("{} is no longer banned on this channel.", name))?;
                } else {
                    conn.print(&format!("{} was not banned on this channel.", name))?;
                }
            }
            "list" => {
                let banned = self.channel.banned_names().await;
                if banned.is_empty() {
                    conn.print("No one has been banned on this channel.")?;
                } else {
                    conn.print_list("Those that are banned from this channel:", &banned)?;
                }
            }
            _ => conn.print(lines::TRY_ADD_DEL_LIST)?,
        }
        Ok(())
    }

    async fn mute(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let caller = conn.name()?;
        let Some(sub) = args.first() else {
            conn.print(lines::TRY_ADD_DEL_LIST)?;
            return Ok(());
        };
        match sub.as_str() {
            "add" => {
                let Some(muted) = self.who(conn, &args[1..]).await? else {
                    return Ok(());
                };
                if muted == caller {
                    conn.print("You may not mute yourself.")?;
                    return Ok(());
                }
                if !state.accounts.exists(&muted).await {
                    conn.print(&format!("{} does not exist.", muted))?;
                    return Ok(());
                }
                match self.channel.add_mute(&muted, &caller).await {
                    MuteAdd::Muted => conn.print(&format!("{} has been muted.", muted))?,
                    MuteAdd::AlreadyMuted => {
                        conn.print(&format!("{} was already muted.", muted))?
                    }
                }
            }
            "del" => {
                let Some(muted) = self.who(conn, &args[1..]).await? else {
                    return Ok(());
                };
                if self.channel.del_mute(&muted, &caller).await {
                    conn.print(&format!("{} has been unmuted.", muted))?;
                } else {
                    conn.print(&format!("{} was not muted.", muted))?;
                }
            }
            "list" => {
                let muted = self.channel.mutes_of(&caller).await;
                if muted.is_empty() {
                    conn.print("Your list is empty.")?;
                } else {
                    conn.print_list("You have muted:", &muted)?;
                }
            }
            _ => conn.print(lines::TRY_ADD_DEL_LIST)?,
        }
        Ok(())
    }

    async fn invite(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let (deleted, password) = {
            let data = self.channel.lock().await;
            (data.name.is_none(), data.password.clone())
        };
        if deleted {
            conn.print(lines::CHANNEL_CLOSED)?;
            return Ok(());
        }
        // Handing out the password comes with the invitation, so guarded
        // channels only let the privileged invite.
        if !password.is_empty() && !self.privileged(conn, state, true).await? {
            return Ok(());
        }
        let Some(name) = self.who(conn, args).await? else {
            return Ok(());
        };
        let caller = conn.name()?;
        if name == caller {
            conn.print("You are already here.")?;
            return Ok(());
        }
        let Some(channel_name) = self.channel.name().await else {
            conn.print(lines::CHANNEL_CLOSED)?;
            return Ok(());
        };
        let mut message = format!("{} has invited you to channel {}.", caller, channel_name);
        if !password.is_empty() {
            message.push_str(&format!("\n\nUse this to get in: {:?}", password));
        }
        if state.accounts.deliver(&caller, &name, &message).await {
            conn.print("Invitation has been sent.")?;
        } else {
            conn.print(&format!("{} does not exist.", name))?;
        }
        Ok(())
    }

    async fn whisper(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let Some(name) = self.who(conn, args).await? else {
            return Ok(());
        };
        if !state.accounts.exists(&name).await {
            conn.print(&format!("{} does not exist.", name))?;
            return Ok(());
        }
        let message = conn.input(Some("Message:")).await?;
        if message.is_empty() {
            conn.print("You may not wisper empty messages.")?;
            return Ok(());
        }
        let caller = conn.name()?;
        let sent = match self.channel.whisper_target(&caller, &name).await {
            Some(target) => {
                target.print(&format!("({}) {}", caller, message));
                true
            }
            None => state.accounts.deliver(&caller, &name, &message).await,
        };
        if sent {
            conn.print("Message sent.")?;
        } else {
            conn.print(&format!("{} no longer has an account.", name))?;
        }
        Ok(())
    }

    async fn list(&self, conn: &mut Conn) -> SessionResult<()> {
        let names = self.channel.member_names().await;
        if names.len() == 1 {
            conn.print("You alone are on this channel.")?;
        } else {
            conn.print_list("Currently connected to this channel:", &names)?;
        }
        Ok(())
    }

    async fn summary(&self, conn: &mut Conn) -> SessionResult<Flow> {
        let buffer = self.channel.buffer_snapshot().await;
        if buffer.is_empty() {
            conn.print("There is nothing to summarize.")?;
            return Ok(Flow::Continue);
        }
        let size = (buffer.len() + 3) / 4;
        Ok(Flow::Push(Box::new(Summarizer::new(
            self.channel.clone(),
            buffer,
            size,
        ))))
    }
}

const COMMANDS: &[Command] = &[
    Command {
        name: "admin",
        help: "Owner: change this channel's settings.",
    },
    Command {
        name: "ban",
        help: "Owner: ban a user from joining this channel.",
    },
    Command {
        name: "bot",
        help: "Owner: add optional channel commands.",
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
        name: "invite",
        help: "Invite someone to join this channel.",
    },
    Command {
        name: "kick",
        help: "Owner: kick a user off this channel.",
    },
    Command {
        name: "list",
        help: "Show everyone connected to this channel.",
    },
    Command {
        name: "map",
        help: "Owner: add optional channel modifiers.",
    },
    Command {
        name: "mute",
        help: "Access and change your muted user list.",
    },
    Command {
        name: "run",
        help: "Owner: add optional channel extensions.",
    },
    Command {
        name: "summary",
        help: "Proof of concept: a random summary of the channel.",
    },
    Command {
        name: "wisper",
        help: "Send a message to one specific person.",
    },
];

#[async_trait]
impl Handler for ChannelSession {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        let step = self.entry(conn, state).await;
        // Leaving for any reason drops the membership and sweeps leftover
        // kick entries, even when the transport died mid-loop.
        if let Ok(name) = conn.name() {
            self.channel.depart(conn.id(), &name).await;
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
            "admin" => {
                if self.privileged(conn, state, true).await? {
                    Ok(Flow::Push(Box::new(ChannelAdmin::new(
                        self.channel.clone(),
                    ))))
                } else {
                    Ok(Flow::Continue)
                }
            }
            "ban" => {
                if self.privileged(conn, state, true).await? {
                    self.ban(conn, state, args).await?;
                }
                Ok(Flow::Continue)
            }
            "invite" => {
                self.invite(conn, state, args).await?;
                Ok(Flow::Continue)
            }
            "kick" => {
                if self.privileged(conn, state, true).await? {
                    if let Some(name) = self.who(conn, args).await? {
                        self.kick(conn, state, &name, true).await?;
                    }
                }
                Ok(Flow::Continue)
            }
            "list" => {
                self.list(conn).await?;
                Ok(Flow::Continue)
            }
            "mute" => {
                self.mute(conn, state, args).await?;
                Ok(Flow::Continue)
            }
            "summary" => self.summary(conn).await,
            "wisper" => {
                self.whisper(conn, state, args).await?;
                Ok(Flow::Continue)
            }
            "bot" | "map" | "run" => {
                if self.privileged(conn, state, true).await? {
                    conn.print(lines::RESERVED_COMMAND)?;
                }
                Ok(Flow::Continue)
            }
            _ => unreachable!("unregistered command {}", cmd),
        }
    }
}
