//! The channel's moderator console.
//!
//! Entered from inside the channel through `:admin`.  The console holds
//! the channel's try-acquire admin lock for its whole life, so at most one
//! moderator reshapes a channel at a time; a second attempt is told who is
//! in the way.  The caller left the channel to come here and is put back
//! on the way out.

use crate::channel::{Channel, Status};
use crate::client::Conn;
use crate::handler::{self, Command, Flow, Handler, SessionError, SessionResult, Step};
use crate::handlers::ChannelSession;
use crate::lines;
use crate::state::State;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ChannelAdmin {
    channel: Arc<Channel>,
}

impl ChannelAdmin {
    pub fn new(channel: Arc<Channel>) -> ChannelAdmin {
        ChannelAdmin { channel }
    }

    async fn reconnect(&self, conn: &Conn) -> SessionResult<()> {
        let name = conn.name()?;
        self.channel
            .connect(conn.id(), &name, conn.client().clone())
            .await;
        Ok(())
    }

    async fn close(&self, conn: &mut Conn) -> SessionResult<()> {
        let mut data = self.channel.lock().await;
        let names: Vec<String> = data.connected.values().map(|m| m.name.clone()).collect();
        data.kicked.extend(names);
        drop(data);
        conn.print("Everyone has been kicked off the channel.")
    }

    async fn delete(&self, conn: &mut Conn, state: &Arc<State>) -> SessionResult<()> {
        let Some(name) = self.channel.name().await else {
            conn.print("This channel had been previously deleted.")?;
            return Ok(());
        };
        if !state.channels.delete_name(&name).await {
            return Err(SessionError::Internal(format!(
                "channel {} was named but not registered",
                name
            )));
        }
        self.channel.lock().await.name = None;
        log::info!("Channel {} deleted", name);
        conn.print("This channel is no longer enterable.")
    }

    async fn finalize(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
    ) -> SessionResult<Flow> {
        let caller = conn.name()?;
        let name = {
            let mut data = self.channel.lock().await;
            data.status = Status::Final;
            let names: Vec<String> = data.connected.values().map(|m| m.name.clone()).collect();
            data.kicked.extend(names);
            data.name.take()
        };
        if let Some(name) = &name {
            state.channels.delete_name(name).await;
            log::info!("Channel {} finalized", name);
        }
        self.channel.reset_by(&caller).await;
        conn.print("The channel has been finalized.")?;
        conn.print("Returning to the main menu ...")?;
        Ok(Flow::Pop)
    }

    async fn history(&self, conn: &mut Conn) -> SessionResult<()> {
        let buffer = self.channel.buffer_snapshot().await;
        if buffer.is_empty() {
            conn.print("The channel buffer is empty.")?;
        } else {
            for line in buffer {
                conn.print(&line.render())?;
            }
        }
        Ok(())
    }

    async fn owner(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let new_owner = match args.first() {
            Some(name) => name.clone(),
            None => conn.input(Some("New owner:")).await?,
        };
        if new_owner.is_empty() {
            conn.print(lines::CANCELLING)?;
            return Ok(());
        }
        if args.len() > 1 || new_owner.split_whitespace().count() > 1 {
            conn.print(lines::NAME_HAS_WHITESPACE)?;
            return Ok(());
        }
        if self.channel.owner().await == new_owner {
            conn.print(&format!("{} already owns this channel.", new_owner))?;
            return Ok(());
        }
        if !state.accounts.exists(&new_owner).await {
            conn.print(&format!("{} does not have an account.", new_owner))?;
            return Ok(());
        }
        self.channel.lock().await.owner = new_owner.clone();
        conn.print(&format!("{} is now the owner of this channel.", new_owner))
    }

    async fn password(&self, conn: &mut Conn, args: &[String]) -> SessionResult<()> {
        match args.first().map(String::as_str) {
            Some("set") => {
                let word = match args.get(1) {
                    Some(word) => word.clone(),
                    None => conn.input(Some(lines::PASSWORD_PROMPT)).await?,
                };
                if word.is_empty() {
                    conn.print("Password may not be empty.")?;
                } else {
                    self.channel.lock().await.password = word.clone();
                    conn.print(&format!("Password has been set to: {}", word))?;
                }
            }
            Some("unset") => {
                self.channel.lock().await.password.clear();
                conn.print("The password has been cleared.")?;
            }
            _ => conn.print("Try set or unset.")?,
        }
        Ok(())
    }

    async fn rename(
        &self,
        conn: &mut Conn,
        state: &Arc<State>,
        args: &[String],
    ) -> SessionResult<()> {
        let Some(old_name) = self.channel.name().await else {
            conn.print("Deleted channels cannot be renamed.")?;
            return Ok(());
        };
        let new_name = match args.first() {
            Some(name) => name.clone(),
            None => conn.input(Some("New name:")).await?,
        };
        if new_name.is_empty() {
            conn.print(lines::CANCELLING)?;
            return Ok(());
        }
        if args.len() > 1 || new_name.split_whitespace().count() > 1 {
            conn.print(lines::CHANNEL_HAS_WHITESPACE)?;
            return Ok(());
        }
        match state.channels.rename(&old_name, &new_name).await {
            Some(true) => {
                self.channel.lock().await.name = Some(new_name.clone());
                conn.print(&format!("{} is the new name of this channel.", new_name))
            }
            Some(false) => {
                conn.print(&format!("The name {} is already in use.", new_name))
            }
            None => Err(SessionError::Internal(format!(
                "channel {} was named but not registered",
                old_name
            ))),
        }
    }

    async fn reset(&self, conn: &mut Conn) -> SessionResult<()> {
        let caller = conn.name()?;
        {
            let mut data = self.channel.lock().await;
            data.status = Status::Reset;
            let names: Vec<String> = data.connected.values().map(|m| m.name.clone()).collect();
            data.kicked.extend(names);
        }
        self.channel.reset_by(&caller).await;
        conn.print("Channel has been reset, and you are its owner.")
    }

    async fn settings(&self, conn: &mut Conn) -> SessionResult<()> {
        let (owner, password, buffer_size, replay_size) = {
            let data = self.channel.lock().await;
            (
                data.owner.clone(),
                data.password.clone(),
                data.buffer_size,
                data.replay_size,
            )
        };
        conn.print(&format!("Owner:       {}", owner))?;
        conn.print(&format!("Password:    {}", password))?;
        conn.print(&format!("Buffer size: {}", show_size(buffer_size)))?;
        conn.print(&format!("Replay size: {}", show_size(replay_size)))
    }
}

fn show_size(size: Option<usize>) -> String {
    match size {
        Some(size) => size.to_string(),
        None => "Infinite".to_owned(),
    }
}

const COMMANDS: &[Command] = &[
    Command {
        name: "buffer",
        help: "Set the buffer size of this channel.",
    },
    Command {
        name: "close",
        help: "Kick everyone off the channel (useful after delete).",
    },
    Command {
        name: "delete",
        help: "Unregister this channel as though it did not exist.",
    },
    Command {
        name: "exit",
        help: "Exit from this area of the server.",
    },
    Command {
        name: "finalize",
        help: "Delete, close, and reset the channel (returns you to main menu).",
    },
    Command {
        name: "help",
        help: "Call help with a command name for more information.",
    },
    Command {
        name: "history",
        help: "Show the entire contents of the channel buffer.",
    },
    Command {
        name: "owner",
        help: "Change the owner of this channel.",
    },
    Command {
        name: "password",
        help: "Change the password of this channel.",
    },
    Command {
        name: "purge",
        help: "Clear the contents of the channel buffer.",
    },
    Command {
        name: "rename",
        help: "Give this channel a new name not used by another channel.",
    },
    Command {
        name: "replay",
        help: "Set the replay size of this channel.",
    },
    Command {
        name: "reset",
        help: "Make the channel like new again with nothing in it.",
    },
    Command {
        name: "settings",
        help: "Show channel owner, password, buffer size, and replay size.",
    },
];

#[async_trait]
impl Handler for ChannelAdmin {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        let Some(guard) = self.channel.try_admin() else {
            let holder = self.channel.lock().await.admin_name.clone();
            conn.print(&format!(
                "{} is currently using the admin console.",
                holder
            ))?;
            self.reconnect(conn).await?;
            return Ok(None);
        };
        self.channel.lock().await.admin_name = conn.name()?;
        conn.print(lines::OPENING_ADMIN_CONSOLE)?;
        let step = handler::command_loop(self, conn, state, lines::COMMAND_PROMPT).await;
        drop(guard);
        if let Ok(None) = step {
            // Back into the channel; a finalized one turns the caller
            // right around at the entry machine.
            self.reconnect(conn).await?;
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
            "buffer" => {
                let size =
                    ChannelSession::get_size(conn, args.first().map(String::as_str)).await?;
                self.channel.lock().await.buffer_size = size;
                Ok(Flow::Continue)
            }
            "close" => {
                self.close(conn).await?;
                Ok(Flow::Continue)
            }
            "delete" => {
                self.delete(conn, state).await?;
                Ok(Flow::Continue)
            }
            "finalize" => self.finalize(conn, state).await,
            "history" => {
                self.history(conn).await?;
                Ok(Flow::Continue)
            }
            "owner" => {
                self.owner(conn, state, args).await?;
                Ok(Flow::Continue)
            }
            "password" => {
                self.password(conn, args).await?;
                Ok(Flow::Continue)
            }
            "purge" => {
                self.channel.lock().await.buffer.clear();
                conn.print("The buffer has been cleared.")?;
                Ok(Flow::Continue)
            }
            "rename" => {
                self.rename(conn, state, args).await?;
                Ok(Flow::Continue)
            }
            "replay" => {
                let size =
                    ChannelSession::get_size(conn, args.first().map(String::as_str)).await?;
                self.channel.lock().await.replay_size = size;
                Ok(Flow::Continue)
            }
            "reset" => {
                self.reset(conn).await?;
                Ok(Flow::Continue)
            }
            "settings" => {
                self.settings(conn).await?;
                Ok(Flow::Continue)
            }
            _ => unreachable!("unregistered command {}", cmd),
        }
    }
}
