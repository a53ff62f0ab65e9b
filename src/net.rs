//! The listener.
//!
//! Accepts connections, wires each one up (writer task, connection table
//! slot, worker seeded with the ban filter) and waits for the workers to
//! drain once an administrator shuts the server down.

use crate::client::{self, Client, Conn};
use crate::handler;
use crate::handlers::BanFilter;
use crate::state::State;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const BACKLOG: u32 = 5;

fn bind(addr: &str) -> io::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(BACKLOG)
}

pub async fn run(state: Arc<State>) -> io::Result<()> {
    let listener = bind(&state.config.bind)?;
    log::info!("Listening on {}", listener.local_addr()?);
    let mut workers = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::warn!("Failed to accept a connection: {}", err);
                        continue;
                    }
                };
                let (read_half, write_half) = stream.into_split();
                let (tx, rx) = mpsc::unbounded_channel();
                let client = Arc::new(Client::new(addr, tx));
                let Some(id) = state.net.insert(client.clone()).await else {
                    break;
                };
                client::spawn_writer(client.clone(), rx, write_half);
                let conn = Conn::new(id, Box::new(read_half), client);
                let state = state.clone();
                workers.spawn(async move {
                    handler::run_session(conn, state, Box::new(BanFilter::new())).await;
                });
            }
            _ = state.net.shutdown.notified() => break,
            Some(_) = workers.join_next(), if !workers.is_empty() => {}
        }
    }
    drop(listener);
    log::info!("No longer accepting connections");
    while workers.join_next().await.is_some() {}
    Ok(())
}
