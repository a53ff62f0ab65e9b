//! Per-connection plumbing.
//!
//! Each TCP connection is owned by three cooperating pieces:
//!
//! - [`Conn`], held by the connection's worker task: the reading half of the
//!   socket plus the shared handle.  All screen dialogue goes through it.
//! - [`Client`], the shared handle: the outgoing message queue, the closed
//!   flag and the session binding.  Anything that wants to talk *to* this
//!   connection (channel broadcasts, inbox notifications, forced
//!   disconnects) holds an `Arc<Client>`.
//! - the writer task, which drains the queue into the writing half of the
//!   socket.  Because every sender goes through the one queue, writes to a
//!   connection are serialised without holding any lock during I/O.

use crate::account::Account;
use crate::handler::{SessionError, SessionResult};
use multichat_reader::LineReader;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::sync::Notify;

/// One outgoing payload, shared between queues when broadcast.
#[derive(Clone, Debug)]
pub struct MessageQueueItem(Arc<str>);

impl From<String> for MessageQueueItem {
    fn from(text: String) -> Self {
        MessageQueueItem(text.into())
    }
}

impl AsRef<str> for MessageQueueItem {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub type MessageQueue = mpsc::UnboundedSender<MessageQueueItem>;

#[derive(Default)]
struct Session {
    name: Option<String>,
    account: Option<Arc<Account>>,
}

/// The shared side of a connection.
pub struct Client {
    addr: SocketAddr,
    queue: MessageQueue,
    closed: AtomicBool,
    closer: Notify,
    session: parking_lot::Mutex<Session>,
}

impl Client {
    pub fn new(addr: SocketAddr, queue: MessageQueue) -> Client {
        Client {
            addr,
            queue,
            closed: AtomicBool::new(false),
            closer: Notify::new(),
            session: parking_lot::Mutex::new(Session::default()),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The peer's address in the textual form the ban list stores.
    pub fn ip(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Queues one line for this connection.  Delivery is best-effort: lines
    /// to a closed or closing connection vanish.
    pub fn print(&self, text: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut payload = String::with_capacity(text.len() + 2);
        payload.push_str(text);
        payload.push('\n');
        let _ = self
            .queue
            .send(MessageQueueItem::from(multichat_reader::normalize(&payload)));
    }

    /// Marks the connection closed and wakes whoever is blocked on it.  The
    /// worker unwinds at its next I/O; the writer flushes what was already
    /// queued and shuts the socket down.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.closer.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once `close` has been called.
    pub async fn wait_closed(&self) {
        loop {
            let notified = self.closer.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    /// Binds a logged-in account to this connection.
    pub fn bind(&self, name: &str, account: Arc<Account>) {
        let mut session = self.session.lock();
        session.name = Some(name.to_owned());
        session.account = Some(account);
    }

    /// Drops the session binding on logout.
    pub fn unbind(&self) {
        let mut session = self.session.lock();
        session.name = None;
        session.account = None;
    }

    pub fn name(&self) -> Option<String> {
        self.session.lock().name.clone()
    }

    pub fn account(&self) -> Option<Arc<Account>> {
        self.session.lock().account.clone()
    }
}

/// The worker-owned side of a connection: the line reader plus the shared
/// handle.  Screens read and write through this.
pub struct Conn {
    id: usize,
    reader: LineReader<Box<dyn AsyncRead + Send + Sync + Unpin>>,
    client: Arc<Client>,
}

impl Conn {
    pub fn new(
        id: usize,
        stream: Box<dyn AsyncRead + Send + Sync + Unpin>,
        client: Arc<Client>,
    ) -> Conn {
        Conn {
            id,
            reader: LineReader::new(stream),
            client,
        }
    }

    /// The connection's slot in the server's connection table; channels key
    /// their membership maps with it.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// The logged-in username.  Screens below the inside menu may rely on
    /// it; a missing binding there is a programming error and tears the
    /// session down through the usual bordered report.
    pub fn name(&self) -> SessionResult<String> {
        self.client
            .name()
            .ok_or_else(|| SessionError::Internal("no account bound to this session".to_owned()))
    }

    pub fn account(&self) -> SessionResult<Arc<Account>> {
        self.client
            .account()
            .ok_or_else(|| SessionError::Internal("no account bound to this session".to_owned()))
    }

    /// Sends one line to the peer.  Unlike [`Client::print`], failing to
    /// talk to our own peer unwinds the worker.
    pub fn print(&self, text: &str) -> SessionResult<()> {
        if self.client.is_closed() {
            return Err(SessionError::Closed);
        }
        self.client.print(text);
        Ok(())
    }

    /// Sends a header line followed by one indented line per item.
    pub fn print_list(&self, header: &str, items: &[String]) -> SessionResult<()> {
        let mut out = String::from(header);
        for item in items {
            out.push_str("\n    ");
            out.push_str(item);
        }
        self.print(&out)
    }

    /// Reads the next line, without its terminator, optionally prompting
    /// first.  Blocks until the peer sends a line or the connection is
    /// closed under us.
    pub async fn input(&mut self, prompt: Option<&str>) -> SessionResult<String> {
        if let Some(prompt) = prompt {
            self.print(prompt)?;
        }
        if self.client.is_closed() {
            return Err(SessionError::Closed);
        }
        let line = tokio::select! {
            line = self.reader.next_line() => match line? {
                Some(line) => line,
                None => return Err(SessionError::Closed),
            },
            _ = self.client.wait_closed() => return Err(SessionError::Closed),
        };
        let line = &line[..line.len() - 2];
        String::from_utf8(line.to_vec()).map_err(|_| {
            SessionError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "line is not valid utf-8",
            ))
        })
    }
}

/// Drains a connection's queue into the socket.  Ends when the queue closes
/// or the connection is marked closed, flushing queued lines first.
pub fn spawn_writer(
    client: Arc<Client>,
    mut queue: mpsc::UnboundedReceiver<MessageQueueItem>,
    mut writer: OwnedWriteHalf,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                item = queue.recv() => match item {
                    Some(item) => {
                        if let Err(err) = writer.write_all(item.as_ref().as_bytes()).await {
                            log::debug!("{}: write failed: {}", client.addr(), err);
                            client.close();
                            break;
                        }
                    }
                    None => break,
                },
                _ = client.wait_closed() => {
                    while let Ok(item) = queue.try_recv() {
                        if writer.write_all(item.as_ref().as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }
        let _ = writer.shutdown().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> (Arc<Client>, mpsc::UnboundedReceiver<MessageQueueItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = SocketAddr::from(([127, 0, 0, 1], 40000));
        (Arc::new(Client::new(addr, tx)), rx)
    }

    #[test]
    fn print_normalises_to_crlf() {
        let (client, mut queue) = test_client();
        client.print("two\nlines");
        let item = queue.try_recv().unwrap();
        assert_eq!(item.as_ref(), "two\r\nlines\r\n");
    }

    #[test]
    fn print_after_close_is_dropped() {
        let (client, mut queue) = test_client();
        client.close();
        client.print("lost");
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn wait_closed_sees_an_earlier_close() {
        let (client, _queue) = test_client();
        client.close();
        client.wait_closed().await;
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn input_unwinds_on_forced_close() {
        let (client, _queue) = test_client();
        let (_keep_open, read_end) = tokio::io::duplex(64);
        let mut conn = Conn::new(0, Box::new(read_end), client.clone());
        client.close();
        match conn.input(None).await {
            Err(SessionError::Closed) => {}
            other => panic!("expected Closed, got {:?}", other.map(|_| ())),
        }
    }
}
