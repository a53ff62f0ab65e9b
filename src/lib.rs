//! A multi-user chat server.
//!
//! Clients speak CRLF-terminated text over plain TCP.  Each connection is
//! driven through a stack of modal screens: the ban filter, the outside
//! menu (register/login), the inside menu, and from there channels,
//! contacts, the inbox, account options and the administration consoles.
//! Accounts, channels and the address ban list are process-wide registries,
//! loaded from a persistence directory at startup and written back at
//! shutdown.

pub mod account;
pub mod channel;
pub mod client;
pub mod config;
pub mod handler;
pub mod handlers;
pub mod lines;
pub mod net;
pub mod persist;
pub mod state;
pub mod util;

pub use config::Config;
pub use state::State;
