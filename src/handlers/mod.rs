//! The modal screens, one module per area of the server.

mod admin;
mod ban_filter;
mod chan_admin;
mod channel;
mod contacts;
mod eval;
mod inside;
mod messages;
mod options;
mod outside;
mod shaney;


pub use admin::{AccountEditor, AdminConsole};
pub use ban_filter::BanFilter;
pub use chan_admin::ChannelAdmin;
pub use channel::ChannelSession;
pub use contacts::ContactManager;
pub use eval::{NewMathEvaluator, OldMathEvaluator};
pub use inside::InsideMenu;
pub use messages::MessageManager;
pub use options::AccountOptions;
pub use outside::OutsideMenu;
pub use shaney::Summarizer;
