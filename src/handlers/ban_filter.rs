//! The first gate every connection passes.
//!
//! The peer's address is reverse-resolved; if the hostname, any of its
//! aliases (case-insensitively) or the numeric address appears on the
//! global ban list, the connection is dropped without a word.  The filter
//! runs exactly once: the screen sits at the bottom of the stack, and a
//! session unwinding back down to it is disconnected.

use crate::client::Conn;
use crate::handler::{Handler, SessionError, Step};
use crate::handlers::OutsideMenu;
use crate::lines;
use crate::state::State;
use async_trait::async_trait;
use std::sync::Arc;

pub struct BanFilter {
    passed: bool,
}

impl BanFilter {
    pub fn new() -> BanFilter {
        BanFilter { passed: false }
    }

    async fn is_blocked(conn: &Conn, state: &State) -> bool {
        let ip = conn.client().addr().ip();
        if state.bans.contains(&ip.to_string()).await {
            return true;
        }
        if let Some(resolver) = &state.resolver {
            if let Ok(lookup) = resolver.reverse_lookup(ip).await {
                for ptr in lookup.iter() {
                    let name = ptr.to_string();
                    let name = name.trim_end_matches('.');
                    if state.bans.matches_name(name).await {
                        return true;
                    }
                }
            }
        }
        false
    }
}

impl Default for BanFilter {
    fn default() -> Self {
        BanFilter::new()
    }
}

#[async_trait]
impl Handler for BanFilter {
    async fn handle(&mut self, conn: &mut Conn, state: &Arc<State>) -> Step {
        if self.passed {
            conn.print(lines::DISCONNECTING)?;
            conn.client().close();
            return Err(SessionError::Closed);
        }
        if Self::is_blocked(conn, state).await {
            log::info!("{}: rejected by the ban filter", conn.client().addr());
            conn.client().close();
            return Err(SessionError::Closed);
        }
        self.passed = true;
        Ok(Some(Box::new(OutsideMenu::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test::{script_conn, test_state};

    #[tokio::test]
    async fn banned_numeric_addresses_are_dropped() {
        let state = test_state();
        let (mut conn, _queue) = script_conn(1, "");
        state.bans.add(&conn.client().ip()).await;
        let mut filter = BanFilter::new();
        assert!(matches!(
            filter.handle(&mut conn, &state).await,
            Err(SessionError::Closed)
        ));
        assert!(conn.client().is_closed());
    }

    #[tokio::test]
    async fn clean_addresses_advance_to_the_outside_menu() {
        let state = test_state();
        let (mut conn, _queue) = script_conn(1, "");
        let mut filter = BanFilter::new();
        let step = filter.handle(&mut conn, &state).await.unwrap();
        assert!(step.is_some());
    }

    #[tokio::test]
    async fn a_second_pass_disconnects() {
        let state = test_state();
        let (mut conn, mut queue) = script_conn(1, "");
        let mut filter = BanFilter::new();
        filter.handle(&mut conn, &state).await.unwrap();
        assert!(matches!(
            filter.handle(&mut conn, &state).await,
            Err(SessionError::Closed)
        ));
        let out = crate::state::test::drain(&mut queue);
        assert!(out.contains(lines::DISCONNECTING));
    }
}
