use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::peer::{PeerId, Session};

/// The table of live sessions, keyed by id.
///
/// Once closed it stays empty: later inserts are refused, which is how shutdown keeps
/// late connections out.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: BTreeMap<PeerId, Session>,
    closed: bool,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Store a session under its id. Hands the session back if the registry is closed.
    pub fn put(&self, session: Session) -> Result<(), Session> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(session);
        }
        inner.sessions.insert(session.id(), session);
        Ok(())
    }

    pub fn remove(&self, id: PeerId) -> Option<Session> {
        self.inner.lock().sessions.remove(&id)
    }

    pub fn get(&self, id: PeerId) -> Option<Session> {
        self.inner.lock().sessions.get(&id).cloned()
    }

    /// Every registered session at this instant, in id order.
    pub fn snapshot(&self) -> Vec<(PeerId, Session)> {
        self.inner
            .lock()
            .sessions
            .iter()
            .map(|(id, session)| (*id, session.clone()))
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Refuse further inserts and take everything currently registered.
    pub fn close(&self) -> Vec<Session> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        std::mem::take(&mut inner.sessions).into_values().collect()
    }
}
