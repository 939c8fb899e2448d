//! Conversation sessions
//!
//! History lives in an in-memory arena keyed by [`SessionId`]. The HTTP shell
//! only ever uses [`SessionId::default_session`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dialogue::ConversationHistory;
use crate::{Error, Result};

const DEFAULT_SESSION: &str = "default";

/// Opaque session key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The single session used by the HTTP shell and CLI
    #[must_use]
    pub fn default_session() -> Self {
        Self(DEFAULT_SESSION.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::default_session()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owns one [`ConversationHistory`] per session
///
/// Always contains the default session.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<SessionId, ConversationHistory>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        let mut sessions = HashMap::new();
        sessions.insert(SessionId::default_session(), ConversationHistory::new());
        Self { sessions }
    }

    /// Create `id` with a fresh history if it does not exist yet
    pub fn open(&mut self, id: SessionId) -> &mut ConversationHistory {
        self.sessions.entry(id).or_default()
    }

    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown id
    pub fn get(&self, id: &SessionId) -> Result<&ConversationHistory> {
        self.sessions
            .get(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown id
    pub fn get_mut(&mut self, id: &SessionId) -> Result<&mut ConversationHistory> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// Drop a session; the default session is reset instead of removed
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown id
    pub fn close(&mut self, id: &SessionId) -> Result<()> {
        if *id == SessionId::default_session() {
            self.get_mut(id)?.reset();
            return Ok(());
        }

        self.sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_exists() {
        let store = SessionStore::new();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&SessionId::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_session() {
        let mut store = SessionStore::new();
        let id = SessionId::new("kitchen");
        assert!(matches!(store.get(&id), Err(Error::SessionNotFound(s)) if s == "kitchen"));
        assert!(store.get_mut(&id).is_err());
        assert!(store.close(&id).is_err());
    }

    #[test]
    fn test_open_and_close() {
        let mut store = SessionStore::new();
        let id = SessionId::new("kitchen");

        assert_eq!(store.open(id.clone()).len(), 1);
        assert_eq!(store.len(), 2);

        store.close(&id).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_closing_default_keeps_it() {
        let mut store = SessionStore::new();
        store.close(&SessionId::default()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&SessionId::default()).is_ok());
    }

    #[test]
    fn test_session_id_serializes_as_string() {
        let json = serde_json::to_string(&SessionId::new("abc")).unwrap();
        assert_eq!(json, r#""abc""#);
    }
}
