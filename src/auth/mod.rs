//! Authorization: single-use tokens checked before a port is granted.
//!
//! The curator consults an [`Authorizer`] before binding a client to a
//! document; binders themselves never see tokens. Tokens are consumed on
//! every check, granted or not.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::DocId;

/// Token-based access decisions.
pub trait Authorizer: Send + Sync {
    /// May `token` join the document `doc_id`? Consumes the token.
    fn authorize_join(&self, token: &str, doc_id: &DocId) -> bool;

    /// May `token` create a new document? Consumes the token.
    fn authorize_create(&self, token: &str) -> bool;
}

/// What a registered token grants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenScope {
    /// Join one specific document.
    Join(DocId),
    /// Create a new document.
    Create,
}

/// In-memory single-use token table.
///
/// Deny by default: unknown tokens and scope mismatches fail, and a failed
/// check still burns the token. Create tokens are only honored when the
/// register was opened with `allow_create`.
pub struct TokenRegister {
    allow_create: bool,
    tokens: Mutex<HashMap<String, TokenScope>>,
}

impl TokenRegister {
    pub fn new(allow_create: bool) -> Self {
        Self {
            allow_create,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Register a token, replacing any previous scope for it.
    pub fn register(&self, token: impl Into<String>, scope: TokenScope) {
        self.tokens
            .lock()
            .expect("token table lock")
            .insert(token.into(), scope);
    }

    fn consume(&self, token: &str) -> Option<TokenScope> {
        self.tokens.lock().expect("token table lock").remove(token)
    }
}

impl Authorizer for TokenRegister {
    fn authorize_join(&self, token: &str, doc_id: &DocId) -> bool {
        match self.consume(token) {
            Some(TokenScope::Join(id)) if id == *doc_id => true,
            Some(_) => {
                tracing::warn!(doc = %doc_id, "join token scope mismatch");
                false
            }
            None => false,
        }
    }

    fn authorize_create(&self, token: &str) -> bool {
        if !self.allow_create {
            return false;
        }
        matches!(self.consume(token), Some(TokenScope::Create))
    }
}

/// Grants everything. For development hosts and tests.
pub struct OpenAuthorizer;

impl Authorizer for OpenAuthorizer {
    fn authorize_join(&self, _token: &str, _doc_id: &DocId) -> bool {
        true
    }

    fn authorize_create(&self, _token: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_token_is_single_use() {
        let register = TokenRegister::new(false);
        let doc = DocId::new("doc");
        register.register("t1", TokenScope::Join(doc.clone()));

        assert!(register.authorize_join("t1", &doc));
        assert!(!register.authorize_join("t1", &doc));
    }

    #[test]
    fn join_token_is_scoped_to_its_document() {
        let register = TokenRegister::new(false);
        register.register("t1", TokenScope::Join(DocId::new("a")));

        assert!(!register.authorize_join("t1", &DocId::new("b")));
        // the mismatch burned the token
        assert!(!register.authorize_join("t1", &DocId::new("a")));
    }

    #[test]
    fn create_tokens_respect_the_allow_create_switch() {
        let closed = TokenRegister::new(false);
        closed.register("t1", TokenScope::Create);
        assert!(!closed.authorize_create("t1"));

        let open = TokenRegister::new(true);
        open.register("t1", TokenScope::Create);
        assert!(open.authorize_create("t1"));
        assert!(!open.authorize_create("t1"));
    }

    #[test]
    fn create_token_does_not_grant_join() {
        let register = TokenRegister::new(true);
        register.register("t1", TokenScope::Create);
        assert!(!register.authorize_join("t1", &DocId::new("doc")));
    }
}
