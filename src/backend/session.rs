// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Authentication state

use crate::config::Credentials;

/// Login state owned by a backend instance
#[derive(Debug, Clone)]
pub struct Session {
    authenticated_user: Option<String>,
    users: Vec<Credentials>,
    token: String,
}

impl Session {
    /// Create a logged-out session for the given users and token
    #[must_use]
    pub fn new(users: Vec<Credentials>, token: impl Into<String>) -> Self {
        Self {
            authenticated_user: None,
            users,
            token: token.into(),
        }
    }

    /// Log in with a password; any previous login is replaced
    pub fn login(&mut self, user: &str, password: &str) -> bool {
        let valid = self
            .users
            .iter()
            .any(|c| c.user == user && c.password == password);
        self.authenticated_user = valid.then(|| user.to_string());
        valid
    }

    /// Log in with the shared token as the first registered user.
    ///
    /// Returns that user's credentials on success; on failure the session
    /// is left unauthenticated.
    pub fn token_login(&mut self, token: &str) -> Option<(String, String)> {
        let first = self.users.first().filter(|_| token == self.token).cloned();
        self.authenticated_user = first.as_ref().map(|c| c.user.clone());
        first.map(|c| (c.user, c.password))
    }

    /// Log out; idempotent
    pub fn logout(&mut self) {
        self.authenticated_user = None;
    }

    /// Whether a user is logged in
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated_user.is_some()
    }

    /// The logged-in user
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.authenticated_user.as_deref()
    }
}
