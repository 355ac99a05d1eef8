//! Credential verification ahead of dispatch.
//!
//! The [`AuthGate`] wraps an optional [`Authenticator`] backend. Empty user
//! names and passwords are rejected by the gate itself and never reach the
//! backend. Passwords are compared in plaintext.

use std::fmt;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::request::Credentials;

const AUTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::auth");

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    name: String,
    password: String,
    groups: Vec<String>,
}

impl User {
    /// Builds a user record.
    #[must_use]
    pub fn new(name: impl Into<String>, password: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            groups,
        }
    }

    /// Login name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group memberships.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Returns `true` when the user belongs to `group`.
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|candidate| candidate == group)
    }

    fn password_matches(&self, password: &str) -> bool {
        self.password == password
    }
}

/// A user store consulted by the [`AuthGate`].
#[cfg_attr(test, mockall::automock)]
pub trait Authenticator: Send + Sync {
    /// Returns the matching user when the credentials are valid.
    fn authenticate(&self, user: &str, password: &str) -> Option<User>;
}

/// In-memory user store keyed by login name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDirectory {
    users: IndexMap<String, User>,
}

impl UserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user, replacing any previous entry with the same name.
    pub fn insert(&mut self, user: User) {
        self.users.insert(user.name.clone(), user);
    }

    /// Looks up a user by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    /// Number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` when the directory holds no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Parses `user:password[:group,group]` lines. Whitespace around each
    /// field is ignored, so `user: password` lines read the same.
    ///
    /// Blank lines, `#` comments and lines without a password separator are
    /// ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut directory = Self::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(3, ':').map(str::trim);
            let (Some(name), Some(password)) = (fields.next(), fields.next()) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let groups = fields
                .next()
                .map(|groups| {
                    groups
                        .split(',')
                        .map(str::trim)
                        .filter(|group| !group.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default();
            directory.insert(User::new(name, password, groups));
        }
        directory
    }
}

impl FromIterator<User> for UserDirectory {
    fn from_iter<I: IntoIterator<Item = User>>(iter: I) -> Self {
        let mut directory = Self::new();
        for user in iter {
            directory.insert(user);
        }
        directory
    }
}

impl Authenticator for UserDirectory {
    fn authenticate(&self, user: &str, password: &str) -> Option<User> {
        self.get(user)
            .filter(|candidate| candidate.password_matches(password))
            .cloned()
    }
}

/// User store backed by a password file, read on first use.
pub struct HtpasswdAuthenticator {
    path: Utf8PathBuf,
    directory: OnceCell<UserDirectory>,
}

impl HtpasswdAuthenticator {
    /// Creates an authenticator reading `path` lazily.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            directory: OnceCell::new(),
        }
    }

    /// Password file location.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn directory(&self) -> &UserDirectory {
        self.directory.get_or_init(|| match fs::read_to_string(&self.path) {
            Ok(text) => {
                let directory = UserDirectory::parse(&text);
                debug!(
                    target: AUTH_TARGET,
                    path = %self.path,
                    users = directory.len(),
                    "loaded password file"
                );
                directory
            }
            Err(error) => {
                warn!(
                    target: AUTH_TARGET,
                    path = %self.path,
                    %error,
                    "password file unreadable, denying all users"
                );
                UserDirectory::new()
            }
        })
    }
}

impl fmt::Debug for HtpasswdAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtpasswdAuthenticator")
            .field("path", &self.path)
            .field("loaded", &self.directory.get().is_some())
            .finish()
    }
}

impl Authenticator for HtpasswdAuthenticator {
    fn authenticate(&self, user: &str, password: &str) -> Option<User> {
        self.directory().authenticate(user, password)
    }
}

/// Optional authentication stage of the dispatcher.
#[derive(Clone, Default)]
pub struct AuthGate {
    backend: Option<Arc<dyn Authenticator>>,
}

impl AuthGate {
    /// A gate that lets every request through.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A gate that requires valid credentials from `backend`.
    #[must_use]
    pub const fn new(backend: Arc<dyn Authenticator>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Returns `true` when a backend is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Verifies claimed credentials.
    ///
    /// Missing or empty credentials fail without consulting the backend. A
    /// disabled gate rejects everything; callers check
    /// [`AuthGate::is_enabled`] first.
    #[must_use]
    pub fn authenticate(&self, credentials: Option<&Credentials>) -> Option<User> {
        let backend = self.backend.as_ref()?;
        let supplied = credentials?;
        if supplied.user().is_empty() || supplied.password().is_empty() {
            return None;
        }
        backend.authenticate(supplied.user(), supplied.password())
    }
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
