// SPDX-License-Identifier: MIT OR Apache-2.0
//! Short-lived SSH credentials with guaranteed scrubbing.

use std::fmt;

/// SSH credentials for a single probe.
///
/// The object is never serialised (`Serialize` is not implemented) and its
/// `Debug`/`Display` output is a fixed redacted form. [`clear`] overwrites
/// every secret with same-length filler before releasing it, and the `Drop`
/// impl repeats the scrub so even a panic between construction and the
/// explicit clear cannot leave secrets behind.
///
/// [`clear`]: ProbeCredentials::clear
#[derive(Clone)]
pub struct ProbeCredentials {
    /// SSH username. Not secret; appears in logs.
    pub username: String,
    password: Option<String>,
    private_key: Option<String>,
    passphrase: Option<String>,
}

impl ProbeCredentials {
    /// Password-based credentials.
    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            private_key: None,
            passphrase: None,
        }
    }

    /// Key-based credentials with an optional passphrase.
    pub fn with_key(
        username: impl Into<String>,
        private_key: impl Into<String>,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: None,
            private_key: Some(private_key.into()),
            passphrase,
        }
    }

    /// Assemble from optional parts (request models).
    pub fn new(
        username: impl Into<String>,
        password: Option<String>,
        private_key: Option<String>,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password,
            private_key,
            passphrase,
        }
    }

    /// The password, when password auth was requested.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// The private key, when key auth was requested.
    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    /// The key passphrase, if any.
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    /// Overwrite every secret field with same-length filler, then drop it.
    pub fn clear(&mut self) {
        scrub(&mut self.password);
        scrub(&mut self.private_key);
        scrub(&mut self.passphrase);
    }

    /// Whether all secret fields have been cleared.
    pub fn is_cleared(&self) -> bool {
        self.password.is_none() && self.private_key.is_none() && self.passphrase.is_none()
    }
}

fn scrub(field: &mut Option<String>) {
    if let Some(value) = field.as_mut() {
        let len = value.len();
        value.clear();
        value.push_str(&"x".repeat(len));
    }
    *field = None;
}

impl fmt::Debug for ProbeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProbeCredentials(username={}, password=***, key=***)",
            self.username
        )
    }
}

impl fmt::Display for ProbeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Drop for ProbeCredentials {
    fn drop(&mut self) {
        self.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
