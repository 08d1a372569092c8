//! SSH connections
//!
//! The executor talks to hosts through [`SshTransport`] and [`SshSession`].
//! [`OpenSsh`] implements them on top of the system `ssh` client.

mod openssh;

pub use openssh::{OpenSsh, OpenSshSession};

use async_trait::async_trait;

use crate::common::Result;
use crate::targets::Host;

/// Factory for sessions
#[async_trait]
pub trait SshTransport: Send + Sync {
    type Session: SshSession;

    /// Build a session to `host`, tunnelled through `via` when given
    ///
    /// Construction does no I/O. A proxied session brings its proxy up on
    /// `connect` if needed, so a dead proxy shows up as a connect error of the
    /// proxied session.
    fn session(&self, host: &Host, via: Option<&Self::Session>) -> Self::Session;

    /// Authenticate to `host` once so later sessions along the same path do
    /// not prompt. With `via`, the path goes through that session's host.
    async fn cache_credentials(&self, host: &Host, via: Option<&Self::Session>) -> Result<()>;
}

/// A single (possibly proxied) connection to a host
#[async_trait]
pub trait SshSession: Send + Sync {
    fn host(&self) -> &Host;

    async fn connect(&mut self) -> Result<()>;

    /// Run `command` and fail unless its trimmed stdout equals `expected`
    async fn run_test_command(&mut self, command: &str, expected: &str) -> Result<()>;

    /// Close the session. `force` tears down its master even when this
    /// session did not connect it, and the proxy it went through.
    async fn close(&mut self, force: bool);
}
