//! System OpenSSH transport
//!
//! Every session is backed by a multiplexed master connection
//! (`ControlMaster=auto` + `ControlPersist`). Control sockets are named after
//! the path (host, or proxy and host) so the credential warm-up and the timed
//! pass share one authenticated master. Proxied sessions reach their host with
//! `ProxyCommand ssh -W %h:%p` through the proxy's master, so the TCP
//! connection to the target originates on the proxy host.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::{SshSession, SshTransport};
use crate::common::config::SshConfig;
use crate::common::{paths, Error, Result};
use crate::targets::Host;

/// Extra time allowed on top of `ConnectTimeout` for authentication
const AUTH_GRACE_SECS: u64 = 5;

/// Transport driving the system `ssh` binary
pub struct OpenSsh {
    program: PathBuf,
    config: Arc<SshConfig>,
    control_dir: PathBuf,
}

impl OpenSsh {
    /// Locate the ssh client and prepare the control socket directory
    pub fn new(config: &SshConfig) -> Result<Self> {
        let program = which::which(&config.program)
            .map_err(|_| Error::SshNotFound(config.program.clone()))?;
        let control_dir = paths::ensure_control_dir()?;
        tracing::debug!(
            "Using {} with control sockets in {}",
            program.display(),
            control_dir.display()
        );
        Ok(Self::with_program(program, config.clone(), control_dir))
    }

    pub fn with_program(program: PathBuf, config: SshConfig, control_dir: PathBuf) -> Self {
        Self {
            program,
            config: Arc::new(config),
            control_dir,
        }
    }

    fn master_path(&self, host: &Host) -> PathBuf {
        self.control_dir
            .join(format!("{}.sock", host.full_domain_name()))
    }

    // Hashed to stay under the unix socket path limit
    fn hop_path(&self, proxy: &Host, host: &Host) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        proxy.full_domain_name().hash(&mut hasher);
        host.full_domain_name().hash(&mut hasher);
        self.control_dir.join(format!(
            "hop-{}-{:016x}.sock",
            std::process::id(),
            hasher.finish()
        ))
    }
}

#[async_trait]
impl SshTransport for OpenSsh {
    type Session = OpenSshSession;

    fn session(&self, host: &Host, via: Option<&OpenSshSession>) -> OpenSshSession {
        let control_path = match via {
            Some(proxy) => self.hop_path(&proxy.host, host),
            None => self.master_path(host),
        };

        OpenSshSession {
            host: host.clone(),
            program: self.program.clone(),
            config: self.config.clone(),
            control_path,
            proxy: via.map(|session| Proxy {
                host: session.host.clone(),
                control_path: session.control_path.clone(),
            }),
            connected: false,
        }
    }

    async fn cache_credentials(&self, host: &Host, via: Option<&OpenSshSession>) -> Result<()> {
        self.session(host, via).authenticate().await
    }
}

#[derive(Debug, Clone)]
struct Proxy {
    host: Host,
    control_path: PathBuf,
}

/// Session backed by an OpenSSH control master
#[derive(Debug)]
pub struct OpenSshSession {
    host: Host,
    program: PathBuf,
    config: Arc<SshConfig>,
    control_path: PathBuf,
    proxy: Option<Proxy>,
    connected: bool,
}

impl OpenSshSession {
    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    pub fn is_proxied(&self) -> bool {
        self.proxy.is_some()
    }

    /// Arguments bringing up (or reusing) a master for `host` on `control_path`
    fn master_invocation(
        &self,
        host: &Host,
        control_path: &Path,
        proxy: Option<&Proxy>,
        batch: bool,
    ) -> Vec<String> {
        let mut args = base_args(&self.config, control_path, batch);
        args.extend(master_args(&self.config));
        if let Some(proxy) = proxy {
            args.push("-o".to_string());
            args.push(format!(
                "ProxyCommand={}",
                proxy_command(&self.program, &self.config, proxy)
            ));
        }
        args.push(destination(host, &self.config));
        args.push("true".to_string());
        args
    }

    /// Bring up this session's master with the operator at the terminal
    ///
    /// A proxied session goes through the proxy's existing master, which the
    /// caller is expected to have authenticated first.
    async fn authenticate(&self) -> Result<()> {
        let destination = destination(&self.host, &self.config);
        let args =
            self.master_invocation(&self.host, &self.control_path, self.proxy.as_ref(), false);

        tracing::debug!("Warming credentials for {}", destination);

        // Inherit the terminal so password and host key prompts reach the operator
        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(Error::SshSpawn)?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::connect_failed(
                &destination,
                &format!("ssh exited with {}", status),
            ))
        }
    }

    async fn open_master(
        &self,
        host: &Host,
        control_path: &Path,
        proxy: Option<&Proxy>,
    ) -> Result<()> {
        let destination = destination(host, &self.config);
        let args = self.master_invocation(host, control_path, proxy, true);

        let secs = self.config.connect_timeout_secs + AUTH_GRACE_SECS;
        let output = self.run(&args, &destination, secs).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::connect_failed(&destination, &failure_reason(&output)))
        }
    }

    async fn exit_master(&self, host: &Host, control_path: &Path) {
        let destination = destination(host, &self.config);
        let args = vec![
            "-o".to_string(),
            format!("ControlPath={}", control_path.display()),
            "-O".to_string(),
            "exit".to_string(),
            destination.clone(),
        ];

        match self.run(&args, &destination, self.config.connect_timeout_secs).await {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                tracing::debug!("Closing {}: {}", destination, failure_reason(&output));
            }
            Err(e) => tracing::debug!("Closing {}: {}", destination, e),
        }
    }

    async fn run(&self, args: &[String], destination: &str, secs: u64) -> Result<Output> {
        tracing::trace!("{} {}", self.program.display(), args.join(" "));

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match timeout(Duration::from_secs(secs), child).await {
            Ok(result) => result.map_err(Error::SshSpawn),
            Err(_) => Err(Error::timeout(destination, secs)),
        }
    }
}

#[async_trait]
impl SshSession for OpenSshSession {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn connect(&mut self) -> Result<()> {
        if let Some(proxy) = &self.proxy {
            self.open_master(&proxy.host, &proxy.control_path, None)
                .await?;
        }

        self.open_master(&self.host, &self.control_path, self.proxy.as_ref())
            .await?;
        self.connected = true;
        Ok(())
    }

    async fn run_test_command(&mut self, command: &str, expected: &str) -> Result<()> {
        let destination = destination(&self.host, &self.config);
        if !self.connected {
            return Err(Error::NotConnected(destination));
        }

        let mut args = base_args(&self.config, &self.control_path, true);
        args.push("-o".to_string());
        args.push("ControlMaster=no".to_string());
        args.push(destination.clone());
        args.push(command.to_string());

        let output = self
            .run(&args, &destination, self.config.command_timeout_secs)
            .await?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                host: destination,
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let actual = String::from_utf8_lossy(&output.stdout);
        if actual.trim() != expected {
            return Err(Error::unexpected_output(&destination, expected, actual.trim()));
        }

        Ok(())
    }

    async fn close(&mut self, force: bool) {
        if self.connected || force {
            self.exit_master(&self.host, &self.control_path).await;
            self.connected = false;
        }

        if force {
            if let Some(proxy) = &self.proxy {
                self.exit_master(&proxy.host, &proxy.control_path).await;
            }
        }
    }
}

/// `[user@]host` for ssh
fn destination(host: &Host, config: &SshConfig) -> String {
    match host.user.as_deref().or(config.user.as_deref()) {
        Some(user) => format!("{}@{}", user, host.full_domain_name()),
        None => host.full_domain_name(),
    }
}

fn base_args(config: &SshConfig, control_path: &Path, batch: bool) -> Vec<String> {
    vec![
        "-o".to_string(),
        format!("BatchMode={}", if batch { "yes" } else { "no" }),
        "-o".to_string(),
        format!("ConnectTimeout={}", config.connect_timeout_secs),
        "-o".to_string(),
        format!("StrictHostKeyChecking={}", config.strict_host_key_checking),
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
    ]
}

fn master_args(config: &SshConfig) -> Vec<String> {
    vec![
        "-o".to_string(),
        "ControlMaster=auto".to_string(),
        "-o".to_string(),
        format!("ControlPersist={}s", config.control_persist_secs),
    ]
}

/// ProxyCommand that forwards stdio to `%h:%p` through the proxy's master
fn proxy_command(program: &Path, config: &SshConfig, proxy: &Proxy) -> String {
    format!(
        "'{}' -o BatchMode=yes -o ControlMaster=no -o 'ControlPath={}' -W %h:%p {}",
        program.display(),
        proxy.control_path.display(),
        destination(&proxy.host, config)
    )
}

/// Last non-empty stderr line, or the exit status
fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("ssh exited with {}", output.status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> OpenSsh {
        OpenSsh::with_program(
            PathBuf::from("/usr/bin/ssh"),
            SshConfig::default(),
            PathBuf::from("/run/user/1000/netreach"),
        )
    }

    #[test]
    fn test_destination_prefers_host_user() {
        let mut config = SshConfig::default();
        let host = Host::new("uan01").with_domain_suffix(Some("can.example.com"));
        assert_eq!(destination(&host, &config), "uan01.can.example.com");

        config.user = Some("root".to_string());
        assert_eq!(destination(&host, &config), "root@uan01.can.example.com");

        let mut admin = host.clone();
        admin.user = Some("admin".to_string());
        assert_eq!(destination(&admin, &config), "admin@uan01.can.example.com");
    }

    #[test]
    fn test_base_args() {
        let args = base_args(&SshConfig::default(), Path::new("/tmp/x.sock"), true);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert!(args.contains(&"ControlPath=/tmp/x.sock".to_string()));

        let interactive = base_args(&SshConfig::default(), Path::new("/tmp/x.sock"), false);
        assert!(interactive.contains(&"BatchMode=no".to_string()));
    }

    #[test]
    fn test_bare_sessions_share_master_socket() {
        let ssh = transport();
        let host = Host::new("ncn-m002");
        let first = ssh.session(&host, None);
        let second = ssh.session(&host, None);
        assert_eq!(first.control_path(), second.control_path());
        assert!(first.control_path().ends_with("ncn-m002.sock"));
        assert!(!first.is_proxied());
    }

    #[test]
    fn test_proxied_sockets_follow_the_path() {
        let ssh = transport();
        let from = ssh.session(&Host::new("ncn-m002"), None);
        let other = ssh.session(&Host::new("ncn-m004"), None);
        let cmn = Host::new("ncn-m003").with_domain_suffix(Some("cmn.example.com"));
        let nmn = Host::new("ncn-m003").with_domain_suffix(Some("nmn.example.com"));

        // Warm-up and timed pass land on the same master
        let warmed = ssh.session(&cmn, Some(&from));
        let tested = ssh.session(&cmn, Some(&from));
        assert!(warmed.is_proxied());
        assert_eq!(warmed.control_path(), tested.control_path());
        assert_eq!(warmed.host().full_domain_name(), "ncn-m003.cmn.example.com");

        assert_ne!(warmed.control_path(), ssh.session(&nmn, Some(&from)).control_path());
        assert_ne!(warmed.control_path(), ssh.session(&cmn, Some(&other)).control_path());
        assert_ne!(warmed.control_path(), ssh.session(&cmn, None).control_path());
    }

    #[test]
    fn test_warmup_invocation_is_interactive_and_proxied() {
        let ssh = transport();
        let from = ssh.session(&Host::new("ncn-m002"), None);
        let to = ssh.session(
            &Host::new("ncn-m003").with_domain_suffix(Some("cmn.example.com")),
            Some(&from),
        );

        let args = to.master_invocation(&to.host, &to.control_path, to.proxy.as_ref(), false);
        assert!(args.contains(&"BatchMode=no".to_string()));
        assert!(args.contains(&"ControlMaster=auto".to_string()));
        assert!(args.iter().any(|a| a.starts_with("ProxyCommand=") && a.contains("ncn-m002.sock")));
        assert_eq!(
            &args[args.len() - 2..],
            &["ncn-m003.cmn.example.com".to_string(), "true".to_string()]
        );
    }

    #[test]
    fn test_proxy_command_goes_through_proxy_master() {
        let ssh = transport();
        let from = ssh.session(&Host::new("ncn-m002"), None);
        let to = ssh.session(&Host::new("ncn-m003"), Some(&from));
        let proxy = to.proxy.as_ref().unwrap();

        let command = proxy_command(&ssh.program, &ssh.config, proxy);
        assert!(command.starts_with("'/usr/bin/ssh'"));
        assert!(command.contains("-W %h:%p"));
        assert!(command.contains("ControlPath=/run/user/1000/netreach/ncn-m002.sock"));
        assert!(command.ends_with(" ncn-m002"));
    }

    #[tokio::test]
    async fn test_run_before_connect_is_an_error() {
        let ssh = transport();
        let mut session = ssh.session(&Host::new("ncn-m002"), None);
        let err = session.run_test_command("echo hello", "hello").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_reason_uses_last_stderr_line() {
        use std::os::unix::process::ExitStatusExt;

        let output = Output {
            status: std::process::ExitStatus::from_raw(255 << 8),
            stdout: Vec::new(),
            stderr: b"Warning: Permanently added\nssh: connect to host x port 22: No route to host\n\n"
                .to_vec(),
        };
        assert_eq!(
            failure_reason(&output),
            "ssh: connect to host x port 22: No route to host"
        );

        let silent = Output {
            status: std::process::ExitStatus::from_raw(255 << 8),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert!(failure_reason(&silent).starts_with("ssh exited with"));
    }
}
