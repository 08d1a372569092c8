//! Scripted in-memory SSH transport for executor tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use netreach::common::Result;
use netreach::ssh::{SshSession, SshTransport};
use netreach::targets::{Inventory, TargetDirectory};
use netreach::{Error, Host, NodeType};

/// Something a session or the transport did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Warm(String),
    Connect { from: Option<String>, to: String },
    Command { to: String, command: String },
    Close { to: String, force: bool },
}

#[derive(Default)]
struct Script {
    /// (source hostname, destination full name) pairs that connect
    routes: HashSet<(String, String)>,
    /// Source hosts the operator cannot log in to
    dead: HashSet<String>,
    /// Destinations whose canary prints something else
    garbled: HashSet<String>,
    events: Vec<Event>,
}

/// Transport whose reachability is a fixed table
#[derive(Clone, Default)]
pub struct FakeTransport {
    script: Arc<Mutex<Script>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `from` to reach `to` (a fully qualified name)
    pub fn route(self, from: &str, to: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .routes
            .insert((from.to_string(), to.to_string()));
        self
    }

    pub fn dead(self, host: &str) -> Self {
        self.script.lock().unwrap().dead.insert(host.to_string());
        self
    }

    pub fn garbled(self, to: &str) -> Self {
        self.script.lock().unwrap().garbled.insert(to.to_string());
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.script.lock().unwrap().events.clone()
    }

    fn push(&self, event: Event) {
        self.script.lock().unwrap().events.push(event);
    }
}

pub struct FakeSession {
    host: Host,
    via: Option<String>,
    connected: bool,
    transport: FakeTransport,
}

#[async_trait]
impl SshTransport for FakeTransport {
    type Session = FakeSession;

    fn session(&self, host: &Host, via: Option<&FakeSession>) -> FakeSession {
        FakeSession {
            host: host.clone(),
            via: via.map(|session| session.host.hostname.clone()),
            connected: false,
            transport: self.clone(),
        }
    }

    async fn cache_credentials(&self, host: &Host, via: Option<&FakeSession>) -> Result<()> {
        self.push(Event::Warm(host.full_domain_name()));
        let script = self.script.lock().unwrap();
        let blocked = match via {
            Some(source) => script.dead.contains(&source.host.hostname),
            None => script.dead.contains(&host.hostname),
        };
        if blocked {
            return Err(Error::connect_failed(&host.full_domain_name(), "Permission denied"));
        }
        Ok(())
    }
}

#[async_trait]
impl SshSession for FakeSession {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn connect(&mut self) -> Result<()> {
        let to = self.host.full_domain_name();
        self.transport.push(Event::Connect {
            from: self.via.clone(),
            to: to.clone(),
        });

        let script = self.transport.script.lock().unwrap();
        let reachable = match &self.via {
            Some(from) => {
                !script.dead.contains(from) && script.routes.contains(&(from.clone(), to.clone()))
            }
            None => !script.dead.contains(&self.host.hostname),
        };
        drop(script);

        if !reachable {
            return Err(Error::connect_failed(&to, "Connection timed out"));
        }
        self.connected = true;
        Ok(())
    }

    async fn run_test_command(&mut self, command: &str, expected: &str) -> Result<()> {
        let to = self.host.full_domain_name();
        if !self.connected {
            return Err(Error::NotConnected(to));
        }
        self.transport.push(Event::Command {
            to: to.clone(),
            command: command.to_string(),
        });

        if self.transport.script.lock().unwrap().garbled.contains(&to) {
            return Err(Error::unexpected_output(&to, expected, "garbage"));
        }
        Ok(())
    }

    async fn close(&mut self, force: bool) {
        self.connected = false;
        self.transport.push(Event::Close {
            to: self.host.full_domain_name(),
            force,
        });
    }
}

/// Inventory wrapper counting refreshes
pub struct CountingDirectory {
    pub inner: Inventory,
    pub refreshes: usize,
}

impl CountingDirectory {
    pub fn new(hosts: &[(NodeType, &[&str])]) -> Self {
        let hosts: HashMap<NodeType, Vec<Host>> = hosts
            .iter()
            .map(|(node_type, names)| (*node_type, names.iter().map(|n| Host::new(*n)).collect()))
            .collect();
        Self {
            inner: Inventory::from_hosts(hosts),
            refreshes: 0,
        }
    }
}

#[async_trait]
impl TargetDirectory for CountingDirectory {
    async fn refresh(&mut self) -> Result<()> {
        self.refreshes += 1;
        self.inner.refresh().await
    }

    fn hosts(&self, node_type: NodeType) -> &[Host] {
        self.inner.hosts(node_type)
    }
}
