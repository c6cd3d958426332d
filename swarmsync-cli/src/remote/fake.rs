//! In-memory swarm manager used by the unit tests
//!
//! Interprets the docker/git/shell commands this crate emits and keeps just
//! enough orchestrator state to observe their effects.

use super::{CommandOutput, RemoteCommand, RemoteExecutor};
use crate::error::{ConnectivitySnafu, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct FakeState {
    swarm_active: bool,
    secrets: BTreeMap<String, Vec<u8>>,
    in_use: BTreeSet<String>,
    files: BTreeMap<String, String>,
    unreadable: BTreeSet<String>,
    failing_builds: BTreeSet<String>,
    failing_deploys: BTreeSet<String>,
    failing_creates: BTreeSet<String>,
    built: Vec<String>,
    deployed: Vec<String>,
    commands: Vec<String>,
    unreachable: bool,
}

#[derive(Debug)]
pub struct FakeSwarm {
    state: Mutex<FakeState>,
}

impl Default for FakeSwarm {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSwarm {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                swarm_active: true,
                ..FakeState::default()
            }),
        }
    }

    fn with(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn inactive(self) -> Self {
        self.with(|s| s.swarm_active = false)
    }

    pub fn unreachable(self) -> Self {
        self.with(|s| s.unreachable = true)
    }

    pub fn with_secret(self, name: &str, value: &str) -> Self {
        self.with(|s| {
            s.secrets.insert(name.to_string(), value.as_bytes().to_vec());
        })
    }

    /// Mark a secret as referenced by a running service
    pub fn with_in_use(self, name: &str) -> Self {
        self.with(|s| {
            s.in_use.insert(name.to_string());
        })
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.with(|s| {
            s.files.insert(path.to_string(), content.to_string());
        })
    }

    /// Make `ls`/`cat` of this path fail as if permissions were missing
    pub fn unreadable(self, path: &str) -> Self {
        self.with(|s| {
            s.unreadable.insert(path.to_string());
        })
    }

    pub fn failing_build(self, tag: &str) -> Self {
        self.with(|s| {
            s.failing_builds.insert(tag.to_string());
        })
    }

    pub fn failing_deploy(self, stack: &str) -> Self {
        self.with(|s| {
            s.failing_deploys.insert(stack.to_string());
        })
    }

    pub fn failing_create(self, secret: &str) -> Self {
        self.with(|s| {
            s.failing_creates.insert(secret.to_string());
        })
    }

    pub fn secrets(&self) -> BTreeMap<String, String> {
        self.state
            .lock()
            .unwrap()
            .secrets
            .iter()
            .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).into_owned()))
            .collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn built(&self) -> Vec<String> {
        self.state.lock().unwrap().built.clone()
    }

    pub fn deployed(&self) -> Vec<String> {
        self.state.lock().unwrap().deployed.clone()
    }

    pub fn swarm_active(&self) -> bool {
        self.state.lock().unwrap().swarm_active
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(code: i32, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

/// Split a command line produced by `remote::quote` back into words
fn words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

impl FakeState {
    fn handle(&mut self, request: &RemoteCommand) -> CommandOutput {
        let command = request.command.as_str();
        if command.contains("docker service inspect") {
            return ok(self.in_use.iter().map(|n| format!("{n}\n")).collect::<String>());
        }

        let args = words(command);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["docker", "info", ..] => {
                ok(if self.swarm_active { "active\n" } else { "inactive\n" })
            }
            ["docker", "swarm", "init", ..] => {
                self.swarm_active = true;
                ok("Swarm initialized")
            }
            ["docker", "secret", "ls", ..] => {
                ok(self.secrets.keys().map(|n| format!("{n}\n")).collect::<String>())
            }
            ["docker", "secret", "rm", name] => {
                if self.in_use.contains(*name) {
                    fail(1, format!("Error response from daemon: secret '{name}' is in use"))
                } else if self.secrets.remove(*name).is_some() {
                    ok(format!("{name}\n"))
                } else {
                    fail(1, format!("Error: No such secret: {name}"))
                }
            }
            ["docker", "secret", "create", name, "-"] => {
                if self.failing_creates.contains(*name) {
                    fail(1, "Error response from daemon: rpc error: code = Unknown")
                } else if self.secrets.contains_key(*name) {
                    fail(1, format!("Error response from daemon: secret {name} already exists"))
                } else {
                    let payload = request.stdin.clone().unwrap_or_default();
                    self.secrets.insert((*name).to_string(), payload);
                    ok("x1y2z3\n")
                }
            }
            ["docker", "build", "-t", tag, ..] => {
                if self.failing_builds.contains(*tag) {
                    fail(1, "failed to solve: process did not complete successfully")
                } else {
                    self.built.push((*tag).to_string());
                    ok(format!("Successfully tagged {tag}\n"))
                }
            }
            ["docker", "stack", "deploy", "-c", _path, stack] => {
                if self.failing_deploys.contains(*stack) {
                    fail(1, "service web: undefined secret")
                } else {
                    self.deployed.push((*stack).to_string());
                    ok(format!("Creating service {stack}_web\n"))
                }
            }
            ["find", root, ..] => {
                let prefix = format!("{root}/");
                let dirs: BTreeSet<String> = self
                    .files
                    .keys()
                    .filter_map(|path| path.strip_prefix(&prefix))
                    .filter_map(|rest| rest.split_once('/').map(|(dir, _)| dir.to_string()))
                    .collect();
                ok(dirs.into_iter().map(|d| format!("{d}\n")).collect::<String>())
            }
            ["ls", "-1A", dir] if self.unreadable.contains(*dir) => fail(
                2,
                format!("ls: cannot open directory '{dir}': Permission denied"),
            ),
            ["ls", "-1A", dir] => {
                let prefix = format!("{dir}/");
                let names: Vec<String> = self
                    .files
                    .keys()
                    .filter_map(|path| path.strip_prefix(&prefix))
                    .filter(|rest| !rest.contains('/'))
                    .map(|name| format!("{name}\n"))
                    .collect();
                ok(names.concat())
            }
            ["cat", path] if self.unreadable.contains(*path) => {
                fail(1, format!("cat: {path}: Permission denied"))
            }
            ["cat", path] => match self.files.get(*path) {
                Some(content) => ok(content.clone()),
                None => fail(1, format!("cat: {path}: No such file or directory")),
            },
            ["test", ..] | ["git", ..] | ["if", ..] => ok(""),
            _ => fail(127, format!("fake swarm: unsupported command: {command}")),
        }
    }
}

#[async_trait]
impl RemoteExecutor for FakeSwarm {
    fn endpoint(&self) -> &str {
        "fake"
    }

    async fn run(&self, request: RemoteCommand) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return ConnectivitySnafu {
                endpoint: "fake",
                reason: "ssh: connect to host fake port 22: Connection refused",
            }
            .fail();
        }
        state.commands.push(request.command.clone());
        Ok(state.handle(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_roundtrip_quote() {
        let line = format!(
            "docker secret create {} -",
            crate::remote::quote("we'ird name")
        );
        assert_eq!(words(&line), vec!["docker", "secret", "create", "we'ird name", "-"]);
    }
}
