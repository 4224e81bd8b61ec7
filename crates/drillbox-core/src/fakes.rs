//! In-memory fakes for the environment and container runtime seams (testing only)
//!
//! `FakeEnvironment` models a tiny filesystem plus systemd units and answers
//! the handful of shell commands the validation strategies issue.
//! `ScriptedRuntime` imitates the docker CLI closely enough for the sandbox
//! manager and session orchestrator to run end-to-end without a daemon.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::environment::{EnvError, Environment, ExecOutput, FileStat};
use crate::sandbox::{CliOutput, ContainerRuntime, SandboxError, SandboxResult};

// ---------------------------------------------------------------------------
// FakeEnvironment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FakeFile {
    content: String,
    stat: FileStat,
}

#[derive(Debug, Default)]
struct EnvState {
    files: BTreeMap<String, FakeFile>,
    dirs: BTreeSet<String>,
    services: HashMap<String, (bool, bool)>,
    scripted: HashMap<String, ExecOutput>,
    executed: Vec<String>,
}

/// In-memory [`Environment`]. Every mutator takes `&self` so state can be
/// changed while the environment is shared with a running session.
#[derive(Debug, Default)]
pub struct FakeEnvironment {
    state: Mutex<EnvState>,
}

impl FakeEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: &str, content: &str, permissions: &str, owner: &str, group: &str) {
        let file = FakeFile {
            content: content.to_string(),
            stat: FileStat {
                permissions: permissions.to_string(),
                owner: owner.to_string(),
                group: group.to_string(),
                size: content.len() as u64,
            },
        };
        self.state.lock().unwrap().files.insert(path.to_string(), file);
    }

    pub fn add_dir(&self, path: &str) {
        self.state.lock().unwrap().dirs.insert(path.to_string());
    }

    pub fn remove(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.files.remove(path);
        state.dirs.remove(path);
    }

    pub fn set_service(&self, name: &str, active: bool, enabled: bool) {
        self.state
            .lock()
            .unwrap()
            .services
            .insert(name.to_string(), (active, enabled));
    }

    /// Answer `command` (matched exactly) with `output`.
    pub fn on_command(&self, command: &str, output: ExecOutput) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .insert(command.to_string(), output);
    }

    /// Every command passed to `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    fn builtin(state: &mut EnvState, command: &str) -> ExecOutput {
        let words = match shell_words::split(command) {
            Ok(words) => words,
            Err(e) => return failed(2, format!("bash: syntax error: {e}")),
        };
        let words: Vec<&str> = words.iter().map(String::as_str).collect();

        match words.as_slice() {
            ["true"] => ExecOutput::success(""),
            ["false"] => failed(1, ""),
            ["test", "-d", path] => status(state.dirs.contains(*path)),
            ["test", "-f", path] => status(state.files.contains_key(*path)),
            ["test", "-e", path] => {
                status(state.dirs.contains(*path) || state.files.contains_key(*path))
            }
            ["mkdir", "-p", path] | ["mkdir", path] => {
                state.dirs.insert((*path).to_string());
                ExecOutput::success("")
            }
            ["systemctl", "is-active", unit] => match state.services.get(*unit) {
                Some((true, _)) => ExecOutput::success("active\n"),
                _ => ExecOutput {
                    exit_code: 3,
                    stdout: "inactive\n".to_string(),
                    stderr: None,
                },
            },
            ["systemctl", "is-enabled", unit] => match state.services.get(*unit) {
                Some((_, true)) => ExecOutput::success("enabled\n"),
                Some((_, false)) => ExecOutput {
                    exit_code: 1,
                    stdout: "disabled\n".to_string(),
                    stderr: None,
                },
                None => failed(
                    1,
                    format!("Failed to get unit file state for {unit}: No such file or directory"),
                ),
            },
            [program, ..] => failed(127, format!("bash: {program}: command not found")),
            [] => ExecOutput::success(""),
        }
    }
}

fn failed(exit_code: i32, stderr: impl Into<String>) -> ExecOutput {
    let stderr = stderr.into();
    ExecOutput {
        exit_code,
        stdout: String::new(),
        stderr: if stderr.is_empty() { None } else { Some(stderr) },
    }
}

fn status(ok: bool) -> ExecOutput {
    if ok {
        ExecOutput::success("")
    } else {
        failed(1, "")
    }
}

#[async_trait]
impl Environment for FakeEnvironment {
    async fn execute(&self, command: &str, _user: Option<&str>) -> ExecOutput {
        let mut state = self.state.lock().unwrap();
        state.executed.push(command.to_string());
        if let Some(output) = state.scripted.get(command) {
            return output.clone();
        }
        Self::builtin(&mut state, command)
    }

    async fn read_file(&self, path: &str) -> Result<String, EnvError> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| EnvError::NotFound {
                path: path.to_string(),
            })
    }

    async fn exists(&self, path: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    async fn stat(&self, path: &str) -> Result<FileStat, EnvError> {
        let state = self.state.lock().unwrap();
        if let Some(file) = state.files.get(path) {
            return Ok(file.stat.clone());
        }
        if state.dirs.contains(path) {
            return Ok(FileStat {
                permissions: "755".to_string(),
                owner: "root".to_string(),
                group: "root".to_string(),
                size: 4096,
            });
        }
        Err(EnvError::NotFound {
            path: path.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedRuntime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum ExecReply {
    Output(CliOutput),
    TimesOut,
}

#[derive(Debug)]
struct RuntimeState {
    calls: Vec<Vec<String>>,
    images: HashSet<String>,
    all_images_present: bool,
    build_status: i32,
    containers: HashMap<String, bool>,
    next_id: u32,
    exec_replies: Vec<(String, ExecReply)>,
    forced: VecDeque<(String, CliOutput)>,
    run_times_out: bool,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            images: HashSet::new(),
            all_images_present: true,
            build_status: 0,
            containers: HashMap::new(),
            next_id: 1,
            exec_replies: Vec::new(),
            forced: VecDeque::new(),
            run_times_out: false,
        }
    }
}

/// Docker-CLI imitation that records every invocation.
///
/// By default every image exists, every container launches, and every
/// `exec` succeeds with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    state: Mutex<RuntimeState>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every image as absent until built.
    pub fn without_images(self) -> Self {
        self.state.lock().unwrap().all_images_present = false;
        self
    }

    /// Make `build` exit with `status`.
    pub fn fail_build(self, status: i32) -> Self {
        self.state.lock().unwrap().build_status = status;
        self
    }

    /// Answer `exec` calls whose shell command contains `pattern`.
    pub fn on_exec(&self, pattern: &str, reply: CliOutput) {
        self.state
            .lock()
            .unwrap()
            .exec_replies
            .push((pattern.to_string(), ExecReply::Output(reply)));
    }

    /// Make `exec` calls whose shell command contains `pattern` hit their timeout.
    pub fn on_exec_timeout(&self, pattern: &str) {
        self.state
            .lock()
            .unwrap()
            .exec_replies
            .push((pattern.to_string(), ExecReply::TimesOut));
    }

    /// Make `run` create its container and then hit the caller's timeout.
    pub fn run_times_out(self) -> Self {
        self.state.lock().unwrap().run_times_out = true;
        self
    }

    /// Answer the next invocation of `subcommand` with `reply`, once.
    pub fn fail_next(&self, subcommand: &str, reply: CliOutput) {
        self.state
            .lock()
            .unwrap()
            .forced
            .push_back((subcommand.to_string(), reply));
    }

    /// Simulate the container exiting on its own.
    pub fn kill(&self, name: &str) {
        if let Some(running) = self.state.lock().unwrap().containers.get_mut(name) {
            *running = false;
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Invocations whose first argument is `subcommand`.
    pub fn calls_for(&self, subcommand: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.first().map(String::as_str) == Some(subcommand))
            .collect()
    }

    /// Names of containers that have not been removed.
    pub fn containers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .containers
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn no_such_container(name: &str) -> CliOutput {
        CliOutput::failed(
            1,
            format!("Error response from daemon: No such container: {name}"),
        )
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn invoke(&self, args: &[String], timeout: Option<Duration>) -> SandboxResult<CliOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(args.to_vec());

        let sub = args.first().map(String::as_str).unwrap_or_default();
        if let Some(pos) = state.forced.iter().position(|(s, _)| s == sub) {
            if let Some((_, reply)) = state.forced.remove(pos) {
                return Ok(reply);
            }
        }
        let last = args.last().cloned().unwrap_or_default();

        let reply = match sub {
            "version" => CliOutput::ok("24.0.7\n"),
            "image" => {
                if state.all_images_present || state.images.contains(&last) {
                    CliOutput::ok("sha256:0123456789abcdef\n")
                } else {
                    CliOutput::failed(1, format!("Error: No such image: {last}"))
                }
            }
            "run" => {
                let name = args
                    .iter()
                    .position(|a| a == "--name")
                    .and_then(|i| args.get(i + 1))
                    .cloned()
                    .unwrap_or_default();
                let id = format!("{:064x}", state.next_id);
                state.next_id += 1;
                state.containers.insert(name, true);
                if let (true, Some(limit)) = (state.run_times_out, timeout) {
                    return Err(SandboxError::Timeout {
                        operation: "docker run".to_string(),
                        secs: limit.as_secs(),
                    });
                }
                CliOutput::ok(format!("{id}\n"))
            }
            "inspect" => match state.containers.get(&last) {
                Some(running) => CliOutput::ok(format!("{running}\n")),
                None => CliOutput::failed(1, format!("Error: No such object: {last}")),
            },
            "exec" => {
                let name_at = if args.get(1).map(String::as_str) == Some("-u") {
                    3
                } else {
                    1
                };
                let name = args.get(name_at).cloned().unwrap_or_default();
                if state.containers.get(&name) != Some(&true) {
                    return Ok(CliOutput::failed(
                        1,
                        format!("Error response from daemon: container {name} is not running"),
                    ));
                }
                match state
                    .exec_replies
                    .iter()
                    .find(|(pattern, _)| last.contains(pattern.as_str()))
                    .map(|(_, reply)| reply.clone())
                {
                    Some(ExecReply::Output(out)) => out,
                    Some(ExecReply::TimesOut) => match timeout {
                        Some(limit) => {
                            return Err(SandboxError::Timeout {
                                operation: "docker exec".to_string(),
                                secs: limit.as_secs(),
                            })
                        }
                        None => CliOutput::ok(""),
                    },
                    None => CliOutput::ok(""),
                }
            }
            "cp" => {
                let name = last.split(':').next().unwrap_or_default().to_string();
                if state.containers.contains_key(&name) {
                    CliOutput::ok("")
                } else {
                    Self::no_such_container(&name)
                }
            }
            "stop" => match state.containers.get_mut(&last) {
                Some(running) => {
                    *running = false;
                    CliOutput::ok(format!("{last}\n"))
                }
                None => Self::no_such_container(&last),
            },
            "rm" => match state.containers.remove(&last) {
                Some(_) => CliOutput::ok(format!("{last}\n")),
                None => Self::no_such_container(&last),
            },
            other => CliOutput::failed(1, format!("unknown command: {other}")),
        };
        Ok(reply)
    }

    async fn stream(
        &self,
        args: &[String],
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> SandboxResult<i32> {
        let status = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(args.to_vec());
            if state.build_status == 0 {
                if let Some(tag) = args
                    .iter()
                    .position(|a| a == "-t")
                    .and_then(|i| args.get(i + 1))
                {
                    let tag = tag.clone();
                    state.images.insert(tag);
                }
            }
            state.build_status
        };

        on_line("Step 1/2 : FROM base");
        if status == 0 {
            on_line("Successfully built 0123456789ab");
        } else {
            on_line("error: recipe step failed");
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_environment_mkdir_then_test() {
        let env = FakeEnvironment::new();
        assert_eq!(env.execute("test -d /srv/data", None).await.exit_code, 1);
        env.execute("mkdir -p /srv/data", None).await;
        assert_eq!(env.execute("test -d /srv/data", None).await.exit_code, 0);
        assert!(env.exists("/srv/data").await);
    }

    #[tokio::test]
    async fn test_scripted_runtime_container_lifecycle() {
        let rt = ScriptedRuntime::new();
        let run: Vec<String> = ["run", "-d", "--name", "box", "img"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(rt.invoke(&run, None).await.unwrap().success());
        assert_eq!(rt.containers(), vec!["box".to_string()]);

        let rm = vec!["rm".to_string(), "-f".to_string(), "box".to_string()];
        assert!(rt.invoke(&rm, None).await.unwrap().success());
        let again = rt.invoke(&rm, None).await.unwrap();
        assert!(again.is_no_such_container());
    }
}
