use std::fmt;
use std::fs::File;
use std::io;
use std::iter;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result, Stage};

/// How long a dropped process gets to honor SIGTERM before it is killed.
const REAP_GRACE: Duration = Duration::from_millis(500);

/// A program plus its arguments.
///
/// Command lines double as templates: any `{name}` inside a word is replaced by [`expand`].
///
///   [`expand`]: CommandLine::expand
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// A command line that runs `program` without arguments.
    pub fn new<S: Into<String>>(program: S) -> Self {
        CommandLine {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program to run.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments passed to the program.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Whether any word mentions the `{name}` placeholder.
    pub fn mentions(&self, name: &str) -> bool {
        let placeholder = format!("{{{}}}", name);
        self.words().any(|word| word.contains(&placeholder))
    }

    /// Returns a copy with every `{name}` replaced by its value.
    pub fn expand(&self, vars: &[(&str, &str)]) -> CommandLine {
        let substitute = |word: &String| {
            vars.iter().fold(word.clone(), |word, (name, value)| {
                word.replace(&format!("{{{}}}", name), value)
            })
        };
        CommandLine {
            program: substitute(&self.program),
            args: self.args.iter().map(substitute).collect(),
        }
    }

    fn words(&self) -> impl Iterator<Item = &String> {
        iter::once(&self.program).chain(&self.args)
    }
}

impl FromStr for CommandLine {
    type Err = Error;

    /// Splits `line` into words using POSIX shell quoting rules.
    fn from_str(line: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidCommand {
            line: line.to_string(),
            reason,
        };
        let mut words = shlex::split(line)
            .ok_or_else(|| invalid("unbalanced quotes or trailing escape"))?
            .into_iter();
        let program = words.next().ok_or_else(|| invalid("no program given"))?;
        Ok(CommandLine {
            program,
            args: words.collect(),
        })
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match shlex::try_quote(word) {
                Ok(quoted) => f.write_str(&quoted)?,
                Err(_) => f.write_str(word)?,
            }
        }
        Ok(())
    }
}

/// Where an output stream of a launched process goes.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum Redirect {
    /// Throw the output away.
    #[default]
    Discard,
    /// Share our own stream.
    Inherit,
    /// Truncate and write to the given file.
    File(PathBuf),
}

impl Redirect {
    fn open(&self) -> io::Result<Stdio> {
        Ok(match self {
            Redirect::Discard => Stdio::null(),
            Redirect::Inherit => Stdio::inherit(),
            Redirect::File(path) => File::create(path)?.into(),
        })
    }
}

/// Standard stream wiring for a launched process. Everything is discarded by default.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Streams {
    /// File to read standard input from; `None` connects it to the null device.
    pub stdin: Option<PathBuf>,
    /// Standard output policy.
    pub stdout: Redirect,
    /// Standard error policy.
    pub stderr: Redirect,
}

/// Exponential backoff used when polling a process with a bounded wait.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Backoff {
    /// First pause between polls.
    pub initial: Duration,
    /// Pauses double up to this ceiling.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
        }
    }
}

/// Polls `child` until it exits or `limit` passes. `Ok(None)` means the limit was hit.
fn poll_for(
    child: &mut Child,
    backoff: &Backoff,
    limit: Duration,
) -> io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    let mut delay = backoff.initial;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let elapsed = start.elapsed();
        if elapsed >= limit {
            return Ok(None);
        }
        thread::sleep(delay.min(limit - elapsed));
        delay = (delay * 2).min(backoff.max);
    }
}

/// Sends `signal` to the process group led by `pid`, which every launched process gets as its
/// own. A group that is already gone is not an error.
fn signal_group(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: killpg(2) takes plain integers and touches no memory of ours.
    if unsafe { libc::killpg(pgid, signal) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// The last observed state of a [`ManagedProcess`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LifecycleState {
    /// Still alive as of the last poll.
    Running,
    /// Exited and reaped.
    Terminated,
    /// The OS could not tell us.
    Unknown,
}

/// An externally launched process owned by a [`ProcessSupervisor`].
///
/// Each process leads its own process group, and signals go to the whole group, so anything the
/// process started is stopped along with it.
///
/// Dropping a process that is still running sends its group SIGTERM, waits briefly, then kills
/// the group and reaps the process. Whatever is left in the group once the process itself has
/// exited is killed as well, so nothing outlives the value that owns it.
#[derive(Debug)]
pub struct ManagedProcess {
    stage: Stage,
    program: String,
    pid: u32,
    child: Option<Child>,
    state: LifecycleState,
    status: Option<ExitStatus>,
}

impl ManagedProcess {
    /// OS process id.
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// The stage this process was launched for.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The program that was launched.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// State as of the last poll, wait or terminate.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Exit status, once the exit has been observed.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    fn observe_exit(&mut self, status: ExitStatus) {
        self.status = Some(status);
        self.state = LifecycleState::Terminated;
        // the exit is reaped, so the handle has nothing left to give
        self.child = None;
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                warn!(
                    "{}: reaping {} (pid {}) that was still running",
                    self.stage, self.program, self.pid
                );
                let exited = signal_group(self.pid, libc::SIGTERM).is_ok()
                    && matches!(
                        poll_for(&mut child, &Backoff::default(), REAP_GRACE),
                        Ok(Some(_))
                    );
                if !exited {
                    let _ = signal_group(self.pid, libc::SIGKILL);
                    let _ = child.wait();
                }
            }
        }
        // stragglers the process left behind in its group
        let _ = signal_group(self.pid, libc::SIGKILL);
    }
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Poll pacing for bounded waits.
    pub backoff: Backoff,

    /// How long [`ProcessSupervisor::terminate`] waits for a graceful exit before killing the
    /// process. `None` waits forever.
    pub kill_after: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            backoff: Backoff::default(),
            kill_after: Some(Duration::from_secs(10)),
        }
    }
}

/// Launches, polls and terminates [`ManagedProcess`]es.
///
/// Nothing else in this crate talks to the operating system's process API.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    opt: Options,
}

impl From<Options> for ProcessSupervisor {
    fn from(opt: Options) -> Self {
        ProcessSupervisor { opt }
    }
}

impl ProcessSupervisor {
    /// Spawns `command` with the given stream wiring.
    pub fn launch(
        &self,
        stage: Stage,
        command: &CommandLine,
        streams: &Streams,
    ) -> Result<ManagedProcess> {
        let io_error = |source| Error::Io { stage, source };
        let stdin = match streams.stdin {
            Some(ref path) => File::open(path).map_err(io_error)?.into(),
            None => Stdio::null(),
        };
        let stdout = streams.stdout.open().map_err(io_error)?;
        let stderr = streams.stderr.open().map_err(io_error)?;

        let child = Command::new(command.program())
            .args(command.arguments())
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .spawn()
            .map_err(|source| Error::Launch {
                stage,
                program: command.program().to_string(),
                source,
            })?;

        let pid = child.id();
        debug!("{}: launched `{}` as pid {}", stage, command, pid);
        Ok(ManagedProcess {
            stage,
            program: command.program().to_string(),
            pid,
            child: Some(child),
            state: LifecycleState::Running,
            status: None,
        })
    }

    /// Refreshes cached `sudo` credentials in the foreground if `command` runs through `sudo`.
    ///
    /// Launched processes lead their own process group, which is in the background as far as the
    /// terminal is concerned, so a password prompt from them would stop the process instead of
    /// reaching the user. Any other command needs nothing.
    pub fn authorize(&self, stage: Stage, command: &CommandLine) -> Result<()> {
        if command.program() != "sudo" {
            return Ok(());
        }
        debug!("{}: refreshing sudo credentials", stage);
        let status = Command::new("sudo")
            .arg("-v")
            .status()
            .map_err(|source| Error::Launch {
                stage,
                program: "sudo".to_string(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::StageFailed { stage, status })
        }
    }

    /// Checks on `process` without blocking.
    pub fn poll(&self, process: &mut ManagedProcess) -> LifecycleState {
        if let Some(child) = process.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("{}: pid {} exited with {}", process.stage, process.pid, status);
                    process.observe_exit(status);
                }
                Ok(None) => process.state = LifecycleState::Running,
                Err(e) => {
                    warn!("{}: could not poll pid {}: {}", process.stage, process.pid, e);
                    process.state = LifecycleState::Unknown;
                }
            }
        }
        process.state
    }

    /// Fails with [`Error::UnexpectedExit`] if `process` has exited.
    pub fn ensure_running(&self, process: &mut ManagedProcess) -> Result<()> {
        self.poll(process);
        match process.status {
            Some(status) => Err(Error::UnexpectedExit {
                stage: process.stage,
                pid: process.pid,
                status,
            }),
            None => Ok(()),
        }
    }

    /// Blocks until `process` exits.
    ///
    /// With a `timeout` the process is polled with exponential backoff and [`Error::Timeout`] is
    /// returned once the bound passes; the process is left running in that case.
    pub fn wait(
        &self,
        process: &mut ManagedProcess,
        timeout: Option<Duration>,
    ) -> Result<ExitStatus> {
        let (stage, pid) = (process.stage, process.pid);
        let child = match process.child.as_mut() {
            Some(child) => child,
            None => {
                return process.status.ok_or(Error::Precondition {
                    stage,
                    reason: "process handle was released before its exit was observed",
                })
            }
        };

        let io_error = |source| Error::Io { stage, source };
        let status = match timeout {
            None => child.wait().map_err(io_error)?,
            Some(limit) => match poll_for(child, &self.opt.backoff, limit).map_err(io_error)? {
                Some(status) => status,
                None => {
                    return Err(Error::Timeout {
                        stage,
                        pid,
                        waited: limit,
                    })
                }
            },
        };

        debug!("{}: pid {} exited with {}", stage, pid, status);
        process.observe_exit(status);
        Ok(status)
    }

    /// Asks `process` and everything in its process group to exit with SIGTERM.
    ///
    /// A process that has already exited is left alone and this never fails. With `wait` the call
    /// returns only once the exit has been observed and the OS handle is released; a process that
    /// ignores SIGTERM for longer than the configured `kill_after` is killed along with its group.
    ///
    /// Without `wait` the process is only signalled. It stays `Running` and keeps its handle until
    /// a later [`poll`], [`wait`] or drop observes the exit.
    ///
    ///   [`poll`]: ProcessSupervisor::poll
    ///   [`wait`]: ProcessSupervisor::wait
    pub fn terminate(&self, process: &mut ManagedProcess, wait: bool) -> Result<()> {
        if self.poll(process) == LifecycleState::Terminated {
            return Ok(());
        }

        let (stage, pid) = (process.stage, process.pid);
        signal_group(pid, libc::SIGTERM)
            .map_err(|source| Error::Signal { stage, pid, source })?;
        debug!("{}: sent SIGTERM to process group {}", stage, pid);
        if !wait {
            return Ok(());
        }

        match self.wait(process, self.opt.kill_after) {
            Ok(_) => {
                // the leader is gone; whatever it left in the group goes too
                let _ = signal_group(pid, libc::SIGKILL);
                Ok(())
            }
            Err(Error::Timeout { waited, .. }) => {
                warn!(
                    "{}: pid {} ignored SIGTERM for {:?}, killing it",
                    stage, pid, waited
                );
                signal_group(pid, libc::SIGKILL)
                    .map_err(|source| Error::Signal { stage, pid, source })?;
                self.wait(process, None).map(drop)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh").arg("-c").arg(script)
    }

    /// Runs `script` with the path of a file it should write a pid to as `$0`.
    fn sh_with_pidfile(script: &str, pidfile: &std::path::Path) -> CommandLine {
        sh(script).arg(pidfile.to_string_lossy())
    }

    fn read_pid(path: &std::path::Path) -> libc::pid_t {
        let start = Instant::now();
        loop {
            if let Ok(pid) = fs::read_to_string(path).unwrap_or_default().trim().parse() {
                return pid;
            }
            assert!(start.elapsed() < Duration::from_secs(5), "no pid in {:?}", path);
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Whether `pid` is still executing. An orphan that has exited but not yet been reaped by
    /// whoever inherited it counts as gone.
    fn running(pid: libc::pid_t) -> bool {
        match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(") ")
                .map_or(true, |(_, rest)| !rest.starts_with('Z')),
            // SAFETY: signal 0 only checks for existence.
            Err(_) => (unsafe { libc::kill(pid, 0) }) == 0,
        }
    }

    fn gone(pid: libc::pid_t) -> bool {
        let start = Instant::now();
        while running(pid) {
            if start.elapsed() > Duration::from_secs(2) {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    #[test]
    fn command_line_parsing() {
        let cmd: CommandLine = "sudo perf record -o 'my capture.data' -p {pid}"
            .parse()
            .unwrap();
        assert_eq!(cmd.program(), "sudo");
        assert_eq!(
            cmd.arguments(),
            ["perf", "record", "-o", "my capture.data", "-p", "{pid}"]
        );
        assert!(cmd.mentions("pid"));
        assert!(!cmd.mentions("output"));

        let reparsed: CommandLine = cmd.to_string().parse().unwrap();
        assert_eq!(reparsed, cmd);

        assert!(matches!(
            "".parse::<CommandLine>(),
            Err(Error::InvalidCommand { .. })
        ));
        assert!(matches!(
            "echo 'unterminated".parse::<CommandLine>(),
            Err(Error::InvalidCommand { .. })
        ));
    }

    #[test]
    fn command_line_expansion() {
        let cmd: CommandLine = "perf record -o {output} --pid={pid}".parse().unwrap();
        let expanded = cmd.expand(&[("pid", "42"), ("output", "out.data")]);
        assert_eq!(expanded.program(), "perf");
        assert_eq!(
            expanded.arguments(),
            ["record", "-o", "out.data", "--pid=42"]
        );
        // unknown placeholders survive untouched
        assert_eq!(cmd.expand(&[("input", "x")]), cmd);
    }

    #[test]
    fn launch_missing_program() {
        let supervisor = ProcessSupervisor::default();
        let err = supervisor
            .launch(
                Stage::Target,
                &CommandLine::new("./definitely-not-a-server"),
                &Streams::default(),
            )
            .unwrap_err();
        match err {
            Error::Launch { stage, program, .. } => {
                assert_eq!(stage, Stage::Target);
                assert_eq!(program, "./definitely-not-a-server");
            }
            e => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn terminate_after_exit_is_a_noop() {
        let supervisor = ProcessSupervisor::default();
        let mut process = supervisor
            .launch(Stage::Target, &CommandLine::new("true"), &Streams::default())
            .unwrap();
        let status = supervisor.wait(&mut process, None).unwrap();
        assert!(status.success());

        supervisor.terminate(&mut process, true).unwrap();
        supervisor.terminate(&mut process, false).unwrap();
        assert_eq!(process.state(), LifecycleState::Terminated);
        assert_eq!(process.exit_status(), Some(status));
    }

    #[test]
    fn poll_does_not_block() {
        let supervisor = ProcessSupervisor::default();
        let mut process = supervisor
            .launch(Stage::Target, &CommandLine::new("sleep").arg("5"), &Streams::default())
            .unwrap();

        let start = Instant::now();
        assert_eq!(supervisor.poll(&mut process), LifecycleState::Running);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(supervisor.ensure_running(&mut process).is_ok());

        supervisor.terminate(&mut process, true).unwrap();
        assert_eq!(process.state(), LifecycleState::Terminated);
        assert!(!process.exit_status().unwrap().success());
        assert!(matches!(
            supervisor.ensure_running(&mut process),
            Err(Error::UnexpectedExit { stage: Stage::Target, .. })
        ));
    }

    #[test]
    fn bounded_wait_times_out() {
        let supervisor = ProcessSupervisor::default();
        let mut process = supervisor
            .launch(Stage::Sampler, &CommandLine::new("sleep").arg("5"), &Streams::default())
            .unwrap();

        let err = supervisor
            .wait(&mut process, Some(Duration::from_millis(50)))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { stage: Stage::Sampler, .. }));
        assert_eq!(process.state(), LifecycleState::Running);
    }

    #[test]
    fn terminate_escalates_when_sigterm_is_ignored() {
        let supervisor = ProcessSupervisor::from(Options {
            kill_after: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let mut process = supervisor
            .launch(
                Stage::Target,
                &sh("trap '' TERM; exec sleep 5"),
                &Streams::default(),
            )
            .unwrap();
        // give the shell time to install the trap
        thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        supervisor.terminate(&mut process, true).unwrap();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(process.state(), LifecycleState::Terminated);
    }

    #[test]
    fn drop_reaps_running_process() {
        let supervisor = ProcessSupervisor::default();
        let process = supervisor
            .launch(Stage::Target, &CommandLine::new("sleep").arg("5"), &Streams::default())
            .unwrap();
        let pid = process.id() as libc::pid_t;
        drop(process);

        // SAFETY: signal 0 only checks for existence.
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive);
    }

    #[test]
    fn terminate_reaches_the_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("server.pid");
        let supervisor = ProcessSupervisor::default();
        let mut launcher = supervisor
            .launch(
                Stage::Target,
                &sh_with_pidfile("sleep 60 & echo $! > \"$0\"; wait", &pidfile),
                &Streams::default(),
            )
            .unwrap();
        let server = read_pid(&pidfile);
        assert!(running(server));

        supervisor.terminate(&mut launcher, true).unwrap();
        assert_eq!(launcher.state(), LifecycleState::Terminated);
        assert!(gone(server));
    }

    #[test]
    fn escalation_kills_the_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("server.pid");
        let supervisor = ProcessSupervisor::from(Options {
            kill_after: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let mut launcher = supervisor
            .launch(
                Stage::Target,
                &sh_with_pidfile("trap '' TERM; sleep 60 & echo $! > \"$0\"; wait", &pidfile),
                &Streams::default(),
            )
            .unwrap();
        let server = read_pid(&pidfile);

        supervisor.terminate(&mut launcher, true).unwrap();
        assert_eq!(launcher.state(), LifecycleState::Terminated);
        assert!(gone(server));
    }

    #[test]
    fn drop_reaps_the_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("sampler.pid");
        let supervisor = ProcessSupervisor::default();
        let launcher = supervisor
            .launch(
                Stage::Sampler,
                &sh_with_pidfile("sleep 60 & echo $! > \"$0\"; wait", &pidfile),
                &Streams::default(),
            )
            .unwrap();
        let child = read_pid(&pidfile);

        drop(launcher);
        assert!(gone(child));
    }

    #[test]
    fn stragglers_are_swept_once_the_leader_exits() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("daemon.pid");
        let supervisor = ProcessSupervisor::default();
        // the leader exits at once, leaving a child behind in its group
        let mut launcher = supervisor
            .launch(
                Stage::Target,
                &sh_with_pidfile("sleep 60 & echo $! > \"$0\"", &pidfile),
                &Streams::default(),
            )
            .unwrap();
        let daemon = read_pid(&pidfile);
        assert!(supervisor.wait(&mut launcher, Some(Duration::from_secs(5))).unwrap().success());
        assert!(running(daemon));

        drop(launcher);
        assert!(gone(daemon));
    }

    #[test]
    fn terminate_without_wait_keeps_the_handle_until_the_exit_is_seen() {
        let supervisor = ProcessSupervisor::default();
        let mut process = supervisor
            .launch(Stage::Sampler, &CommandLine::new("sleep").arg("5"), &Streams::default())
            .unwrap();

        supervisor.terminate(&mut process, false).unwrap();
        assert_eq!(process.state(), LifecycleState::Running);
        assert_eq!(process.exit_status(), None);

        let status = supervisor
            .wait(&mut process, Some(Duration::from_secs(2)))
            .unwrap();
        assert!(!status.success());
        assert_eq!(process.state(), LifecycleState::Terminated);
        // a second wait is answered from the recorded status
        assert_eq!(supervisor.wait(&mut process, None).unwrap(), status);
    }

    #[test]
    fn authorize_ignores_unprivileged_commands() {
        let supervisor = ProcessSupervisor::default();
        supervisor
            .authorize(Stage::Sampler, &"perf record -p {pid}".parse().unwrap())
            .unwrap();
        // "sudo" only counts as the program, not as an argument
        supervisor
            .authorize(Stage::Dump, &"./no-such-tool sudo".parse().unwrap())
            .unwrap();
    }

    #[test]
    fn streams_redirect_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, "main;serve;handle 3\n").unwrap();

        let supervisor = ProcessSupervisor::default();
        let streams = Streams {
            stdin: Some(input),
            stdout: Redirect::File(output.clone()),
            ..Default::default()
        };
        let mut process = supervisor
            .launch(Stage::Collapse, &CommandLine::new("cat"), &streams)
            .unwrap();
        assert!(supervisor.wait(&mut process, Some(Duration::from_secs(5))).unwrap().success());
        assert_eq!(fs::read_to_string(output).unwrap(), "main;serve;handle 3\n");
    }
}
