use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result, Stage};
use crate::process::{CommandLine, ManagedProcess, ProcessSupervisor, Streams};

/// Where a [`ProfileSession`] is in its lifecycle.
///
/// Sessions only ever move forward: `Idle -> Sampling -> Stopped`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionState {
    /// Not started yet.
    Idle,
    /// The sampler is attached and recording.
    Sampling,
    /// The sampler has exited. Terminal.
    Stopped,
}

/// Profile session configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Sampler command. `{pid}` is replaced with the target's process id and `{output}` with
    /// the capture path.
    pub sampler: CommandLine,

    /// Where the sampler writes its capture.
    pub output: PathBuf,

    /// How long the sampler may take to flush and exit once asked to stop. `None` waits forever.
    pub flush_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            sampler: CommandLine::new("sudo").args([
                "perf",
                "record",
                "-g",
                "--call-graph",
                "dwarf",
                "-o",
                "{output}",
                "-p",
                "{pid}",
            ]),
            output: PathBuf::from("perf.data"),
            flush_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// A fully flushed sampler capture.
///
/// Only a [`ProfileSession`] that stopped cleanly hands these out.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProfileArtifact {
    path: PathBuf,
}

impl ProfileArtifact {
    #[cfg(test)]
    pub(crate) fn at(path: PathBuf) -> Self {
        ProfileArtifact { path }
    }

    /// Location of the capture file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Attaches a sampling profiler to a running process and detaches it again.
#[derive(Debug)]
pub struct ProfileSession {
    opt: Options,
    state: SessionState,
    sampler: Option<ManagedProcess>,
    artifact: Option<ProfileArtifact>,
}

impl From<Options> for ProfileSession {
    fn from(opt: Options) -> Self {
        ProfileSession {
            opt,
            state: SessionState::Idle,
            sampler: None,
            artifact: None,
        }
    }
}

impl ProfileSession {
    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The capture, once the session has stopped cleanly.
    pub fn artifact(&self) -> Option<&ProfileArtifact> {
        self.artifact.as_ref()
    }

    /// Process id of the sampler while sampling.
    pub fn sampler_id(&self) -> Option<u32> {
        self.sampler.as_ref().map(ManagedProcess::id)
    }

    /// Launches the sampler against `target`.
    ///
    /// Only valid from `Idle`, and only while `target` is still running.
    pub fn start(
        &mut self,
        supervisor: &ProcessSupervisor,
        target: &mut ManagedProcess,
    ) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::Precondition {
                stage: Stage::Sampler,
                reason: "profile session can only be started once",
            });
        }
        supervisor.ensure_running(target)?;

        let pid = target.id().to_string();
        let output = self.opt.output.to_string_lossy();
        let command = self
            .opt
            .sampler
            .expand(&[("pid", pid.as_str()), ("output", &*output)]);
        let sampler = supervisor.launch(Stage::Sampler, &command, &Streams::default())?;

        info!("sampling pid {} into {}", pid, self.opt.output.display());
        self.sampler = Some(sampler);
        self.state = SessionState::Sampling;
        Ok(())
    }

    /// Fails with [`Error::UnexpectedExit`] if the sampler has died while sampling.
    pub fn ensure_sampling(&mut self, supervisor: &ProcessSupervisor) -> Result<()> {
        match self.sampler.as_mut() {
            Some(sampler) => supervisor.ensure_running(sampler),
            None => Ok(()),
        }
    }

    /// Stops the sampler and waits until it has exited, which is when its capture is complete.
    ///
    /// Calling this again once stopped hands back the same artifact. A sampler that exited on its
    /// own before being asked to stop is reported as [`Error::UnexpectedExit`]; the session still
    /// ends up `Stopped`, but without an artifact.
    pub fn stop(&mut self, supervisor: &ProcessSupervisor) -> Result<ProfileArtifact> {
        match self.state {
            SessionState::Idle => {
                return Err(Error::Precondition {
                    stage: Stage::Sampler,
                    reason: "profile session was never started",
                })
            }
            SessionState::Stopped => {
                return self.artifact.clone().ok_or(Error::Precondition {
                    stage: Stage::Sampler,
                    reason: "profile session did not stop cleanly",
                })
            }
            SessionState::Sampling => {}
        }

        self.state = SessionState::Stopped;
        let mut sampler = self.sampler.take().ok_or(Error::Precondition {
            stage: Stage::Sampler,
            reason: "sampler handle is missing",
        })?;

        supervisor.poll(&mut sampler);
        if let Some(status) = sampler.exit_status() {
            return Err(Error::UnexpectedExit {
                stage: Stage::Sampler,
                pid: sampler.id(),
                status,
            });
        }
        supervisor.terminate(&mut sampler, false)?;
        supervisor.wait(&mut sampler, self.opt.flush_timeout)?;

        // the sampler dies by our signal, so only the capture tells us whether it worked
        let output = self.opt.output.clone();
        match fs::metadata(&output) {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                return Err(Error::MissingArtifact {
                    stage: Stage::Sampler,
                    path: output,
                })
            }
        }

        info!("sampler flushed {}", output.display());
        let artifact = ProfileArtifact { path: output };
        self.artifact = Some(artifact.clone());
        Ok(artifact)
    }
}
