use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result, Stage};
use crate::process::{CommandLine, ProcessSupervisor, Redirect, Streams};
use crate::profile::{ProfileArtifact, ProfileSession, SessionState};

/// Flame graph pipeline configuration.
///
/// Each stage reads the previous stage's file on stdin and writes its own file from stdout. The
/// dump stage gets the capture path through `{input}` instead, since samplers usually want it as
/// an argument.
#[derive(Debug, Clone)]
pub struct Options {
    /// Turns the raw capture into text, e.g. `perf script`.
    pub dump: CommandLine,

    /// Folds the dumped stacks into `frame;frame;frame count` lines.
    pub collapse: CommandLine,

    /// Plots folded stacks as an SVG.
    pub render: CommandLine,

    /// Where the dump stage writes.
    pub dump_output: PathBuf,

    /// Where the collapse stage writes.
    pub folded_output: PathBuf,

    /// Where the flame graph ends up.
    pub output: PathBuf,

    /// How long any single stage may run. `None` waits forever.
    pub stage_timeout: Option<Duration>,

    /// How many times a failing stage is re-run before giving up.
    pub retries: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dump: CommandLine::new("sudo").args(["perf", "script", "-i", "{input}"]),
            collapse: CommandLine::new("inferno-collapse-perf"),
            render: CommandLine::new("inferno-flamegraph"),
            dump_output: PathBuf::from("perf.script"),
            folded_output: PathBuf::from("perf.folded"),
            output: PathBuf::from("graph.svg"),
            stage_timeout: Some(Duration::from_secs(600)),
            retries: 0,
        }
    }
}

/// Text dump of a capture.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScriptDump {
    path: PathBuf,
}

impl ScriptDump {
    /// Location of the dump.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Folded stack lines.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FoldedStacks {
    path: PathBuf,
}

impl FoldedStacks {
    /// Location of the folded stacks.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The rendered flame graph.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FlameGraphArtifact {
    path: PathBuf,
}

impl FlameGraphArtifact {
    /// Location of the SVG.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Turns a capture into a flame graph: dump, collapse, render.
///
/// Every stage is its own process with its own output file, so a failure names the stage that
/// broke and leaves the earlier outputs behind for inspection.
#[derive(Debug, Clone, Default)]
pub struct FlameGraphPipeline {
    opt: Options,
}

impl From<Options> for FlameGraphPipeline {
    fn from(opt: Options) -> Self {
        FlameGraphPipeline { opt }
    }
}

impl FlameGraphPipeline {
    /// Renders the capture of a stopped session.
    ///
    /// Fails with [`Error::Precondition`] while the session is still idle or sampling, or if it
    /// stopped without producing a capture.
    pub fn render_session(
        &self,
        supervisor: &ProcessSupervisor,
        session: &ProfileSession,
    ) -> Result<FlameGraphArtifact> {
        if session.state() != SessionState::Stopped {
            return Err(Error::Precondition {
                stage: Stage::Render,
                reason: "profile session has not been stopped",
            });
        }
        let profile = session.artifact().ok_or(Error::Precondition {
            stage: Stage::Render,
            reason: "profile session stopped without a capture",
        })?;
        self.render(supervisor, profile)
    }

    /// Runs all three stages on `profile`.
    pub fn render(
        &self,
        supervisor: &ProcessSupervisor,
        profile: &ProfileArtifact,
    ) -> Result<FlameGraphArtifact> {
        if !is_non_empty(profile.path()) {
            return Err(Error::MissingArtifact {
                stage: Stage::Sampler,
                path: profile.path().to_path_buf(),
            });
        }

        let dump = self.dump(supervisor, profile)?;
        let folded = self.collapse(supervisor, &dump)?;
        let graph = self.plot(supervisor, &folded)?;
        info!("flame graph written to {}", graph.path().display());
        Ok(graph)
    }

    /// Dumps the raw capture to text.
    pub fn dump(
        &self,
        supervisor: &ProcessSupervisor,
        profile: &ProfileArtifact,
    ) -> Result<ScriptDump> {
        let path = self.opt.dump_output.clone();
        self.run_stage(
            supervisor,
            Stage::Dump,
            &self.opt.dump,
            profile.path(),
            None,
            &path,
        )?;
        Ok(ScriptDump { path })
    }

    /// Folds dumped stacks.
    pub fn collapse(
        &self,
        supervisor: &ProcessSupervisor,
        dump: &ScriptDump,
    ) -> Result<FoldedStacks> {
        let path = self.opt.folded_output.clone();
        self.run_stage(
            supervisor,
            Stage::Collapse,
            &self.opt.collapse,
            dump.path(),
            Some(dump.path()),
            &path,
        )?;
        Ok(FoldedStacks { path })
    }

    /// Plots folded stacks.
    pub fn plot(
        &self,
        supervisor: &ProcessSupervisor,
        folded: &FoldedStacks,
    ) -> Result<FlameGraphArtifact> {
        let path = self.opt.output.clone();
        self.run_stage(
            supervisor,
            Stage::Render,
            &self.opt.render,
            folded.path(),
            Some(folded.path()),
            &path,
        )?;
        Ok(FlameGraphArtifact { path })
    }

    fn run_stage(
        &self,
        supervisor: &ProcessSupervisor,
        stage: Stage,
        command: &CommandLine,
        input: &Path,
        stdin: Option<&Path>,
        output: &Path,
    ) -> Result<()> {
        let input = input.to_string_lossy();
        let command = command.expand(&[("input", &*input)]);
        let streams = Streams {
            stdin: stdin.map(Path::to_path_buf),
            stdout: Redirect::File(output.to_path_buf()),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.attempt(supervisor, stage, &command, &streams, output) {
                Ok(()) => return Ok(()),
                // a tool that cannot be started will not start on the next try either
                Err(e @ Error::Launch { .. }) => return Err(e),
                Err(e) if attempt < self.opt.retries => {
                    attempt += 1;
                    warn!("{}: attempt {} failed ({}), retrying", stage, attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn attempt(
        &self,
        supervisor: &ProcessSupervisor,
        stage: Stage,
        command: &CommandLine,
        streams: &Streams,
        output: &Path,
    ) -> Result<()> {
        let mut process = supervisor.launch(stage, command, streams)?;
        let status = supervisor.wait(&mut process, self.opt.stage_timeout)?;
        if !status.success() {
            return Err(Error::StageFailed { stage, status });
        }
        if !is_non_empty(output) {
            return Err(Error::MissingArtifact {
                stage,
                path: output.to_path_buf(),
            });
        }
        debug!("{}: wrote {}", stage, output.display());
        Ok(())
    }
}

fn is_non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.len() > 0).unwrap_or(false)
}
