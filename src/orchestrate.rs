use std::thread;
use std::time::Duration;

use crate::error::{Result, Stage};
use crate::process::{self, CommandLine, ProcessSupervisor, Redirect, Streams};
use crate::profile::{self, ProfileArtifact, ProfileSession};
use crate::render::{self, FlameGraphArtifact, FlameGraphPipeline};
use crate::traffic::{self, TrafficGenerator, Volley};

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct Options {
    /// The server to profile.
    pub target: CommandLine,

    /// Where the server's standard output goes. Its standard error is discarded.
    pub target_output: Redirect,

    /// Pause between attaching the sampler and the first shot, for servers that take a moment to
    /// start listening.
    pub warmup: Duration,

    /// Process supervision.
    pub supervisor: process::Options,

    /// Load generation.
    pub traffic: traffic::Options,

    /// Sampling.
    pub profile: profile::Options,

    /// Flame graph rendering.
    pub render: render::Options,
}

impl Options {
    /// Default settings for profiling `target`.
    pub fn new(target: CommandLine) -> Self {
        Options {
            target,
            target_output: Redirect::Inherit,
            warmup: Duration::ZERO,
            supervisor: process::Options::default(),
            traffic: traffic::Options::default(),
            profile: profile::Options::default(),
            render: render::Options::default(),
        }
    }
}

/// What a successful run produced.
#[derive(Debug)]
pub struct RunReport {
    /// The shots that were fired.
    pub volley: Volley,
    /// The sampler's capture.
    pub profile: ProfileArtifact,
    /// The rendered flame graph.
    pub flamegraph: FlameGraphArtifact,
}

/// Runs the whole sequence: launch the target, attach the sampler, fire the load, detach the
/// sampler, stop the target, render the flame graph.
///
/// If any step fails the run stops there and every process it started is terminated before
/// [`run`](Orchestrator::run) returns.
#[derive(Debug)]
pub struct Orchestrator {
    opt: Options,
}

impl From<Options> for Orchestrator {
    fn from(opt: Options) -> Self {
        Orchestrator { opt }
    }
}

impl Orchestrator {
    /// Performs the run.
    pub fn run(self) -> Result<RunReport> {
        let Options {
            target: target_command,
            target_output,
            warmup,
            supervisor,
            traffic,
            profile,
            render,
        } = self.opt;
        let supervisor = ProcessSupervisor::from(supervisor);
        let privileged = [
            (Stage::Target, &target_command),
            (Stage::Sampler, &profile.sampler),
            (Stage::Dump, &render.dump),
            (Stage::Collapse, &render.collapse),
            (Stage::Render, &render.render),
        ]
        .into_iter()
        .find(|(_, command)| command.program() == "sudo");
        if let Some((stage, command)) = privileged {
            supervisor.authorize(stage, command)?;
        }

        let mut generator = TrafficGenerator::from(traffic);
        let pipeline = FlameGraphPipeline::from(render);

        let streams = Streams {
            stdout: target_output,
            ..Default::default()
        };
        let mut target = supervisor.launch(Stage::Target, &target_command, &streams)?;
        info!("target `{}` running as pid {}", target_command, target.id());

        // declared after the target so that on early return the sampler is reaped first
        let mut session = ProfileSession::from(profile);
        session.start(&supervisor, &mut target)?;

        if !warmup.is_zero() {
            debug!("warming up for {:?}", warmup);
            thread::sleep(warmup);
        }

        let volley = generator.run_with(&supervisor, || {
            supervisor.ensure_running(&mut target)?;
            session.ensure_sampling(&supervisor)
        })?;
        supervisor.ensure_running(&mut target)?;

        let profile = session.stop(&supervisor)?;
        supervisor.terminate(&mut target, true)?;
        info!("target stopped");

        let flamegraph = pipeline.render_session(&supervisor, &session)?;
        info!("run complete");
        Ok(RunReport {
            volley,
            profile,
            flamegraph,
        })
    }
}
