use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{error, warn};
use stoke::orchestrate::{Options, Orchestrator};
use stoke::process::{CommandLine, Redirect};
use stoke::traffic::{AmmunitionSet, DEFAULT_SEED};

#[derive(Debug, Parser)]
#[command(
    name = "stoke",
    about,
    after_help = "\
[1] Command lines are split like a POSIX shell would split them. {pid}, {output} and {input}
    are replaced when the command is launched.
[2] The request command gets the endpoint in place of {ammo}, or as its last argument if it has
    no {ammo}.
[3] A timeout of 0 waits forever."
)]
struct Opt {
    // Flags...
    /// Silence all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    // Load...
    /// Number of requests to fire
    #[arg(short = 'n', long = "shots", default_value = "100", value_name = "UINT")]
    shots: usize,

    /// Pause after each request, in milliseconds
    #[arg(long = "cooldown", default_value = "100", value_name = "MS")]
    cooldown: u64,

    /// Seed for picking endpoints
    #[arg(long = "seed", default_value_t = DEFAULT_SEED, value_name = "UINT")]
    seed: u64,

    /// Endpoint to fire at; may be repeated [default: the /api/v1/maps endpoints on :8080]
    #[arg(short = 'a', long = "ammo", value_name = "ENDPOINT", conflicts_with = "ammo_file")]
    ammo: Vec<String>,

    /// File with one endpoint per line
    #[arg(long = "ammo-file", value_name = "PATH")]
    ammo_file: Option<PathBuf>,

    /// Command that fires one request [2]
    #[arg(long = "request", default_value = "curl --silent --fail", value_name = "CMD")]
    request: CommandLine,

    /// Seconds a single request may take [3]
    #[arg(long = "shot-timeout", default_value = "30", value_name = "SECS")]
    shot_timeout: u64,

    /// Milliseconds to wait between attaching the sampler and the first request
    #[arg(long = "warmup", default_value = "0", value_name = "MS")]
    warmup: u64,

    // Sampling...
    /// Sampler command [1]
    #[arg(
        long = "sampler",
        default_value = "sudo perf record -g --call-graph dwarf -o {output} -p {pid}",
        value_name = "CMD"
    )]
    sampler: CommandLine,

    /// Where the sampler writes its capture
    #[arg(long = "profile-output", default_value = "perf.data", value_name = "PATH")]
    profile_output: PathBuf,

    /// Seconds the sampler may take to flush once stopped [3]
    #[arg(long = "flush-timeout", default_value = "60", value_name = "SECS")]
    flush_timeout: u64,

    // Rendering...
    /// Command that dumps the capture as text [1]
    #[arg(long = "dump", default_value = "sudo perf script -i {input}", value_name = "CMD")]
    dump: CommandLine,

    /// Command that folds the dumped stacks
    #[arg(long = "collapse", default_value = "inferno-collapse-perf", value_name = "CMD")]
    collapse: CommandLine,

    /// Command that draws the folded stacks
    #[arg(long = "render", default_value = "inferno-flamegraph", value_name = "CMD")]
    render: CommandLine,

    /// Where the flame graph is written
    #[arg(short = 'o', long = "output", default_value = "graph.svg", value_name = "PATH")]
    output: PathBuf,

    /// Seconds any rendering stage may take [3]
    #[arg(long = "stage-timeout", default_value = "600", value_name = "SECS")]
    stage_timeout: u64,

    /// Times a failing rendering stage is re-run
    #[arg(long = "retries", default_value = "0", value_name = "UINT")]
    retries: usize,

    // Target...
    /// Seconds a process may ignore SIGTERM before it is killed [3]
    #[arg(long = "kill-after", default_value = "10", value_name = "SECS")]
    kill_after: u64,

    /// Write the target's standard output here instead of the terminal
    #[arg(long = "target-log", value_name = "PATH")]
    target_log: Option<PathBuf>,

    // Args...
    /// The server to profile, with its arguments [1]
    #[arg(value_name = "TARGET")]
    target: CommandLine,
}

fn bound(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

impl Opt {
    fn into_options(self) -> std::io::Result<Options> {
        let ammunition = match self.ammo_file {
            Some(ref path) => AmmunitionSet::load_from_file(path)?,
            None => AmmunitionSet::new(self.ammo).unwrap_or_default(),
        };

        let mut opt = Options::new(self.target);
        if let Some(path) = self.target_log {
            opt.target_output = Redirect::File(path);
        }
        opt.warmup = Duration::from_millis(self.warmup);
        opt.supervisor.kill_after = bound(self.kill_after);

        opt.traffic.ammunition = ammunition;
        opt.traffic.shot_count = self.shots;
        opt.traffic.cooldown = Duration::from_millis(self.cooldown);
        opt.traffic.seed = self.seed;
        opt.traffic.request = self.request;
        opt.traffic.shot_timeout = bound(self.shot_timeout);

        opt.profile.sampler = self.sampler;
        opt.profile.output = self.profile_output;
        opt.profile.flush_timeout = bound(self.flush_timeout);

        opt.render.dump = self.dump;
        opt.render.collapse = self.collapse;
        opt.render.render = self.render;
        opt.render.output = self.output;
        opt.render.stage_timeout = bound(self.stage_timeout);
        opt.render.retries = self.retries;
        Ok(opt)
    }
}

fn main() -> ExitCode {
    let opt = Opt::parse();
    let quiet = opt.quiet;

    // Initialize logger
    if !quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(match opt.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }))
        .format_timestamp(None)
        .init();
    }

    let options = match opt.into_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("stoke: could not read ammunition: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match Orchestrator::from(options).run() {
        Ok(report) => {
            let failures = report.volley.failures();
            if failures > 0 {
                warn!(
                    "{} of {} shots failed",
                    failures,
                    report.volley.shots.len()
                );
            }
            println!(
                "{} shots fired ({} failed) in {:.2?}",
                report.volley.shots.len(),
                failures,
                report.volley.elapsed
            );
            println!("profile: {}", report.profile.path().display());
            println!("flame graph: {}", report.flamegraph.path().display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            if quiet {
                eprintln!("stoke: {}", e);
            } else {
                error!("{}", e);
            }
            ExitCode::from(e.exit_code())
        }
    }
}
