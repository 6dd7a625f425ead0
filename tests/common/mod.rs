#![allow(dead_code)]

pub mod test_logger;

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use stoke::orchestrate::Options;
use stoke::process::{CommandLine, Redirect};
use stoke::traffic::AmmunitionSet;
use tempfile::TempDir;

pub fn sh(script: &str) -> CommandLine {
    CommandLine::new("sh").arg("-c").arg(script)
}

/// A scratch directory laid out for one stubbed run.
///
/// The target records its pid in `target.pid`. The sampler records its own in `sampler.pid` and
/// that of a child it keeps around in `sampler-child.pid`. Every request appends a line to the
/// endpoint file it was fired at.
pub struct Scratch {
    pub dir: TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        Scratch {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn endpoints(&self) -> Vec<PathBuf> {
        vec![self.path("maps"), self.path("maps-map1")]
    }

    /// A target that stays up for `lifetime`.
    pub fn target(&self, lifetime: &str) -> CommandLine {
        CommandLine::new("sh").args([
            "-c",
            "echo $$ > \"$0\"; exec sleep \"$1\"",
            &*self.path("target.pid").to_string_lossy(),
            lifetime,
        ])
    }

    /// Options that run entirely on `/bin/sh` stubs, firing `shots` requests.
    pub fn options(&self, target: CommandLine, shots: usize) -> Options {
        let mut opt = Options::new(target);
        opt.target_output = Redirect::Discard;
        opt.supervisor.kill_after = Some(Duration::from_secs(2));

        opt.traffic.ammunition = AmmunitionSet::new(
            self.endpoints()
                .iter()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .unwrap();
        opt.traffic.shot_count = shots;
        opt.traffic.cooldown = Duration::from_millis(10);
        opt.traffic.request = sh("echo hit >> \"$0\"");
        opt.traffic.shot_timeout = Some(Duration::from_secs(5));

        opt.profile.sampler = CommandLine::new("sh").args([
            "-c",
            "echo $$ > \"$2\"; sleep 60 & echo $! > \"$3\"; echo \"sampled $0\" > \"$1\"; \
             trap 'exit 0' TERM; while :; do sleep 0.01; done",
            "{pid}",
            "{output}",
            &*self.path("sampler.pid").to_string_lossy(),
            &*self.path("sampler-child.pid").to_string_lossy(),
        ]);
        opt.profile.output = self.path("perf.data");
        opt.profile.flush_timeout = Some(Duration::from_secs(5));

        opt.render.dump = CommandLine::new("cat").arg("{input}");
        opt.render.collapse = sh("sed 's/^sampled /server;/; s/$/ 1/'");
        opt.render.render = sh("echo '<svg>'; cat; echo '</svg>'");
        opt.render.dump_output = self.path("perf.script");
        opt.render.folded_output = self.path("perf.folded");
        opt.render.output = self.path("graph.svg");
        opt.render.stage_timeout = Some(Duration::from_secs(5));
        opt
    }
}

pub fn hits(path: &Path) -> usize {
    fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

pub fn read_pid(path: &Path) -> i32 {
    fs::read_to_string(path).unwrap().trim().parse().unwrap()
}

pub fn is_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Whether `pid` is still executing. An orphan that has exited but not yet been reaped by
/// whoever inherited it counts as gone.
pub fn is_running(pid: i32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(") ")
            .map_or(true, |(_, rest)| !rest.starts_with('Z')),
        Err(_) => is_alive(pid),
    }
}

/// Waits a little for `pid` to stop executing.
pub fn is_gone(pid: i32) -> bool {
    let start = Instant::now();
    while is_running(pid) {
        if start.elapsed() > Duration::from_secs(2) {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn has_curl() -> bool {
    Command::new("curl")
        .arg("--version")
        .stdout(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
