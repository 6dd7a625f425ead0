/// The seeded generator behind shot selection.
pub mod twister;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use rand::{RngCore, SeedableRng};

use self::twister::MersenneTwister;
use crate::error::{Error, Result, ShotFailure, Stage};
use crate::process::{CommandLine, ProcessSupervisor, Streams};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 123_456_789;

/// Upper bound of the first draw, before it is reduced modulo the number of descriptors.
pub const DEFAULT_RANGE: u32 = 1000;

/// Shot records reserved up front; longer runs grow the record as they go.
const PREALLOCATED_SHOTS: usize = 4096;

/// The descriptors (usually URLs) shots can be aimed at.
///
/// A set is never empty. Order only matters as an index space.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AmmunitionSet(Vec<String>);

impl AmmunitionSet {
    /// Builds a set from the given descriptors, or `None` if there are none.
    pub fn new<I, S>(descriptors: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let descriptors: Vec<String> = descriptors.into_iter().map(Into::into).collect();
        if descriptors.is_empty() {
            None
        } else {
            Some(AmmunitionSet(descriptors))
        }
    }

    /// Reads one descriptor per line. Blank lines and lines starting with `#` are skipped.
    ///
    /// Returns an [`io::ErrorKind::InvalidData`] error if no descriptor remains.
    pub fn from_stream(reader: &mut dyn io::Read) -> io::Result<Self> {
        let mut descriptors = Vec::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            descriptors.push(line.to_string());
        }
        Self::new(descriptors).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "no ammunition descriptors found")
        })
    }

    /// Loads a set from a file in the format described in [`from_stream`].
    ///
    ///   [`from_stream`]: AmmunitionSet::from_stream
    pub fn load_from_file(path: &dyn AsRef<Path>) -> io::Result<Self> {
        let mut file = File::open(path)?;
        Self::from_stream(&mut file)
    }

    /// Number of descriptors; always at least one.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The descriptor at `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// All descriptors in index order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for AmmunitionSet {
    fn default() -> Self {
        AmmunitionSet(vec![
            "localhost:8080/api/v1/maps/map1".to_string(),
            "localhost:8080/api/v1/maps".to_string(),
        ])
    }
}

/// The finite sequence of ammunition indices a generator fires at.
///
/// Each item is `below(range) % len`: a uniform draw in `[0, range)` reduced by the number of
/// descriptors. Both steps matter: dropping the first changes which indices a seed produces.
#[derive(Debug, Clone)]
pub struct Sequence<R> {
    rng: R,
    range: u32,
    len: usize,
    remaining: usize,
}

impl<R: RngCore> Sequence<R> {
    /// `count` indices into a set of `len` descriptors, drawn from `rng`.
    ///
    /// # Panics
    ///
    /// If `len` or `range` is zero.
    pub fn new(rng: R, range: u32, len: usize, count: usize) -> Self {
        assert!(len > 0, "cannot select from an empty ammunition set");
        assert!(range > 0, "draw range must be positive");
        Sequence {
            rng,
            range,
            len,
            remaining: count,
        }
    }
}

impl<R: RngCore> Iterator for Sequence<R> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let draw = twister::below(&mut self.rng, self.range);
        Some(draw as usize % self.len)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R: RngCore> ExactSizeIterator for Sequence<R> {}

/// The index sequence for `count` shots over `len` descriptors with the given seed.
///
/// This is what [`TrafficGenerator::run`] fires at when built from [`Options`] with the same
/// seed and the default range.
///
/// # Panics
///
/// If `len` is zero.
pub fn indices(seed: u64, len: usize, count: usize) -> Sequence<MersenneTwister> {
    Sequence::new(
        MersenneTwister::seed_from_u64(seed),
        DEFAULT_RANGE,
        len,
        count,
    )
}

/// Traffic generator configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// descriptors to aim at
    pub ammunition: AmmunitionSet,

    /// number of shots to fire
    pub shot_count: usize,

    /// pause after each request is launched
    pub cooldown: Duration,

    /// generator seed
    pub seed: u64,

    /// upper bound of the raw draw
    pub range: u32,

    /// request command; the descriptor replaces `{ammo}`, or is appended if absent
    pub request: CommandLine,

    /// how long a single request may run, `None` for no bound
    pub shot_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            ammunition: AmmunitionSet::default(),
            shot_count: 100,
            cooldown: Duration::from_millis(100),
            seed: DEFAULT_SEED,
            range: DEFAULT_RANGE,
            request: CommandLine::new("curl").args(["--silent", "--fail"]),
            shot_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// One fired shot.
#[derive(Debug)]
pub struct ShotRecord {
    /// Index into the ammunition set.
    pub index: usize,
    /// When the request was launched.
    pub fired_at: Instant,
    /// Why the shot failed, if it did.
    pub failure: Option<ShotFailure>,
}

/// The outcome of a completed [`TrafficGenerator::run`].
#[derive(Debug)]
pub struct Volley {
    /// Every shot, in firing order.
    pub shots: Vec<ShotRecord>,
    /// Wall time from the first shot to the end of the last.
    pub elapsed: Duration,
}

impl Volley {
    /// The ammunition indices in firing order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.shots.iter().map(|shot| shot.index)
    }

    /// Number of shots that failed.
    pub fn failures(&self) -> usize {
        self.shots.iter().filter(|shot| shot.failure.is_some()).count()
    }
}

/// Fires a fixed number of requests, one at a time, at descriptors picked by a seeded generator.
///
/// The generator is single-use: the second call to [`run`](TrafficGenerator::run) fails.
#[derive(Debug)]
pub struct TrafficGenerator<R = MersenneTwister> {
    ammunition: AmmunitionSet,
    request: CommandLine,
    cooldown: Duration,
    shot_timeout: Option<Duration>,
    sequence: Option<Sequence<R>>,
}

impl From<Options> for TrafficGenerator {
    fn from(opt: Options) -> Self {
        let rng = MersenneTwister::seed_from_u64(opt.seed);
        TrafficGenerator::with_rng(opt, rng)
    }
}

impl<R: RngCore> TrafficGenerator<R> {
    /// Builds a generator drawing from `rng` instead of one seeded from `opt.seed`.
    ///
    /// A zero `range` is treated as one.
    pub fn with_rng(opt: Options, rng: R) -> Self {
        let sequence = Sequence::new(
            rng,
            opt.range.max(1),
            opt.ammunition.len(),
            opt.shot_count,
        );
        TrafficGenerator {
            ammunition: opt.ammunition,
            request: opt.request,
            cooldown: opt.cooldown,
            shot_timeout: opt.shot_timeout,
            sequence: Some(sequence),
        }
    }

    /// The descriptors this generator aims at.
    pub fn ammunition(&self) -> &AmmunitionSet {
        &self.ammunition
    }

    /// Whether this generator has already been run.
    pub fn is_spent(&self) -> bool {
        self.sequence.is_none()
    }

    /// Fires every shot. See [`run_with`](TrafficGenerator::run_with).
    pub fn run(&mut self, supervisor: &ProcessSupervisor) -> Result<Volley> {
        self.run_with(supervisor, || Ok(()))
    }

    /// Fires every shot, calling `watch` before each one.
    ///
    /// Each shot launches one request process, sleeps for the cooldown, then waits for the
    /// request to exit, so at most one request is ever in flight. Failed shots are recorded and
    /// the sequence carries on. An error from `watch` stops the run and is returned.
    pub fn run_with<F>(&mut self, supervisor: &ProcessSupervisor, mut watch: F) -> Result<Volley>
    where
        F: FnMut() -> Result<()>,
    {
        let sequence = self.sequence.take().ok_or(Error::Precondition {
            stage: Stage::Load,
            reason: "traffic generator has already been fired",
        })?;

        let start = Instant::now();
        let mut shots = Vec::with_capacity(sequence.len().min(PREALLOCATED_SHOTS));
        for index in sequence {
            watch()?;

            let ammo = &self.ammunition.0[index];
            let fired_at = Instant::now();
            let failure = self.shoot(supervisor, ammo).err();
            match failure {
                Some(ref failure) => {
                    warn!("load: shot {} at {} failed: {}", shots.len(), ammo, failure)
                }
                None => trace!("load: shot {} at {}", shots.len(), ammo),
            }
            shots.push(ShotRecord {
                index,
                fired_at,
                failure,
            });
        }

        let volley = Volley {
            shots,
            elapsed: start.elapsed(),
        };
        info!(
            "shooting complete: {} shots, {} failed, {:.2?}",
            volley.shots.len(),
            volley.failures(),
            volley.elapsed
        );
        Ok(volley)
    }

    fn shoot(&self, supervisor: &ProcessSupervisor, ammo: &str) -> Result<(), ShotFailure> {
        let command = if self.request.mentions("ammo") {
            self.request.expand(&[("ammo", ammo)])
        } else {
            self.request.clone().arg(ammo)
        };

        let mut hit = supervisor
            .launch(Stage::Load, &command, &Streams::default())
            .map_err(|e| ShotFailure::Launch(into_io(e)))?;
        thread::sleep(self.cooldown);

        match supervisor.wait(&mut hit, self.shot_timeout) {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(ShotFailure::Status(status)),
            Err(Error::Timeout { waited, .. }) => {
                if let Err(e) = supervisor.terminate(&mut hit, true) {
                    warn!("load: could not stop hung request: {}", e);
                }
                Err(ShotFailure::Timeout(waited))
            }
            Err(e) => Err(ShotFailure::Wait(into_io(e))),
        }
    }
}

fn into_io(e: Error) -> io::Error {
    match e {
        Error::Launch { source, .. } | Error::Io { source, .. } | Error::Signal { source, .. } => {
            source
        }
        e => io::Error::new(io::ErrorKind::Other, e),
    }
}
