// A capturing logger for asserting on what a run logs. Captured records live in a global behind a
// mutex rather than in a thread-local, since the code under test may log from any thread. Because
// every test in the same binary shares the capture, a test binary that uses this logger should
// hold a single test (or run with `--test-threads=1`).

use std::sync::{Mutex, Once};

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;

static INIT: Once = Once::new();
static TEST_LOGGER: TestLogger = TestLogger;
static CAPTURED_LOGS: Lazy<Mutex<Vec<CapturedLog>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub fn init() {
    INIT.call_once(|| {
        log::set_logger(&TEST_LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
    captured().clear();
}

pub fn validate<F>(asserter: F)
where
    F: Fn(&[CapturedLog]),
{
    let mut guard = captured();
    asserter(&guard);
    guard.clear();
}

fn captured() -> std::sync::MutexGuard<'static, Vec<CapturedLog>> {
    match CAPTURED_LOGS.lock() {
        Ok(guard) => guard,
        Err(e) => e.into_inner(),
    }
}

#[derive(Debug)]
pub struct CapturedLog {
    pub body: String,
    pub level: Level,
    pub target: String,
}

struct TestLogger;

impl Log for TestLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        captured().push(CapturedLog {
            body: format!("{}", record.args()),
            level: record.level(),
            target: record.target().to_string(),
        });
    }

    fn flush(&self) {}
}
