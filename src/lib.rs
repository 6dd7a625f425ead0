//! Stoke profiles a running server under load and turns the profile into a [flame graph]. It
//! replaces the usual manual choreography of "start the server, attach [`perf`], hammer the
//! server, detach `perf`, stop the server, render the graph" with a single reproducible run.
//!
//! A run goes through these steps, strictly in order:
//!
//!  1. launch the target server;
//!  2. attach a sampling profiler to it;
//!  3. fire a fixed number of requests at it, one at a time;
//!  4. stop the profiler and wait until it has flushed its capture;
//!  5. stop the server;
//!  6. dump, collapse and render the capture into an SVG flame graph.
//!
//! If any step fails, the run stops there, reports which stage broke, and terminates every
//! process it started. Nothing is left running behind.
//!
//! # Command-line use
//!
//! ```console
//! $ cargo b --release --bin myserver
//! $ stoke target/release/myserver
//! ```
//!
//! By default this samples with `sudo perf record -g --call-graph dwarf`, fires 100 `curl`
//! requests spaced 100ms apart, and renders with [`inferno`]'s `inferno-collapse-perf` and
//! `inferno-flamegraph`, leaving `perf.data` and `graph.svg` in the current directory. Every
//! tool is configurable; see `stoke --help`.
//!
//! The crate also ships `stoke-stub-server`, a minimal HTTP server that records every path it is
//! asked for. It makes a handy target for trying a configuration without a real server.
//!
//! # Reproducible load
//!
//! Which endpoint each request hits is picked by a seeded [Mersenne Twister], so the same seed,
//! endpoints and shot count always fire the same sequence of requests. That makes flame graphs
//! from different builds of a server comparable. See [`traffic::indices`].
//!
//! # Programmatic access
//!
//! Each step is available on its own: [`process::ProcessSupervisor`] for process lifecycles,
//! [`traffic::TrafficGenerator`] for load, [`profile::ProfileSession`] for sampling and
//! [`render::FlameGraphPipeline`] for rendering. [`orchestrate::Orchestrator`] ties them
//! together.
//!
//!   [flame graph]: http://www.brendangregg.com/flamegraphs.html
//!   [`perf`]: https://perf.wiki.kernel.org/index.php/Main_Page
//!   [`inferno`]: https://github.com/jonhoo/inferno
//!   [Mersenne Twister]: https://en.wikipedia.org/wiki/Mersenne_Twister

#![deny(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

#[macro_use]
extern crate log;

/// Errors, and the stages they are attributed to.
pub mod error;

/// Launching, polling and terminating external processes.
pub mod process;

/// Deterministic, strictly serial load generation.
///
/// See the [crate-level documentation] for details.
///
///   [crate-level documentation]: ../index.html
pub mod traffic;

/// Attaching a sampling profiler to the target.
pub mod profile;

/// Rendering a capture into a flame graph.
pub mod render;

/// The end-to-end run.
///
/// See the [crate-level documentation] for details.
///
///   [crate-level documentation]: ../index.html
pub mod orchestrate;

pub use error::{Error, Result, Stage};
