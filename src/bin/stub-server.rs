//! A tiny HTTP server that answers every request with `200 OK` and records the requested path,
//! one line per hit. It stands in for a real server when trying out `stoke` or testing it.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "stoke-stub-server", about = "Answer HTTP requests and record their paths")]
struct Opt {
    // Flags...
    /// Silence all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    // Options...
    /// Address to listen on
    #[arg(long = "listen", default_value = "127.0.0.1:8080", value_name = "ADDR")]
    listen: String,

    /// File that gets one line per request with the requested path
    #[arg(long = "hits", value_name = "PATH")]
    hits: Option<PathBuf>,
}

/// Reads one request, records its path and answers it.
///
/// The hit is recorded before the answer goes out, so a client that has seen the answer can rely
/// on the hit being on disk even if this server is killed right after.
fn serve(mut stream: TcpStream, hits: &mut Option<File>) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let path = match request_line.split_whitespace().nth(1) {
        Some(path) => path,
        None => return Ok(()),
    };

    // drain the headers; requests from curl carry no body
    let mut header = String::new();
    while reader.read_line(&mut header)? > 0 && !header.trim_end().is_empty() {
        header.clear();
    }

    info!("GET {}", path);
    if let Some(hits) = hits.as_mut() {
        writeln!(hits, "{}", path)?;
    }

    stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nok\n")?;
    stream.flush()
}

fn main() -> ExitCode {
    let opt = Opt::parse();

    // Initialize logger
    if !opt.quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(match opt.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }))
        .format_timestamp(None)
        .init();
    }

    let mut hits = match opt.hits {
        Some(ref path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                error!("cannot open {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let listener = match TcpListener::bind(&opt.listen) {
        Ok(listener) => listener,
        Err(e) => {
            error!("cannot listen on {}: {}", opt.listen, e);
            return ExitCode::FAILURE;
        }
    };
    info!("listening on {}", opt.listen);

    for stream in listener.incoming() {
        if let Err(e) = stream.and_then(|stream| serve(stream, &mut hits)) {
            warn!("dropped a connection: {}", e);
        }
    }
    ExitCode::SUCCESS
}
