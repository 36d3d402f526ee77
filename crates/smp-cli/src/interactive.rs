//! Interactive mode: one invocation per input line.
//!
//! A reader thread hands each line over a channel with room for one line,
//! then waits for the line to be acknowledged before reading the next, so
//! only one command runs at a time:
//!
//! ```text
//!   reader thread ──line──▶ run loop ──execute──▶ App
//!         ▲                    │
//!         └───────ack──────────┘
//! ```

use std::io::{BufRead, Write};
use std::sync::mpsc as std_mpsc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::App;
use crate::args::parse_line;
use crate::error::ExitCode;

fn read_lines<R: BufRead>(input: R, lines: mpsc::Sender<String>, ack: std_mpsc::Receiver<()>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        };
        if lines.blocking_send(line).is_err() || ack.recv().is_err() {
            break;
        }
    }
    debug!("Input reader finished");
}

/// Read invocations from `input` until `--quit`, end of input or an
/// interrupt while idle. Returns the exit code of the last invocation.
pub async fn run<R, W>(app: &mut App<W>, input: R) -> ExitCode
where
    R: BufRead + Send + 'static,
    W: Write,
{
    let (line_tx, mut lines) = mpsc::channel::<String>(1);
    let (ack, ack_rx) = std_mpsc::channel::<()>();
    let reader = thread::Builder::new()
        .name("smp-line-reader".to_string())
        .spawn(move || read_lines(input, line_tx, ack_rx));
    if let Err(e) = reader {
        warn!("Failed to start input reader: {}", e);
        return ExitCode::CommandFailed;
    }

    let mut code = ExitCode::Success;
    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = app.interrupted() => None,
        };
        let Some(line) = line else {
            break;
        };

        let line = line.trim();
        if !line.is_empty() {
            match parse_line(line) {
                Ok(args) if args.quit => break,
                Ok(args) => code = app.handle(&args).await,
                Err(err) => {
                    app.print_error(&err);
                    code = err.code;
                }
            }
        }

        if ack.send(()).is_err() {
            break;
        }
    }
    code
}
