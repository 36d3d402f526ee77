//! smpmgmt command-line client
//!
//! Parses the command line (or each interactive line) into an
//! [`Invocation`], opens the named transport and runs the command through an
//! [`smp_client::Session`]. Every outcome maps to an [`ExitCode`].

pub mod app;
pub mod args;
pub mod config;
mod error;
pub mod interactive;
pub mod invocation;
pub mod logging;
pub mod output;

pub use app::App;
pub use args::{parse_args, parse_line, Args};
pub use config::FileConfig;
pub use error::*;
pub use invocation::{Invocation, TransportSpec};

use std::ffi::OsString;
use std::io::{BufReader, Write};

use tokio::sync::mpsc;
use tracing::warn;

/// Run the client for a full argument vector and return its exit code.
pub async fn run<I, T>(words: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut stdout = std::io::stdout();
    let args = match parse_args(words) {
        Ok(args) => args,
        Err(err) => {
            let _ = writeln!(stdout, "{}", err.message.trim_end());
            return err.code;
        }
    };

    logging::init(args.verbose);

    let file = match args.config.as_deref().map(FileConfig::load).transpose() {
        Ok(file) => file.unwrap_or_default(),
        Err(err) => {
            let _ = writeln!(stdout, "{}", err.message);
            return err.code;
        }
    };

    let (interrupt, interrupts) = mpsc::unbounded_channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt.send(());
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let mut app = App::new(file, stdout).with_interrupts(interrupts);
    let code = if args.interactive {
        interactive::run(&mut app, BufReader::new(std::io::stdin())).await
    } else {
        app.handle(&args).await
    };
    app.close();
    code
}
