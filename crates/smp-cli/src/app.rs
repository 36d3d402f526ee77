//! Runs invocations against a device and prints their results.
//!
//! The [`App`] keeps the session of the last invocation so interactive lines
//! naming the same transport reuse the open connection.

use std::io::Write;
use std::path::Path;

use smp_client::{GroupOutput, OperationReport, Session, SessionEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::args::Args;
use crate::config::FileConfig;
use crate::error::{CliError, ExitCode, Result};
use crate::invocation::{Invocation, TransportSpec};
use crate::output::render;

enum Wake {
    Finished(smp_client::Result<OperationReport>),
    Event(SessionEvent),
    Interrupted,
}

/// Wait for the next interrupt; never completes without an interrupt source.
async fn next_interrupt(interrupts: &mut Option<mpsc::UnboundedReceiver<()>>) {
    match interrupts {
        Some(rx) => {
            if rx.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

pub struct App<W: Write> {
    file: FileConfig,
    current: Option<(TransportSpec, Session)>,
    interrupts: Option<mpsc::UnboundedReceiver<()>>,
    out: W,
}

impl<W: Write> App<W> {
    pub fn new(file: FileConfig, out: W) -> Self {
        App {
            file,
            current: None,
            interrupts: None,
            out,
        }
    }

    /// Cancel the running command whenever `interrupts` yields.
    pub fn with_interrupts(mut self, interrupts: mpsc::UnboundedReceiver<()>) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    /// Use `session` for invocations naming `spec` (or no transport).
    pub fn attach(&mut self, spec: TransportSpec, session: Session) {
        self.current = Some((spec, session));
    }

    pub fn transport_spec(&self) -> Option<&TransportSpec> {
        self.current.as_ref().map(|(spec, _)| spec)
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Completes on the next interrupt.
    pub async fn interrupted(&mut self) {
        next_interrupt(&mut self.interrupts).await
    }

    /// Run `args`, print the result or the error, and return the exit code.
    pub async fn handle(&mut self, args: &Args) -> ExitCode {
        match self.execute(args).await {
            Ok(()) => ExitCode::Success,
            Err(err) => {
                self.print_error(&err);
                err.code
            }
        }
    }

    pub fn print_error(&mut self, err: &CliError) {
        if !err.message.is_empty() {
            let _ = writeln!(self.out, "{}", err.message);
            let _ = self.out.flush();
        }
    }

    /// Close the connection, if any.
    pub fn close(&mut self) {
        if let Some((_, mut session)) = self.current.take() {
            if session.is_connected() {
                if let Err(e) = session.disconnect() {
                    warn!("Failed to close transport: {}", e);
                }
            }
        }
    }

    /// Run one invocation.
    pub async fn execute(&mut self, args: &Args) -> Result<()> {
        let previous = self.transport_spec();
        let invocation = Invocation::build(args, &self.file, previous)?;
        self.prepare_session(&invocation)?;

        let App {
            current,
            interrupts,
            out,
            ..
        } = self;
        let Some((_, session)) = current.as_mut() else {
            return Err(CliError::new(ExitCode::TransportOpenFailed, "Transport open failed"));
        };

        let mut events = session.subscribe();
        let mut last_percent = None;
        let finished = {
            let run = session.run(invocation.command);
            tokio::pin!(run);
            loop {
                let wake = tokio::select! {
                    biased;
                    result = &mut run => Wake::Finished(result),
                    Some(event) = events.recv() => Wake::Event(event),
                    _ = next_interrupt(interrupts) => Wake::Interrupted,
                };
                match wake {
                    Wake::Finished(result) => break Some(result),
                    Wake::Event(SessionEvent::Progress { action, percent }) => {
                        if last_percent != Some(percent) {
                            last_percent = Some(percent);
                            let _ = writeln!(out, "{action}: {percent}%");
                            let _ = out.flush();
                        }
                    }
                    Wake::Event(SessionEvent::Status { .. }) => {}
                    Wake::Interrupted => break None,
                }
            }
        };

        let Some(result) = finished else {
            info!("Interrupted");
            session.cancel();
            return Err(CliError::new(ExitCode::CommandFailed, "Cancelled"));
        };

        let report = result?;
        if !report.is_success() {
            return Err(CliError::new(ExitCode::CommandFailed, render(&report)));
        }
        if let (Some(path), GroupOutput::FileData(data)) = (&invocation.download, &report.output) {
            save_download(path, data)?;
        }
        let _ = writeln!(out, "{}", render(&report));
        let _ = out.flush();
        Ok(())
    }

    /// Make sure a connected session for the invocation's transport exists.
    fn prepare_session(&mut self, invocation: &Invocation) -> Result<()> {
        let reusable = matches!(&self.current, Some((spec, _)) if *spec == invocation.transport);
        if !reusable {
            self.close();
            let (transport, events) = invocation.transport.open()?;
            debug!("Opened {} transport", transport.name());
            let session = Session::new(transport, events, invocation.session);
            self.current = Some((invocation.transport.clone(), session));
        }

        let Some((_, session)) = self.current.as_mut() else {
            return Err(CliError::new(ExitCode::TransportOpenFailed, "Transport open failed"));
        };
        session.set_config(invocation.session)?;
        if !session.is_connected() {
            if let Err(e) = session.connect() {
                self.current = None;
                return Err(e.into());
            }
        }
        Ok(())
    }
}

fn save_download(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).map_err(|e| {
        CliError::new(
            ExitCode::CommandFailed,
            format!("Error: cannot write {}: {e}", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::parse_args;
    use smp_client::testing::{response_to, MockTransport};
    use smp_client::SessionConfig;
    use smp_protocol::{Body, ResponseBody};
    use smp_transport::{event_channel, UdpConfig};

    fn app_with(transport: &MockTransport, events: smp_transport::EventReceiver) -> App<Vec<u8>> {
        let mut app = App::new(FileConfig::default(), Vec::new());
        let session = Session::new(Box::new(transport.clone()), events, SessionConfig::default());
        app.attach(TransportSpec::Udp(UdpConfig::new("192.0.2.1")), session);
        app
    }

    fn printed(app: &App<Vec<u8>>) -> String {
        String::from_utf8_lossy(app.output()).into_owned()
    }

    #[tokio::test]
    async fn test_echo_through_attached_session() {
        let (tx, rx) = event_channel();
        let transport = MockTransport::with_events(tx);
        transport.set_responder(|request| {
            let text = ResponseBody::decode(request.body())
                .and_then(|body| body.require_text("d"))
                .unwrap_or_default();
            vec![response_to(request, Body::map().text("r", text))]
        });
        let mut app = app_with(&transport, rx);

        let args = parse_args([
            "smpmgmt", "--transport", "udp", "--host", "192.0.2.1", "--group", "os", "--command",
            "echo", "--data", "ping",
        ])
        .unwrap();
        assert_eq!(app.handle(&args).await, ExitCode::Success);
        assert_eq!(printed(&app), "Finished os echo\nping\n");
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_device_error_is_command_failed() {
        let (tx, rx) = event_channel();
        let transport = MockTransport::with_events(tx);
        transport.set_responder(|request| vec![response_to(request, Body::map().int("rc", 8))]);
        let mut app = app_with(&transport, rx);

        let args = parse_args(["smpmgmt", "--group", "zephyr", "--command", "storage-erase"]).unwrap();
        assert_eq!(app.handle(&args).await, ExitCode::CommandFailed);
        assert!(printed(&app).starts_with("Error (unsupported): zephyr storage-erase"));
    }

    #[tokio::test]
    async fn test_interrupt_cancels() {
        let (_tx, rx) = event_channel();
        let transport = MockTransport::new();
        let (interrupt, interrupts) = mpsc::unbounded_channel();
        let mut app = app_with(&transport, rx).with_interrupts(interrupts);
        interrupt.send(()).unwrap();

        let args = parse_args(["smpmgmt", "--group", "os", "--command", "tasks"]).unwrap();
        assert_eq!(app.handle(&args).await, ExitCode::CommandFailed);
        assert_eq!(printed(&app), "Cancelled\n");
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_download_written_to_file() {
        let (tx, rx) = event_channel();
        let transport = MockTransport::with_events(tx);
        transport.set_responder(|request| {
            let body = Body::map().uint("off", 0).bytes("data", b"log".to_vec()).uint("len", 3);
            vec![response_to(request, body)]
        });
        let mut app = app_with(&transport, rx);

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("log.txt");
        let local_arg = local.to_string_lossy().into_owned();
        let args = parse_args([
            "smpmgmt", "--group", "fs", "--command", "download", "--remote-file", "/lfs/log.txt",
            "--local-file", local_arg.as_str(),
        ])
        .unwrap();
        assert_eq!(app.handle(&args).await, ExitCode::Success);
        assert_eq!(std::fs::read(&local).unwrap(), b"log");
    }

    #[tokio::test]
    async fn test_unsupported_transport_fails_to_open() {
        let mut app = App::new(FileConfig::default(), Vec::new());
        let args = parse_args([
            "smpmgmt", "--transport", "bluetooth", "--name", "dev", "--group", "os", "--command",
            "tasks",
        ])
        .unwrap();
        assert_eq!(app.handle(&args).await, ExitCode::TransportOpenFailed);
        assert!(printed(&app).starts_with("Transport open failed"));
        assert!(app.transport_spec().is_none());
    }
}
