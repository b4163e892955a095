// polylink: host-side companion for a polyhedron-drawing MCU on a serial link.

#[macro_use]
mod logging;

pub mod geometry;
pub mod io;
pub mod protocol;
pub mod session;
pub mod settings;

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Instant;

pub use logging::{init_file_logging, stop_file_logging};
pub use session::{Session, SessionEvent};
pub use settings::HostSettings;

use io::serial::PortBackend;
use protocol::{LineKind, RoutedLine};

// ============================================================================
// Operator Commands
// ============================================================================

/// A line typed by the operator.
#[derive(Clone, Debug, PartialEq)]
pub enum HostCommand {
    /// Forward to the device verbatim
    Send(String),
    ToggleHidden,
    ToggleMode,
    ToggleLabels,
    SelectFace(usize),
    ShowMetrics,
    Export(PathBuf),
    Quit,
}

/// Lines starting with `:` are host commands, everything else goes to the device.
pub fn parse_command(line: &str) -> Result<HostCommand, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(HostCommand::Send(line.to_string()));
    };

    let mut parts = rest.trim().splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim).unwrap_or("");

    match name {
        "hidden" => Ok(HostCommand::ToggleHidden),
        "mode" => Ok(HostCommand::ToggleMode),
        "labels" => Ok(HostCommand::ToggleLabels),
        "metrics" => Ok(HostCommand::ShowMetrics),
        "quit" | "q" => Ok(HostCommand::Quit),
        "face" => arg
            .parse::<usize>()
            .map(HostCommand::SelectFace)
            .map_err(|_| format!("usage: :face <index>, got '{}'", arg)),
        "export" if !arg.is_empty() => Ok(HostCommand::Export(PathBuf::from(arg))),
        "export" => Err("usage: :export <path>".to_string()),
        other => Err(format!("unknown command ':{}'", other)),
    }
}

// ============================================================================
// Host Loop
// ============================================================================

/// Run the session until the operator quits. Operator lines arrive on `commands`.
pub fn run(settings: &HostSettings, commands: Receiver<String>) -> Result<(), String> {
    settings.validate()?;
    let mut session = Session::from_settings(settings);
    let mut stdin_open = true;

    tlog!(
        "[host] Starting, {} at {} baud",
        settings.port.as_deref().unwrap_or("any port"),
        settings.baud_rate
    );

    loop {
        for event in session.tick(Instant::now()) {
            report_event(&event);
        }
        if let Some(face) = session.apply_pending_face_request() {
            println!("-- device selected face {}", face);
        }
        let lines = session.drain_output();
        print_lines(&session, lines);

        while stdin_open {
            match commands.try_recv() {
                Ok(line) => match parse_command(&line) {
                    Ok(HostCommand::Quit) => {
                        session.close();
                        tlog!("[host] Quit");
                        return Ok(());
                    }
                    Ok(command) => handle_command(&mut session, command),
                    Err(e) => println!("-- {}", e),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tlog!("[host] Input closed, continuing without operator commands");
                    stdin_open = false;
                }
            }
        }

        std::thread::sleep(settings.tick_interval());
    }
}

fn print_lines<B: PortBackend>(session: &Session<B>, lines: Vec<RoutedLine>) {
    for line in lines.iter().filter(|l| session.console().is_visible(l)) {
        print_line(line);
    }
}

fn print_line(line: &RoutedLine) {
    match line.kind {
        LineKind::Sent => println!("> {}", line.text),
        LineKind::Recv => println!("{}", line.text),
        LineKind::Hidden => println!("  {}", line.text),
    }
}

fn report_event(event: &SessionEvent) {
    match event {
        SessionEvent::Connected(port) => println!("-- connected on {}", port),
        SessionEvent::Disconnected(reason) => println!("-- disconnected: {}", reason),
        SessionEvent::MeshApplied {
            vertices,
            edges,
            faces,
        } => println!(
            "-- mesh: {} vertices, {} edges, {} faces",
            vertices, edges, faces
        ),
        SessionEvent::GeometryNotReady => println!("-- geometry not ready"),
        SessionEvent::GeometryRejected(reason) => println!("-- geometry rejected: {}", reason),
        SessionEvent::DumpRequested
        | SessionEvent::FaceRequested(_)
        | SessionEvent::Metric(_, _) => {}
    }
}

fn handle_command<B: PortBackend>(session: &mut Session<B>, command: HostCommand) {
    match command {
        HostCommand::Send(text) => match session.send(&text) {
            Ok(true) => {}
            Ok(false) => println!("-- not connected, '{}' not sent", text),
            Err(e) => println!("-- send failed: {}", e),
        },
        HostCommand::ToggleHidden => {
            let shown = session.toggle_hidden();
            println!("-- hidden lines {}", if shown { "shown" } else { "hidden" });
            if shown {
                for line in session.history() {
                    print_line(&line);
                }
            }
        }
        HostCommand::ToggleMode => match session.toggle_mode() {
            Some(mode) => println!("-- display mode {:?}", mode),
            None => println!("-- no mesh yet"),
        },
        HostCommand::ToggleLabels => match session.toggle_labels() {
            Some(on) => println!("-- labels {}", if on { "on" } else { "off" }),
            None => println!("-- no mesh yet"),
        },
        HostCommand::SelectFace(idx) => {
            if session.select_face(idx) {
                println!("-- face {}", idx);
            } else {
                println!("-- face {} not selectable", idx);
            }
        }
        HostCommand::ShowMetrics => {
            let metrics = session.metrics();
            let fmt = |v: Option<f64>| {
                v.map(|ms| format!("{:.3} ms", ms))
                    .unwrap_or_else(|| "-".to_string())
            };
            println!(
                "-- frame {}  anim {}",
                fmt(metrics.frame_ms),
                fmt(metrics.anim_ms)
            );
        }
        HostCommand::Export(path) => match export_mesh(session, &path) {
            Ok(()) => println!("-- mesh written to {}", path.display()),
            Err(e) => println!("-- export failed: {}", e),
        },
        HostCommand::Quit => {}
    }
}

/// Write the displayed mesh as JSON.
pub fn export_mesh<B: PortBackend>(
    session: &Session<B>,
    path: &std::path::Path,
) -> Result<(), String> {
    let viewer = session.viewer().ok_or_else(|| "no mesh yet".to_string())?;
    let json = serde_json::to_string_pretty(viewer.mesh())
        .map_err(|e| format!("Failed to serialize mesh: {}", e))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}
