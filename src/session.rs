// src/session.rs
//
// One host session: link -> framer -> router -> parser -> viewer, driven from
// a single thread by `tick`. The presentation side reads state between ticks
// through the accessors here and never touches the link directly.

use std::time::Instant;

use crate::geometry::{self, DisplayMode, Viewer};
use crate::io::error::IoError;
use crate::io::serial::{LineFramer, LinkManager, PortBackend, ReconnectOutcome, SerialBackend};
use crate::protocol::{
    ConsoleBuffer, MetricKind, MetricsSnapshot, ProtocolMode, RollingAverage, RouteEvent,
    RoutedLine, TagRouter,
};
use crate::settings::HostSettings;

/// Something the host may want to report after a tick.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Connected(String),
    /// The link dropped; carries the error text
    Disconnected(String),
    DumpRequested,
    MeshApplied {
        vertices: usize,
        edges: usize,
        faces: usize,
    },
    /// Parsed fine but had no vertices or no edges
    GeometryNotReady,
    /// Parse failed; the previous mesh is still shown
    GeometryRejected(String),
    FaceRequested(usize),
    Metric(MetricKind, f64),
}

pub struct Session<B: PortBackend> {
    link: LinkManager<B>,
    framer: LineFramer,
    router: TagRouter<ConsoleBuffer>,
    viewer: Option<Viewer>,
    frame_times: RollingAverage,
    anim_times: RollingAverage,
    geometry_received: bool,
}

impl Session<SerialBackend> {
    pub fn from_settings(settings: &HostSettings) -> Self {
        Session::new(settings.serial_backend(), settings)
    }
}

impl<B: PortBackend> Session<B> {
    pub fn new(backend: B, settings: &HostSettings) -> Self {
        Session {
            link: LinkManager::new(backend, settings.link_timing()),
            framer: LineFramer::new(settings.max_line_length),
            router: TagRouter::new(ConsoleBuffer::new(settings.console_history)),
            viewer: None,
            frame_times: RollingAverage::new(settings.metrics_history),
            anim_times: RollingAverage::new(settings.metrics_history),
            geometry_received: false,
        }
    }

    /// One non-blocking step: keep the link alive, read what is ready and
    /// route every complete line.
    pub fn tick(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        let was_connected = self.link.is_connected();
        match self.link.try_reconnect(now) {
            ReconnectOutcome::Connected(port) => {
                self.geometry_received = false;
                self.framer.reset();
                events.push(SessionEvent::Connected(port));
            }
            ReconnectOutcome::DumpRequested => {
                let command = self.link.dump_command().to_string();
                self.router.record_sent(&command);
                events.push(SessionEvent::DumpRequested);
                if !self.link.is_connected() {
                    self.on_link_lost();
                    events.push(SessionEvent::Disconnected(format!(
                        "write failed while sending {}",
                        command
                    )));
                }
            }
            ReconnectOutcome::AlreadyConnected
            | ReconnectOutcome::Waiting
            | ReconnectOutcome::NoPortAvailable => {
                if was_connected && !self.link.is_connected() {
                    self.on_link_lost();
                }
            }
        }

        let bytes = match self.link.read_available() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.on_link_lost();
                events.push(SessionEvent::Disconnected(e.to_string()));
                return events;
            }
        };
        if bytes.is_empty() {
            return events;
        }

        let lines: Vec<String> = self.framer.feed(&bytes).collect();
        for line in lines {
            self.route_line(&line, &mut events);
        }
        events
    }

    /// Send a command to the device. `Ok(false)` when no link is open.
    ///
    /// The command is recorded in the console either way. A write failure
    /// closes the link and is returned for the caller to report.
    pub fn send(&mut self, command: &str) -> Result<bool, IoError> {
        self.router.record_sent(command);
        match self.link.send(command) {
            Ok(sent) => Ok(sent),
            Err(e) => {
                self.on_link_lost();
                Err(e)
            }
        }
    }

    pub fn close(&mut self) {
        self.link.close();
        self.on_link_lost();
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.link.port_name()
    }

    pub fn link(&self) -> &LinkManager<B> {
        &self.link
    }

    pub fn protocol_mode(&self) -> ProtocolMode {
        self.router.mode()
    }

    pub fn console(&self) -> &ConsoleBuffer {
        self.router.sink()
    }

    /// Lines routed since the last drain, hidden ones included.
    pub fn drain_output(&mut self) -> Vec<RoutedLine> {
        self.router.sink_mut().drain()
    }

    /// Retained lines visible under the current hidden-line toggle.
    pub fn history(&self) -> Vec<RoutedLine> {
        self.router.sink().visible().cloned().collect()
    }

    pub fn toggle_hidden(&mut self) -> bool {
        self.router.sink_mut().toggle_hidden()
    }

    pub fn viewer(&self) -> Option<&Viewer> {
        self.viewer.as_ref()
    }

    pub fn viewer_mut(&mut self) -> Option<&mut Viewer> {
        self.viewer.as_mut()
    }

    /// Whether a complete geometry batch has arrived on this connection.
    pub fn geometry_received(&self) -> bool {
        self.geometry_received
    }

    pub fn toggle_mode(&mut self) -> Option<DisplayMode> {
        self.viewer.as_mut().map(|v| v.toggle_mode())
    }

    pub fn toggle_labels(&mut self) -> Option<bool> {
        self.viewer.as_mut().map(|v| v.toggle_labels())
    }

    pub fn select_face(&mut self, idx: usize) -> bool {
        self.viewer
            .as_mut()
            .map(|v| v.select_face(idx))
            .unwrap_or(false)
    }

    /// Apply the device's pending face request, consuming it. With no mesh
    /// yet the request stays pending.
    pub fn apply_pending_face_request(&mut self) -> Option<usize> {
        let viewer = self.viewer.as_mut()?;
        let mut pending = self.router.take_pending_face();
        let requested = pending;
        if viewer.apply_pending_face_request(&mut pending) {
            requested
        } else {
            None
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frame_ms: self.frame_times.average(),
            anim_ms: self.anim_times.average(),
        }
    }

    fn route_line(&mut self, line: &str, events: &mut Vec<SessionEvent>) {
        match self.router.route(line) {
            Some(RouteEvent::GeometryReady(batch)) => {
                self.geometry_received = true;
                events.push(self.integrate_geometry(&batch));
            }
            Some(RouteEvent::FaceRequested(idx)) => {
                events.push(SessionEvent::FaceRequested(idx));
            }
            Some(RouteEvent::Metric(kind, ms)) => {
                match kind {
                    MetricKind::FrameTime => self.frame_times.push(ms),
                    MetricKind::AnimTime => self.anim_times.push(ms),
                }
                events.push(SessionEvent::Metric(kind, ms));
            }
            None => {}
        }
    }

    fn integrate_geometry(&mut self, batch: &[String]) -> SessionEvent {
        let mut mesh = match geometry::parse(batch) {
            Ok(mesh) => mesh,
            Err(e) => {
                tlog!("[session] Geometry rejected: {}", e);
                return SessionEvent::GeometryRejected(e.to_string());
            }
        };

        let dropped = mesh.retain_valid_references();
        if dropped > 0 {
            tlog!("[session] Dropped {} out-of-range edges/faces", dropped);
        }

        let (vertices, edges, faces) = (mesh.vertex_count(), mesh.edges.len(), mesh.face_count());
        let applied = match self.viewer.as_mut() {
            Some(viewer) => viewer.apply_new_mesh(mesh),
            None if mesh.is_displayable() => {
                self.viewer = Some(Viewer::new(mesh));
                true
            }
            None => false,
        };

        if !applied {
            return SessionEvent::GeometryNotReady;
        }
        tlog!(
            "[session] Mesh applied: {} vertices, {} edges, {} faces",
            vertices,
            edges,
            faces
        );
        SessionEvent::MeshApplied {
            vertices,
            edges,
            faces,
        }
    }

    fn on_link_lost(&mut self) {
        self.router.abort_geometry();
        self.framer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Mesh;
    use crate::io::serial::link::tests::MockBackend;
    use crate::protocol::LineKind;
    use std::time::Duration;

    const SCENARIO_A: &str = "#geo#\nV:0,(0,0,0,10);1,(1,0,0,20)\nE:(0-1)\nf0:0,1\n#endgeo#\n";
    const SCENARIO_B: &str = "#geo#\nV:0,(0,0,0,abc);1,(1,0,0,20)\nE:(0-1)\nf0:0,1\n#endgeo#\n";

    fn connected_session() -> (Session<MockBackend>, MockBackend, Instant) {
        let backend = MockBackend::with_ports(&["/dev/ttyACM0"]);
        let mut session = Session::new(backend.clone(), &HostSettings::default());
        let start = Instant::now();
        let events = session.tick(start);
        assert_eq!(
            events,
            vec![SessionEvent::Connected("/dev/ttyACM0".to_string())]
        );
        (session, backend, start)
    }

    fn five_face_dump() -> String {
        let mesh = Mesh {
            vertices: vec![[0.0, 0.0, 0.0]; 5],
            hues: vec![0.0; 5],
            edges: vec![(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)],
            faces: vec![
                vec![0, 1, 2],
                vec![1, 2, 3],
                vec![2, 3, 4],
                vec![3, 4, 0],
                vec![4, 0, 1],
            ],
        };
        let mut dump = mesh.to_wire_lines().join("\n");
        dump.push('\n');
        dump
    }

    #[test]
    fn test_scenario_a_mesh_applied() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(SCENARIO_A.as_bytes());

        let events = session.tick(start + Duration::from_millis(5));
        assert_eq!(
            events,
            vec![SessionEvent::MeshApplied {
                vertices: 2,
                edges: 1,
                faces: 1
            }]
        );
        assert!(session.geometry_received());

        let mesh = session.viewer().unwrap().mesh();
        assert_eq!(mesh.edges, vec![(0, 1)]);
        assert_eq!(mesh.faces, vec![vec![0, 1]]);
        assert_eq!(mesh.hues, vec![10.0 / 255.0, 20.0 / 255.0]);
    }

    #[test]
    fn test_scenario_b_failed_parse_keeps_mesh() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(SCENARIO_A.as_bytes());
        session.tick(start);
        let before = session.viewer().unwrap().mesh().clone();

        backend.push_incoming(SCENARIO_B.as_bytes());
        let events = session.tick(start + Duration::from_millis(10));
        assert!(matches!(events[..], [SessionEvent::GeometryRejected(_)]));
        assert_eq!(session.viewer().unwrap().mesh(), &before);
        assert_eq!(session.protocol_mode(), ProtocolMode::Normal);
    }

    #[test]
    fn test_scenario_c_face_request_applied_once() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(five_face_dump().as_bytes());
        session.tick(start);
        assert_eq!(session.viewer().unwrap().current_face(), 0);

        backend.push_incoming(b"#face# 3#\n");
        let events = session.tick(start + Duration::from_millis(5));
        assert_eq!(events, vec![SessionEvent::FaceRequested(3)]);

        assert_eq!(session.apply_pending_face_request(), Some(3));
        assert_eq!(session.viewer().unwrap().current_face(), 3);
        assert_eq!(session.apply_pending_face_request(), None);
        assert_eq!(session.viewer().unwrap().current_face(), 3);

        // Face requests never reach the console
        assert!(session
            .drain_output()
            .iter()
            .all(|l| !l.text.starts_with("#face#")));
    }

    #[test]
    fn test_face_request_waits_for_first_mesh() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(b"#face# 2\n");
        session.tick(start);
        assert_eq!(session.apply_pending_face_request(), None);

        backend.push_incoming(five_face_dump().as_bytes());
        session.tick(start + Duration::from_millis(5));
        assert_eq!(session.apply_pending_face_request(), Some(2));
    }

    #[test]
    fn test_negative_face_index_keeps_rest_of_dump() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(
            b"#geo#\nV:0,(0,0,0,10);1,(1,0,0,20);2,(0,1,0,30)\nE:(0-1)(1-2)\nf0:0,1,2\nf1:0,-1\n#endgeo#\n",
        );
        let events = session.tick(start);
        assert_eq!(
            events,
            vec![SessionEvent::MeshApplied {
                vertices: 3,
                edges: 2,
                faces: 1
            }]
        );
        assert_eq!(session.viewer().unwrap().mesh().faces, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_face_request_during_drag_is_dropped() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(five_face_dump().as_bytes());
        session.tick(start);
        session.viewer_mut().unwrap().begin_drag();

        backend.push_incoming(b"#face# 2\n");
        session.tick(start + Duration::from_millis(5));
        assert_eq!(session.router.pending_face(), Some(2));

        assert_eq!(session.apply_pending_face_request(), None);
        assert_eq!(session.viewer().unwrap().current_face(), 0);
        assert_eq!(session.router.pending_face(), None);

        // Not replayed once the drag ends
        session.viewer_mut().unwrap().end_drag();
        assert_eq!(session.apply_pending_face_request(), None);
        assert_eq!(session.viewer().unwrap().current_face(), 0);
    }

    #[test]
    fn test_scenario_d_passthrough_hidden_until_toggled() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(b"#noprefix#\nraw1\n#endnoprefix#\n");
        session.tick(start);

        let drained = session.drain_output();
        let raw = drained.iter().find(|l| l.text == "raw1").unwrap();
        assert_eq!(raw.kind, LineKind::Hidden);
        assert!(session.history().iter().all(|l| l.text != "raw1"));

        assert!(session.toggle_hidden());
        assert!(session.history().iter().any(|l| l.text == "raw1"));
        assert!(session.drain_output().is_empty());
    }

    #[test]
    fn test_dump_split_across_reads() {
        let (mut session, backend, start) = connected_session();
        let (head, tail) = SCENARIO_A.split_at(17);
        backend.push_incoming(head.as_bytes());
        assert!(session.tick(start).is_empty());
        assert_eq!(session.protocol_mode(), ProtocolMode::CollectingGeometry);

        backend.push_incoming(tail.as_bytes());
        let events = session.tick(start + Duration::from_millis(5));
        assert!(matches!(events[..], [SessionEvent::MeshApplied { .. }]));
    }

    #[test]
    fn test_read_error_mid_dump_discards_batch() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(b"#geo#\nV:0,(0,0,0,10);1,(1,0,0,20)\nE:(0");
        session.tick(start);
        assert_eq!(session.protocol_mode(), ProtocolMode::CollectingGeometry);

        backend.wire.lock().unwrap().fail_read = true;
        let events = session.tick(start + Duration::from_millis(5));
        assert!(matches!(events[..], [SessionEvent::Disconnected(_)]));
        assert!(!session.is_connected());
        assert_eq!(session.protocol_mode(), ProtocolMode::Normal);

        // The tail of the old dump on a new connection is just noise
        backend.wire.lock().unwrap().fail_read = false;
        backend.push_incoming(b"-1)\nf0:0,1\n#endgeo#\n");
        let events = session.tick(start + Duration::from_secs(3));
        assert!(matches!(events[..], [SessionEvent::Connected(_)]));
        assert!(session.viewer().is_none());
    }

    #[test]
    fn test_explicit_close_discards_batch() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(b"#geo#\nV:0,(0,0,0,10)\n");
        session.tick(start);

        session.close();
        assert!(!session.is_connected());
        assert_eq!(session.protocol_mode(), ProtocolMode::Normal);
    }

    #[test]
    fn test_reconnect_clears_geometry_flag() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(SCENARIO_A.as_bytes());
        session.tick(start);
        assert!(session.geometry_received());

        session.close();
        let events = session.tick(start + Duration::from_secs(3));
        assert!(matches!(events[..], [SessionEvent::Connected(_)]));
        assert!(!session.geometry_received());
        // The previous mesh stays on screen until a new one arrives
        assert!(session.viewer().is_some());
    }

    #[test]
    fn test_dump_probe_recorded_once() {
        let (mut session, backend, start) = connected_session();
        let events = session.tick(start + Duration::from_secs(250));
        assert_eq!(events, vec![SessionEvent::DumpRequested]);
        assert_eq!(backend.written(), "#dumpgeo#\n");

        let sent: Vec<RoutedLine> = session
            .drain_output()
            .into_iter()
            .filter(|l| l.kind == LineKind::Sent)
            .collect();
        assert_eq!(sent, vec![RoutedLine::new(LineKind::Sent, "#dumpgeo#")]);

        assert!(session.tick(start + Duration::from_secs(500)).is_empty());
        assert_eq!(backend.written(), "#dumpgeo#\n");
    }

    #[test]
    fn test_send_records_even_when_disconnected() {
        let backend = MockBackend::with_ports(&[]);
        let mut session = Session::new(backend, &HostSettings::default());
        assert_eq!(session.send("f++"), Ok(false));
        assert_eq!(
            session.drain_output(),
            vec![RoutedLine::new(LineKind::Sent, "f++")]
        );
    }

    #[test]
    fn test_send_failure_closes_link() {
        let (mut session, backend, _) = connected_session();
        backend.wire.lock().unwrap().fail_write = true;
        assert!(session.send("save").unwrap_err().is_connection());
        assert!(!session.is_connected());
    }

    #[test]
    fn test_metrics_are_averaged_and_not_shown() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(b"#frametime 16000#\n#frametime 18000#\n#animtime 2500#\nhello\n");
        let events = session.tick(start);
        assert_eq!(events.len(), 3);

        let metrics = session.metrics();
        assert_eq!(metrics.frame_ms, Some(17.0));
        assert_eq!(metrics.anim_ms, Some(2.5));

        let drained: Vec<String> = session.drain_output().into_iter().map(|l| l.text).collect();
        assert_eq!(drained, vec!["hello".to_string()]);
    }

    #[test]
    fn test_empty_dump_is_not_ready() {
        let (mut session, backend, start) = connected_session();
        backend.push_incoming(b"#geo#\n#endgeo#\n");
        let events = session.tick(start);
        assert_eq!(events, vec![SessionEvent::GeometryNotReady]);
        assert!(session.viewer().is_none());
        assert!(session.geometry_received());
    }

    #[test]
    fn test_mode_and_labels_need_a_mesh() {
        let (mut session, backend, start) = connected_session();
        assert_eq!(session.toggle_mode(), None);
        assert_eq!(session.toggle_labels(), None);

        backend.push_incoming(SCENARIO_A.as_bytes());
        session.tick(start);
        assert_eq!(session.toggle_mode(), Some(DisplayMode::Full));
        assert_eq!(session.toggle_labels(), Some(false));
    }
}
