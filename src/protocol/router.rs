// src/protocol/router.rs
//
// Tag router: classifies each framed line and dispatches it to passthrough,
// geometry collection, face selection, metrics or the plain console path.
//
// Precedence (first match wins):
//   1. "#noprefix#"                    -> enter passthrough, forward
//   2. "#endnoprefix#" in passthrough  -> forward, back to normal
//   3. in passthrough                  -> forward verbatim
//   4. "#geo#..."                      -> start a new batch, forward
//   5. "#endgeo#..." while collecting  -> close batch, hand off, forward
//   6. "#face#..."                     -> set pending face request
//   7. while collecting                -> buffer, not forwarded
//   8. anything else                   -> metrics or plain line

use crate::io::error::IoError;

use super::console::{LineKind, OutputSink, RoutedLine};
use super::metrics::{parse_metric, MetricKind};
use super::{
    is_bracketed_tag, ANIMTIME, FACE_SELECT, FRAMETIME, GEO_END, GEO_START, NOPREFIX_END,
    NOPREFIX_START,
};

/// Interpretation mode. At most one zone is open at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProtocolMode {
    #[default]
    Normal,
    /// Inside a #noprefix# zone
    Passthrough,
    /// Inside a #geo# zone
    CollectingGeometry,
}

/// Side effects of routing one line, for the session to act on.
#[derive(Clone, Debug, PartialEq)]
pub enum RouteEvent {
    /// A complete geometry batch, start and end tags included
    GeometryReady(Vec<String>),
    /// The device asked for a face
    FaceRequested(usize),
    /// A metrics sample, already in milliseconds
    Metric(MetricKind, f64),
}

/// Line router. Owns the protocol mode, the geometry batch and the pending face request.
pub struct TagRouter<S: OutputSink> {
    sink: S,
    mode: ProtocolMode,
    batch: Vec<String>,
    pending_face: Option<usize>,
}

impl<S: OutputSink> TagRouter<S> {
    pub fn new(sink: S) -> Self {
        TagRouter {
            sink,
            mode: ProtocolMode::Normal,
            batch: Vec::new(),
            pending_face: None,
        }
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn pending_face(&self) -> Option<usize> {
        self.pending_face
    }

    /// Consume the pending face request, if any.
    pub fn take_pending_face(&mut self) -> Option<usize> {
        self.pending_face.take()
    }

    /// Lines collected so far in an open geometry zone.
    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    /// Discard an in-progress geometry batch (link closed mid-dump).
    pub fn abort_geometry(&mut self) {
        if self.mode == ProtocolMode::CollectingGeometry {
            tlog!(
                "[router] Abandoning geometry dump after {} lines",
                self.batch.len()
            );
            self.mode = ProtocolMode::Normal;
        }
        self.batch.clear();
    }

    /// Record an outbound command in the sink.
    pub fn record_sent(&mut self, command: &str) {
        self.sink.forward(RoutedLine::new(LineKind::Sent, command));
    }

    /// Route one framed line.
    pub fn route(&mut self, text: &str) -> Option<RouteEvent> {
        if text == NOPREFIX_START {
            self.mode = ProtocolMode::Passthrough;
            self.forward(text);
            return None;
        }

        if text == NOPREFIX_END && self.mode == ProtocolMode::Passthrough {
            self.forward(text);
            self.mode = ProtocolMode::Normal;
            return None;
        }

        if self.mode == ProtocolMode::Passthrough {
            self.forward(text);
            return None;
        }

        if text.starts_with(GEO_START) {
            if self.mode == ProtocolMode::CollectingGeometry {
                tlog!(
                    "[router] Geometry dump restarted, dropping {} buffered lines",
                    self.batch.len()
                );
            }
            self.mode = ProtocolMode::CollectingGeometry;
            self.batch.clear();
            self.batch.push(text.to_string());
            self.forward(text);
            return None;
        }

        if text.starts_with(GEO_END) && self.mode == ProtocolMode::CollectingGeometry {
            self.batch.push(text.to_string());
            self.mode = ProtocolMode::Normal;
            let batch = std::mem::take(&mut self.batch);
            self.forward(text);
            return Some(RouteEvent::GeometryReady(batch));
        }

        if text.starts_with(FACE_SELECT) {
            // Consumed: transcribed only, never shown
            crate::logging::transcribe(LineKind::Hidden.tag(), text);
            return match parse_face_request(text) {
                Ok(idx) => {
                    self.pending_face = Some(idx);
                    Some(RouteEvent::FaceRequested(idx))
                }
                Err(e) => {
                    tlog!("[router] Dropping face request: {}", e);
                    None
                }
            };
        }

        if self.mode == ProtocolMode::CollectingGeometry {
            self.batch.push(text.to_string());
            return None;
        }

        if text.starts_with(FRAMETIME) || text.starts_with(ANIMTIME) {
            // Consumed even when the value is malformed
            crate::logging::transcribe(LineKind::Hidden.tag(), text);
            return parse_metric(text).map(|(kind, ms)| RouteEvent::Metric(kind, ms));
        }

        self.forward(text);
        None
    }

    /// Forward an inbound line, classified by the visibility rule.
    fn forward(&mut self, text: &str) {
        let kind = if self.is_hidden(text) {
            LineKind::Hidden
        } else {
            LineKind::Recv
        };
        self.sink.forward(RoutedLine::new(kind, text));
    }

    fn is_hidden(&self, text: &str) -> bool {
        self.mode == ProtocolMode::Passthrough || is_bracketed_tag(text)
    }
}

/// Parse the index from `#face# <n>` (a trailing `#` is tolerated).
pub fn parse_face_request(text: &str) -> Result<usize, IoError> {
    let payload = text
        .strip_prefix(FACE_SELECT)
        .unwrap_or(text)
        .trim()
        .trim_end_matches('#')
        .trim();
    payload
        .parse::<usize>()
        .map_err(|e| IoError::protocol("face", format!("invalid index {:?}: {}", payload, e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::console::ConsoleBuffer;

    fn router() -> TagRouter<ConsoleBuffer> {
        TagRouter::new(ConsoleBuffer::new(100))
    }

    fn drained(router: &mut TagRouter<ConsoleBuffer>) -> Vec<(LineKind, String)> {
        router
            .sink_mut()
            .drain()
            .into_iter()
            .map(|l| (l.kind, l.text))
            .collect()
    }

    #[test]
    fn test_plain_lines_forwarded() {
        let mut r = router();
        assert_eq!(r.route("hello"), None);
        assert_eq!(r.route("#debug on#"), None);
        assert_eq!(
            drained(&mut r),
            vec![
                (LineKind::Recv, "hello".to_string()),
                (LineKind::Hidden, "#debug on#".to_string()),
            ]
        );
    }

    #[test]
    fn test_geometry_collection() {
        let mut r = router();
        r.route("#geo#");
        assert_eq!(r.mode(), ProtocolMode::CollectingGeometry);
        r.route("V:0,(0,0,0,10);1,(1,0,0,20)");
        r.route("E:(0-1)");
        r.route("f0:0,1");
        assert_eq!(r.batch_len(), 4);

        let event = r.route("#endgeo#");
        assert_eq!(
            event,
            Some(RouteEvent::GeometryReady(vec![
                "#geo#".to_string(),
                "V:0,(0,0,0,10);1,(1,0,0,20)".to_string(),
                "E:(0-1)".to_string(),
                "f0:0,1".to_string(),
                "#endgeo#".to_string(),
            ]))
        );
        assert_eq!(r.mode(), ProtocolMode::Normal);
        assert_eq!(r.batch_len(), 0);

        // Only the tags reach the sink, both hidden
        assert_eq!(
            drained(&mut r),
            vec![
                (LineKind::Hidden, "#geo#".to_string()),
                (LineKind::Hidden, "#endgeo#".to_string()),
            ]
        );
    }

    #[test]
    fn test_endgeo_outside_zone_is_plain() {
        let mut r = router();
        assert_eq!(r.route("#endgeo#"), None);
        assert_eq!(drained(&mut r).len(), 1);
    }

    #[test]
    fn test_geo_restart_resets_batch() {
        let mut r = router();
        r.route("#geo#");
        r.route("V:0,(0,0,0,1)");
        r.route("#geo#");
        assert_eq!(r.batch_len(), 1);
    }

    #[test]
    fn test_passthrough_zone() {
        let mut r = router();
        r.route("#noprefix#");
        assert_eq!(r.mode(), ProtocolMode::Passthrough);
        // Tags are not interpreted inside the zone
        assert_eq!(r.route("#geo#"), None);
        assert_eq!(r.route("#face# 2"), None);
        assert_eq!(r.route("raw1"), None);
        r.route("#endnoprefix#");
        assert_eq!(r.mode(), ProtocolMode::Normal);
        assert_eq!(r.pending_face(), None);

        let lines = drained(&mut r);
        assert_eq!(lines.len(), 5);
        assert!(lines.iter().all(|(k, _)| *k == LineKind::Hidden));
        assert_eq!(lines[3].1, "raw1");
    }

    #[test]
    fn test_endnoprefix_outside_zone_is_plain() {
        let mut r = router();
        r.route("#endnoprefix#");
        assert_eq!(r.mode(), ProtocolMode::Normal);
        assert_eq!(drained(&mut r), vec![(LineKind::Hidden, "#endnoprefix#".to_string())]);
    }

    #[test]
    fn test_face_request() {
        let mut r = router();
        assert_eq!(r.route("#face# 3#"), Some(RouteEvent::FaceRequested(3)));
        assert_eq!(r.route("#face# 4"), Some(RouteEvent::FaceRequested(4)));
        // Overwritten, not queued
        assert_eq!(r.take_pending_face(), Some(4));
        assert_eq!(r.take_pending_face(), None);
        assert!(drained(&mut r).is_empty());
    }

    #[test]
    fn test_malformed_face_request_keeps_pending() {
        let mut r = router();
        r.route("#face# 1");
        assert_eq!(r.route("#face# abc"), None);
        assert_eq!(r.route("#face#"), None);
        assert_eq!(r.pending_face(), Some(1));
    }

    #[test]
    fn test_face_request_inside_geometry_zone() {
        let mut r = router();
        r.route("#geo#");
        assert_eq!(r.route("#face# 2"), Some(RouteEvent::FaceRequested(2)));
        assert_eq!(r.batch_len(), 1);
        assert_eq!(r.mode(), ProtocolMode::CollectingGeometry);
    }

    #[test]
    fn test_metrics_consumed() {
        let mut r = router();
        assert_eq!(
            r.route("#frametime 16000#"),
            Some(RouteEvent::Metric(MetricKind::FrameTime, 16.0))
        );
        assert_eq!(
            r.route("#animtime 500#"),
            Some(RouteEvent::Metric(MetricKind::AnimTime, 0.5))
        );
        assert_eq!(r.route("#frametime garbage#"), None);
        assert!(drained(&mut r).is_empty());
    }

    #[test]
    fn test_abort_geometry() {
        let mut r = router();
        r.route("#geo#");
        r.route("V:0,(0,0,0,1)");
        r.abort_geometry();
        assert_eq!(r.mode(), ProtocolMode::Normal);
        assert_eq!(r.batch_len(), 0);
        // A late end tag no longer closes anything
        assert_eq!(r.route("#endgeo#"), None);
    }

    #[test]
    fn test_parse_face_request() {
        assert_eq!(parse_face_request("#face# 3#").unwrap(), 3);
        assert_eq!(parse_face_request("#face#12").unwrap(), 12);
        assert_eq!(parse_face_request("#face#  7 # ").unwrap(), 7);
        assert!(parse_face_request("#face# -1").is_err());
        assert!(parse_face_request("#face# x").is_err());
    }
}
