// src/protocol/mod.rs
//
// Tag-delimited text protocol spoken by the MCU.
//
// Wire summary:
//   #geo# ... V:/E:/f<n>: lines ... #endgeo#   geometry dump
//   #face# <n>                                 device-requested face selection
//   #noprefix# ... raw lines ... #endnoprefix#  passthrough zone, hidden by default
//   #frametime <us>#, #animtime <us>#          render metrics
//   #...#                                      any other tag, hidden by default

pub mod console;
pub mod metrics;
pub mod router;

pub use console::{ConsoleBuffer, LineKind, OutputSink, RoutedLine};
pub use metrics::{MetricKind, MetricsSnapshot, RollingAverage};
pub use router::{ProtocolMode, RouteEvent, TagRouter};

pub const GEO_START: &str = "#geo#";
pub const GEO_END: &str = "#endgeo#";
pub const FACE_SELECT: &str = "#face#";
pub const NOPREFIX_START: &str = "#noprefix#";
pub const NOPREFIX_END: &str = "#endnoprefix#";
pub const FRAMETIME: &str = "#frametime";
pub const ANIMTIME: &str = "#animtime";

/// Outbound command asking the MCU for a fresh geometry dump.
pub const DUMP_REQUEST: &str = "#dumpgeo#";

/// True for a generic `#...#` bracketed tag line.
pub fn is_bracketed_tag(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('#') && text.ends_with('#')
}
