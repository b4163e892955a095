// src/protocol/console.rs
//
// Routed-output sink. The router writes every displayable line here; the
// presentation side drains new lines once and can re-read the retained
// history with hidden lines shown or filtered.

use std::collections::VecDeque;

use serde::Serialize;

/// Direction / visibility class of a routed line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// Outbound command
    Sent,
    /// Inbound line, visible by default
    Recv,
    /// Inbound line, hidden unless the operator asks for it
    Hidden,
}

impl LineKind {
    pub fn tag(&self) -> &'static str {
        match self {
            LineKind::Sent => "sent",
            LineKind::Recv => "recv",
            LineKind::Hidden => "hidden",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutedLine {
    pub kind: LineKind,
    pub text: String,
}

impl RoutedLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        RoutedLine {
            kind,
            text: text.into(),
        }
    }
}

/// Destination for routed lines, fixed when the router is built.
pub trait OutputSink {
    fn forward(&mut self, line: RoutedLine);
}

/// Default sink: transcript + drain-once queue + bounded history.
///
/// Both the queue and the history hold at most `history_limit` lines; a
/// caller that stops draining loses the oldest undrained lines.
pub struct ConsoleBuffer {
    pending: VecDeque<RoutedLine>,
    history: VecDeque<RoutedLine>,
    history_limit: usize,
    show_hidden: bool,
}

impl ConsoleBuffer {
    pub fn new(history_limit: usize) -> Self {
        ConsoleBuffer {
            pending: VecDeque::new(),
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
            show_hidden: false,
        }
    }

    /// New lines since the last drain, each returned exactly once.
    pub fn drain(&mut self) -> Vec<RoutedLine> {
        self.pending.drain(..).collect()
    }

    /// Flip hidden-line visibility. Returns the new setting.
    pub fn toggle_hidden(&mut self) -> bool {
        self.show_hidden = !self.show_hidden;
        tlog!("[console] Hidden lines {}", if self.show_hidden { "shown" } else { "hidden" });
        self.show_hidden
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    /// Whether a line should be displayed under the current toggle.
    pub fn is_visible(&self, line: &RoutedLine) -> bool {
        self.show_hidden || line.kind != LineKind::Hidden
    }

    /// Retained lines that are visible under the current toggle, oldest first.
    pub fn visible(&self) -> impl Iterator<Item = &RoutedLine> + '_ {
        self.history.iter().filter(move |l| self.is_visible(l))
    }

    /// Every retained line, hidden or not.
    pub fn history(&self) -> impl Iterator<Item = &RoutedLine> + '_ {
        self.history.iter()
    }
}

impl OutputSink for ConsoleBuffer {
    fn forward(&mut self, line: RoutedLine) {
        // Sent lines are transcribed by the link at send time
        if line.kind != LineKind::Sent {
            crate::logging::transcribe(line.kind.tag(), &line.text);
        }

        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(line.clone());
        if self.pending.len() >= self.history_limit {
            self.pending.pop_front();
        }
        self.pending.push_back(line);
    }
}
