// src/geometry/viewer.rs
//
// Viewer state: the displayed mesh, the active face and the display mode.
// Rendering lives outside this crate; it reads `presentation()` and the
// active `FaceView` and draws them.

use serde::Serialize;

use super::mesh::Mesh;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Whole wireframe, hue-coloured
    Full,
    /// One highlighted face at a time
    Single,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ViewerState {
    pub mode: DisplayMode,
    pub current_face: usize,
    pub labels_on: bool,
}

impl Default for ViewerState {
    fn default() -> Self {
        ViewerState {
            mode: DisplayMode::Single,
            current_face: 0,
            labels_on: true,
        }
    }
}

/// Display data derived from the active face.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FaceView {
    pub face: usize,
    /// Closed edge cycle around the face
    pub edges: Vec<(usize, usize)>,
    /// Hue at each endpoint of `edges`
    pub edge_hues: Vec<(f64, f64)>,
}

/// What the renderer should show under the current state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Presentation {
    pub full_edges_visible: bool,
    pub active_edges_visible: bool,
    /// Vertex indices to label
    pub labels: Vec<usize>,
}

pub struct Viewer {
    mesh: Mesh,
    state: ViewerState,
    face_view: FaceView,
    dragging: bool,
}

impl Viewer {
    /// Build a viewer around the first displayable mesh.
    pub fn new(mesh: Mesh) -> Self {
        let mut viewer = Viewer {
            mesh,
            state: ViewerState::default(),
            face_view: FaceView::default(),
            dragging: false,
        };
        viewer.refresh_face_view();
        viewer
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn current_face(&self) -> usize {
        self.state.current_face
    }

    pub fn face_view(&self) -> &FaceView {
        &self.face_view
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Replace the mesh, keeping mode and labels, and the face if it still exists.
    /// Returns false (and changes nothing) for a mesh with no vertices or edges.
    pub fn apply_new_mesh(&mut self, mesh: Mesh) -> bool {
        if !mesh.is_displayable() {
            tlog!("[viewer] Geometry not ready, keeping current mesh");
            return false;
        }

        self.mesh = mesh;
        if self.state.current_face >= self.mesh.face_count() {
            self.state.current_face = 0;
        }
        self.refresh_face_view();
        true
    }

    /// Switch the active face. Ignored when out of range, already active,
    /// or while a drag is in progress (the request is dropped, not queued).
    pub fn select_face(&mut self, idx: usize) -> bool {
        if idx >= self.mesh.face_count() || idx == self.state.current_face || self.dragging {
            return false;
        }
        self.state.current_face = idx;
        self.refresh_face_view();
        true
    }

    /// Consume a pending device face request.
    pub fn apply_pending_face_request(&mut self, pending: &mut Option<usize>) -> bool {
        match pending.take() {
            Some(idx) if idx != self.state.current_face => self.select_face(idx),
            _ => false,
        }
    }

    pub fn toggle_mode(&mut self) -> DisplayMode {
        self.state.mode = match self.state.mode {
            DisplayMode::Full => DisplayMode::Single,
            DisplayMode::Single => DisplayMode::Full,
        };
        self.state.mode
    }

    pub fn toggle_labels(&mut self) -> bool {
        self.state.labels_on = !self.state.labels_on;
        self.state.labels_on
    }

    pub fn begin_drag(&mut self) {
        self.dragging = true;
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    /// Collection visibility and labels, derived from mode and label flag.
    pub fn presentation(&self) -> Presentation {
        let labels = if !self.state.labels_on {
            Vec::new()
        } else {
            match self.state.mode {
                DisplayMode::Full => (0..self.mesh.vertex_count()).collect(),
                DisplayMode::Single => self
                    .mesh
                    .faces
                    .get(self.state.current_face)
                    .cloned()
                    .unwrap_or_default(),
            }
        };

        Presentation {
            full_edges_visible: self.state.mode == DisplayMode::Full,
            active_edges_visible: self.state.mode == DisplayMode::Single,
            labels,
        }
    }

    fn refresh_face_view(&mut self) {
        let face = self.state.current_face;
        let verts = match self.mesh.faces.get(face) {
            Some(v) => v,
            None => {
                self.face_view = FaceView::default();
                return;
            }
        };

        let edges: Vec<(usize, usize)> = verts
            .iter()
            .zip(verts.iter().cycle().skip(1))
            .map(|(&a, &b)| (a, b))
            .collect();
        let edge_hues = edges
            .iter()
            .map(|&(a, b)| {
                (
                    self.mesh.hues.get(a).copied().unwrap_or(0.0),
                    self.mesh.hues.get(b).copied().unwrap_or(0.0),
                )
            })
            .collect();

        self.face_view = FaceView {
            face,
            edges,
            edge_hues,
        };
    }
}

// ============================================================================
// Tests
// ============================================================================
