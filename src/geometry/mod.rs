// src/geometry/mod.rs
//
// Geometry dumps: mesh model, strict parser and viewer state.

pub mod mesh;
pub mod parser;
pub mod viewer;

pub use mesh::Mesh;
pub use parser::parse;
pub use viewer::{DisplayMode, FaceView, Presentation, Viewer, ViewerState};
