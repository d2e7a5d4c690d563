//! Session-scoped mesh and surface state.
//!
//! The lifecycle engine never inspects these values; they are read and
//! written only by units of work and completion callbacks.

use serde::{Deserialize, Serialize};

/// A loaded input surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SurfaceData {
    /// Caller-supplied surface identifier.
    pub surface_id: String,
    /// Number of sampled vertices.
    pub vertex_count: u32,
}

/// A triangulated mesh.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Mesh {
    /// Number of triangles.
    pub triangle_count: u32,
}

/// Parameters used to slice a mesh into layers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LayerSettings {
    /// Number of layers to generate.
    pub layer_count: u32,
    /// Layer thickness in micrometres.
    pub thickness_um: u32,
}

/// One side (cut or fill) of the layered design.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LayerStack {
    /// Settings the layers were generated with.
    pub settings: LayerSettings,
    /// Generated layers, bottom first.
    pub layers: Vec<Mesh>,
}

/// Summary of a created design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Design {
    /// Surface the design was built from, if any.
    pub surface_id: Option<String>,
    /// Total cut plus fill layers.
    pub layer_count: usize,
    /// Preview points included in the design.
    pub preview_points: usize,
}

/// All mutable state owned by one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionData {
    /// Surface that bounds the design.
    pub critical_surface: Option<SurfaceData>,
    /// Mesh generated from the critical surface.
    pub critical_mesh: Option<Mesh>,
    /// Material removal layers.
    pub cut: LayerStack,
    /// Material addition layers.
    pub fill: LayerStack,
    /// Points most recently computed for preview.
    pub preview_points: usize,
    /// Most recently created design.
    pub design: Option<Design>,
}

impl SessionData {
    /// Total generated layers across cut and fill.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.cut.layers.len() + self.fill.layers.len()
    }

    /// Compact view of the state for completion payloads.
    #[must_use]
    pub fn summary(&self) -> StateSummary {
        StateSummary {
            surface_id: self
                .critical_surface
                .as_ref()
                .map(|surface| surface.surface_id.clone()),
            triangle_count: self.critical_mesh.as_ref().map_or(0, |mesh| mesh.triangle_count),
            layer_count: self.layer_count(),
            preview_points: self.preview_points,
            has_design: self.design.is_some(),
        }
    }
}

/// Counts describing a [`SessionData`] without its layer contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StateSummary {
    /// Loaded surface, if any.
    pub surface_id: Option<String>,
    /// Triangles in the critical mesh.
    pub triangle_count: u32,
    /// Total cut plus fill layers.
    pub layer_count: usize,
    /// Current preview point count.
    pub preview_points: usize,
    /// Whether a design has been created.
    pub has_design: bool,
}
