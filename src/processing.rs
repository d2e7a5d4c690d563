//! Simulated mesh processing.
//!
//! Each [`MeshJob`] sleeps through a configurable number of short steps and
//! then produces a [`MeshResult`]. Results are applied to the session state
//! only through [`Commit`], which the session calls after confirming the
//! operation was not cancelled. Anything proportional to the request size is
//! built while the job is still stepping, so a commit only moves values into
//! place.

use std::thread;
use std::time::Duration;

use crate::config::WorkConfig;
use crate::models::operation::{OperationParams, MAX_LAYER_COUNT};
use crate::models::surface::{Design, LayerSettings, LayerStack, Mesh, SessionData, SurfaceData};
use crate::worker::{Progress, UnitOfWork};

/// Applies a finished unit of work to the session state.
pub trait Commit: Send + 'static {
    /// Write the result into `data`.
    fn commit(self, data: &mut SessionData);
}

impl Commit for () {
    fn commit(self, _data: &mut SessionData) {}
}

/// Output of a [`MeshJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshResult {
    /// A surface was loaded and meshed.
    SurfaceLoaded {
        /// The loaded surface.
        surface: SurfaceData,
        /// Its mesh.
        mesh: Mesh,
    },
    /// Layers were regenerated.
    LayersUpdated {
        /// New material removal stack.
        cut: LayerStack,
        /// New material addition stack.
        fill: LayerStack,
    },
    /// Preview points were sampled at this resolution.
    PreviewComputed {
        /// Points per layer.
        resolution: u32,
    },
    /// A design was assembled.
    DesignCreated,
}

impl Commit for MeshResult {
    fn commit(self, data: &mut SessionData) {
        match self {
            Self::SurfaceLoaded { surface, mesh } => {
                data.critical_surface = Some(surface);
                data.critical_mesh = Some(mesh);
                data.preview_points = 0;
                data.design = None;
            }
            Self::LayersUpdated { mut cut, mut fill } => {
                let source = data
                    .critical_mesh
                    .as_ref()
                    .map_or(0, |mesh| mesh.triangle_count);
                let per_layer = source.checked_div(cut.settings.layer_count).unwrap_or(0);
                // Bounded by MAX_LAYER_COUNT per side.
                for layer in cut.layers.iter_mut().chain(fill.layers.iter_mut()) {
                    layer.triangle_count = per_layer;
                }
                data.cut = cut;
                data.fill = fill;
                data.preview_points = 0;
            }
            Self::PreviewComputed { resolution } => {
                data.preview_points = data.layer_count() * resolution as usize;
            }
            Self::DesignCreated => {
                data.design = Some(Design {
                    surface_id: data
                        .critical_surface
                        .as_ref()
                        .map(|surface| surface.surface_id.clone()),
                    layer_count: data.layer_count(),
                    preview_points: data.preview_points,
                });
            }
        }
    }
}

/// A simulated, steppable mesh-processing job.
#[derive(Debug, Clone)]
pub struct MeshJob {
    params: OperationParams,
    total_steps: u32,
    remaining: u32,
    step: Duration,
}

impl MeshJob {
    /// Build a job for `params` shaped by `work`.
    #[must_use]
    pub fn new(params: OperationParams, work: &WorkConfig) -> Self {
        Self {
            params,
            total_steps: work.steps,
            remaining: work.steps,
            step: work.step_duration(),
        }
    }

    fn finish(&self) -> MeshResult {
        match &self.params {
            OperationParams::LoadSurface { surface_id } => {
                let vertex_count = self.total_steps.max(1).saturating_mul(64);
                MeshResult::SurfaceLoaded {
                    surface: SurfaceData {
                        surface_id: surface_id.clone(),
                        vertex_count,
                    },
                    mesh: Mesh {
                        triangle_count: vertex_count.saturating_mul(2),
                    },
                }
            }
            OperationParams::UpdateLayers {
                layer_count,
                thickness_um,
            } => {
                // Sessions launched directly skip request validation.
                let layer_count = (*layer_count).min(MAX_LAYER_COUNT);
                let stack = LayerStack {
                    settings: LayerSettings {
                        layer_count,
                        thickness_um: *thickness_um,
                    },
                    layers: vec![Mesh::default(); layer_count as usize],
                };
                MeshResult::LayersUpdated {
                    cut: stack.clone(),
                    fill: stack,
                }
            }
            OperationParams::GetPreviewPoints { resolution } => MeshResult::PreviewComputed {
                resolution: *resolution,
            },
            OperationParams::CreateDesign => MeshResult::DesignCreated,
        }
    }
}

impl UnitOfWork for MeshJob {
    type Output = MeshResult;

    fn step(&mut self) -> Progress<Self::Output> {
        if self.remaining == 0 {
            return Progress::Done(self.finish());
        }
        thread::sleep(self.step);
        self.remaining -= 1;
        Progress::Continue
    }
}
