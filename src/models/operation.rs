//! Named session operations and their completion payload.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::surface::StateSummary;
use crate::{AppError, Result};

/// Upper bound on layers generated per side by one update.
pub const MAX_LAYER_COUNT: u32 = 4096;

/// The asynchronous operations a session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Load the critical surface and mesh it.
    LoadSurface,
    /// Regenerate cut and fill layers.
    UpdateLayers,
    /// Compute preview points from the current layers.
    GetPreviewPoints,
    /// Assemble a design from the current state.
    CreateDesign,
}

impl OperationKind {
    /// Stable `snake_case` name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadSurface => "load_surface",
            Self::UpdateLayers => "update_layers",
            Self::GetPreviewPoints => "get_preview_points",
            Self::CreateDesign => "create_design",
        }
    }

    /// Whether the operation must not overlap another pending one.
    ///
    /// Every kind reads or writes the shared mesh state, so all of them
    /// are exclusive.
    #[must_use]
    pub fn requires_exclusivity(self) -> bool {
        match self {
            Self::LoadSurface | Self::UpdateLayers | Self::GetPreviewPoints | Self::CreateDesign => {
                true
            }
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request parameters for a session operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationParams {
    /// Parameters for [`OperationKind::LoadSurface`].
    LoadSurface {
        /// Surface to load.
        surface_id: String,
    },
    /// Parameters for [`OperationKind::UpdateLayers`].
    UpdateLayers {
        /// Layers to generate on each side.
        layer_count: u32,
        /// Layer thickness in micrometres.
        thickness_um: u32,
    },
    /// Parameters for [`OperationKind::GetPreviewPoints`].
    GetPreviewPoints {
        /// Points sampled per layer.
        resolution: u32,
    },
    /// Parameters for [`OperationKind::CreateDesign`].
    CreateDesign,
}

impl OperationParams {
    /// The operation these parameters are for.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::LoadSurface { .. } => OperationKind::LoadSurface,
            Self::UpdateLayers { .. } => OperationKind::UpdateLayers,
            Self::GetPreviewPoints { .. } => OperationKind::GetPreviewPoints,
            Self::CreateDesign => OperationKind::CreateDesign,
        }
    }

    /// Reject parameters the processing layer cannot honour.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` when `layer_count` exceeds
    /// [`MAX_LAYER_COUNT`].
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::UpdateLayers { layer_count, .. } if *layer_count > MAX_LAYER_COUNT => {
                Err(AppError::Protocol(format!(
                    "layer count {layer_count} exceeds limit of {MAX_LAYER_COUNT}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Delivered to a completion callback when an operation finishes uncancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Completion {
    /// Session that ran the operation.
    pub session_id: Uuid,
    /// Operation identifier returned at launch.
    pub operation_id: Uuid,
    /// Operation kind.
    pub kind: OperationKind,
    /// When the result was committed.
    pub completed_at: DateTime<Utc>,
    /// Session state immediately after the commit.
    pub state: StateSummary,
}
