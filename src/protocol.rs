//! Line-oriented request surface and JSON-line response surface.
//!
//! ## Requests
//!
//! One command per line. The first token is a command letter (or its long
//! name); remaining tokens are optional arguments:
//!
//! ```text
//! b                      begin a new session
//! e                      end the current session
//! l [surface_id]         load surface
//! u [layers] [thick_um]  update layers (at most 4096 per side)
//! g [resolution]         get preview points
//! c                      create design
//! h                      print usage
//! q                      quit
//! ```
//!
//! ## Responses
//!
//! ```json
//! {"request_id": 3, "ok": true, "message": "load_surface completed", "data": { ... }, "at": "..."}
//! {"request_id": 4, "ok": false, "error": "no active session", "at": "..."}
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::operation::OperationParams;
use crate::{AppError, Result};

/// Surface loaded when `l` is given no argument.
pub const DEFAULT_SURFACE_ID: &str = "surface-42";
/// Layers generated per side when `u` is given no argument.
pub const DEFAULT_LAYER_COUNT: u32 = 10;
/// Layer thickness when `u` is given no second argument.
pub const DEFAULT_THICKNESS_UM: u32 = 250;
/// Preview resolution when `g` is given no argument.
pub const DEFAULT_RESOLUTION: u32 = 8;

/// Human-readable command reference.
pub const USAGE: &str = "\
Usage: enter a command letter, followed by <Enter>
  'b'                     -> Begin a new session
  'e'                     -> End current session
  'l [surface_id]'        -> Load surface
  'u [layers] [thick_um]' -> Update layers
  'g [resolution]'        -> Get preview points
  'c'                     -> Create design
  'h'                     -> Print this help message
  'q'                     -> Quit";

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Start a session, replacing the current one.
    BeginSession,
    /// End the current session.
    EndSession,
    /// Run an operation on the current session.
    Operation(OperationParams),
    /// Print usage.
    Help,
    /// Stop the control loop.
    Quit,
}

impl Request {
    /// Parse one request line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` for empty lines, unknown commands,
    /// non-numeric arguments, surplus arguments, or operation parameters
    /// out of range (see [`OperationParams::validate`]).
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let command = tokens
            .next()
            .ok_or_else(|| AppError::Protocol("empty request".into()))?;
        let args: Vec<&str> = tokens.collect();

        let (request, max_args) = match command {
            "b" | "begin" => (Self::BeginSession, 0),
            "e" | "end" => (Self::EndSession, 0),
            "l" | "load" => (
                Self::Operation(OperationParams::LoadSurface {
                    surface_id: args
                        .first()
                        .map_or_else(|| DEFAULT_SURFACE_ID.to_owned(), |s| (*s).to_owned()),
                }),
                1,
            ),
            "u" | "update" => (
                Self::Operation(OperationParams::UpdateLayers {
                    layer_count: numeric_arg(&args, 0, DEFAULT_LAYER_COUNT)?,
                    thickness_um: numeric_arg(&args, 1, DEFAULT_THICKNESS_UM)?,
                }),
                2,
            ),
            "g" | "preview" => (
                Self::Operation(OperationParams::GetPreviewPoints {
                    resolution: numeric_arg(&args, 0, DEFAULT_RESOLUTION)?,
                }),
                1,
            ),
            "c" | "create" => (Self::Operation(OperationParams::CreateDesign), 0),
            "h" | "help" => (Self::Help, 0),
            "q" | "quit" => (Self::Quit, 0),
            other => return Err(AppError::Protocol(format!("unknown command '{other}'"))),
        };

        if args.len() > max_args {
            return Err(AppError::Protocol(format!(
                "'{command}' takes at most {max_args} argument(s)"
            )));
        }
        if let Self::Operation(params) = &request {
            params.validate()?;
        }
        Ok(request)
    }
}

fn numeric_arg(args: &[&str], index: usize, default: u32) -> Result<u32> {
    args.get(index).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|err| AppError::Protocol(format!("invalid number '{raw}': {err}")))
    })
}

/// Outbound response keyed to the originating request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Sequence number of the request this answers.
    pub request_id: u64,
    /// Whether the request succeeded.
    pub ok: bool,
    /// Human-readable outcome on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the response was produced.
    pub at: DateTime<Utc>,
}

impl Response {
    /// Successful response.
    #[must_use]
    pub fn success(
        request_id: u64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            request_id,
            ok: true,
            message: Some(message.into()),
            data,
            error: None,
            at: Utc::now(),
        }
    }

    /// Failed response carrying `err`'s display text.
    #[must_use]
    pub fn failure(request_id: u64, err: &AppError) -> Self {
        Self {
            request_id,
            ok: false,
            message: None,
            data: None,
            error: Some(err.to_string()),
            at: Utc::now(),
        }
    }

    /// Serialize as one newline-terminated JSON line.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"request_id":{},"ok":false,"error":"serialization failed"}}"#,
                self.request_id
            )
        });
        line.push('\n');
        line
    }
}
