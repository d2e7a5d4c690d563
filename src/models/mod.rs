//! Domain model module declarations.

pub mod operation;
pub mod surface;
