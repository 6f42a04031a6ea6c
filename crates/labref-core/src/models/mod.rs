//! Domain models for the lab reference engine.

mod knowledge;
mod measurement;
mod result;

pub use knowledge::*;
pub use measurement::*;
pub use result::*;
