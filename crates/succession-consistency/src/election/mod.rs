//! Leader Election
//!
//! Every candidate creates one ephemeral-sequential node. The lowest sequence
//! number leads; every other candidate watches only the candidate directly
//! ahead of it, so a failure wakes exactly one successor.

mod callback;
mod model;
mod service;

pub use callback::*;
pub use model::*;
pub use service::*;
