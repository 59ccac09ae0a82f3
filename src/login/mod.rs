//! Login stage: the authentication surface and the handoff to MainStage.

pub mod keyboard;
pub mod stage;
pub mod surface;
