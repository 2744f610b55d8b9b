//! Shared building blocks
//!
//! Only the math layer lives here for now: nalgebra aliases, [`math::Transform`] and
//! the projection helpers the camera uses.

pub mod math;
