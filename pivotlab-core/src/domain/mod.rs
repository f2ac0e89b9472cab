//! Domain types for PivotLab

pub mod bar;
pub mod direction;

pub use bar::{Bar, MarkedBar};
pub use direction::Direction;
