//! Presentation layer binding display targets to loaded images.

pub mod binding;

pub use binding::{Delivery, TargetBindings};
