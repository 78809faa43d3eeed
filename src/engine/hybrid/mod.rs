//! Hybrid Module
//!
//! Native fragments composed with generic filters, and the translator
//! facade that drives every backend from one entry point.

pub mod composer;
pub mod translator;

pub use composer::{compose, NativeExpression};
pub use translator::{CompiledFilter, CompiledUpdate, Translator};
