//! Hybrid Composer
//!
//! Joins a caller-written native fragment with a compiled generic filter.
//! Fragments stay opaque; the composer only ever conjoins them.

use crate::engine::backend::SqlFilter;
use crate::engine::error::Result;
use crate::engine::model::BackendModelDescriptor;

/// A backend's native filter form
pub trait NativeExpression: Sized {
    /// Matches every entity of `model`
    fn always_true(model: &BackendModelDescriptor) -> Result<Self>;

    /// Conjunction; both sides must target the same container
    fn and(self, other: Self) -> Result<Self>;
}

impl NativeExpression for SqlFilter {
    fn always_true(model: &BackendModelDescriptor) -> Result<Self> {
        SqlFilter::all(model)
    }

    fn and(self, other: Self) -> Result<Self> {
        SqlFilter::and(self, other)
    }
}

/// `native AND generic`; either side passes through alone, and neither
/// side means everything
pub fn compose<E: NativeExpression>(
    native: Option<E>,
    generic: Option<E>,
    model: &BackendModelDescriptor,
) -> Result<E> {
    match (native, generic) {
        (Some(native), Some(generic)) => native.and(generic),
        (Some(native), None) => Ok(native),
        (None, Some(generic)) => Ok(generic),
        (None, None) => E::always_true(model),
    }
}
