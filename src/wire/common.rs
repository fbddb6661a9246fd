//! Shared wire-format helpers.

use crate::error::{AcmeError, AcmeErrorKind};

/// Serde `skip_serializing_if` helper for plain `bool` fields.
pub(crate) fn is_false(value: &bool) -> bool {
    !value
}

/// A resource status that can represent terminal failure.
pub trait ResourceStatus: std::fmt::Debug + Copy + Eq {
    fn is_failure(&self) -> bool;

    fn as_result(&self, detail: impl Into<String>) -> Result<Self, AcmeError>
    where
        Self: Sized,
    {
        if self.is_failure() {
            Err(AcmeError::new(AcmeErrorKind::Malformed, detail))
        } else {
            Ok(*self)
        }
    }
}

/// A resource whose JSON representation carries its canonical URL only via
/// the `Location` response header, not a body field.
pub trait LocationResource {
    fn location_mut(&mut self) -> &mut Option<String>;
}
