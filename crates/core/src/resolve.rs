//! Layered parameter resolution.
//!
//! Template parameters are looked up in a fixed order of layers (explicit
//! parameter, variant preset, template configuration) before falling back to
//! a hard-coded default. Every field goes through [`resolve`] so the
//! precedence is defined in exactly one place.

/// Return the first present layer, or `fallback` if every layer is absent.
///
/// Layers are evaluated in order; the first `Some` wins even if it holds a
/// "zero" value such as `0` or `""`.
pub fn resolve<T>(layers: impl IntoIterator<Item = Option<T>>, fallback: T) -> T {
    first_present(layers).unwrap_or(fallback)
}

/// Return the first present layer, if any.
pub fn first_present<T>(layers: impl IntoIterator<Item = Option<T>>) -> Option<T> {
    layers.into_iter().flatten().next()
}
