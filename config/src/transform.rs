//! Composable single-argument string transforms used as decoder, decorator
//! and encoder.

use std::fmt;
use std::sync::Arc;

type TransformFn = dyn Fn(String) -> String + Send + Sync;

/// Shared, immutable `String -> String` function.
///
/// ```
/// use config::ValueTransform;
///
/// let trim = ValueTransform::new(|s| s.trim().to_string());
/// let upper = ValueTransform::new(|s| s.to_uppercase());
///
/// assert_eq!(trim.and_then(&upper).apply(" a ".to_string()), "A");
/// assert_eq!(trim.compose(&upper).apply(" a ".to_string()), "A");
/// ```
#[derive(Clone)]
pub struct ValueTransform {
    func: Option<Arc<TransformFn>>
}

impl ValueTransform {
    pub fn new(func: impl Fn(String) -> String + Send + Sync + 'static) -> Self {
        Self {
            func: Some(Arc::new(func))
        }
    }

    /// The transform returning its input unchanged.
    pub fn identity() -> Self {
        Self { func: None }
    }

    pub fn is_identity(&self) -> bool {
        self.func.is_none()
    }

    pub fn apply(&self, value: String) -> String {
        match &self.func {
            Some(func) => func(value),
            None => value
        }
    }

    /// `self` first, then `next`.
    pub fn and_then(&self, next: &ValueTransform) -> ValueTransform {
        match (&self.func, &next.func) {
            (None, _) => next.clone(),
            (_, None) => self.clone(),
            (Some(first), Some(second)) => {
                let (first, second) = (first.clone(), second.clone());
                Self::new(move |value| second(first(value)))
            }
        }
    }

    /// `before` first, then `self`.
    pub fn compose(&self, before: &ValueTransform) -> ValueTransform {
        before.and_then(self)
    }
}

impl Default for ValueTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identity() {
            f.write_str("ValueTransform(identity)")
        } else {
            f.write_str("ValueTransform(fn)")
        }
    }
}
