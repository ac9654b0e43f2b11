//! Result type definition and extension traits.
//!
//! Provides logging combinators for Result types so call sites can record a
//! failure and keep going without unwrap/expect.

use std::fmt::Display;

use crate::error::Error;

/// The standard Result type for redis-ctrl startup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Tap-style combinators for any Result whose error can be displayed.
pub trait ResultExt<T, E> {
    /// Perform a side effect on the Err value without consuming the Result.
    fn tap_err<F: FnOnce(&E)>(self, f: F) -> Self;

    /// Convert to an Option, logging the error if present.
    fn into_option_logged(self, what: &str) -> Option<T>;
}

impl<T, E: Display> ResultExt<T, E> for std::result::Result<T, E> {
    fn tap_err<F: FnOnce(&E)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }

    fn into_option_logged(self, what: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(error = %e, "{what} failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_err() {
        let mut observed = String::new();
        let result: std::result::Result<i32, &str> = Err("error");
        let _ = result.tap_err(|e| observed = (*e).to_string());
        assert_eq!(observed, "error");
    }

    #[test]
    fn test_into_option_logged() {
        let ok: Result<i32> = Ok(7);
        assert_eq!(ok.into_option_logged("lookup"), Some(7));

        let err: Result<i32> = Err(Error::invalid_entry("x", "bad"));
        assert_eq!(err.into_option_logged("lookup"), None);
    }
}
