use devirt_core::error::Error;
use devirt_core::span::Span;

/// Create a type error for the lowering with a specific span
pub fn lowering_error(message: impl Into<String>, span: Span) -> Error {
    let error = Error::type_mismatch(message, span);
    tracing::debug!("lowering error: {}", error);
    error
}

/// Macro to return early with a lowering error
#[macro_export]
macro_rules! lower_bail {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::error::lowering_error(format!($($arg)*), $span))
    };
}

/// Macro to ensure a condition is true, or return a lowering error
#[macro_export]
macro_rules! lower_ensure {
    ($cond:expr, $span:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::lower_bail!($span, $($arg)*);
        }
    };
}
