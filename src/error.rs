use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! internal_fault {
    ($msg:expr) => {
        crate::Error::InternalFault {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InternalFault {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure modes of building the entity graph and emitting the final
/// PE image. Errors are never recovered from internally: the emitted file's offsets and
/// sizes are derived globally, so a half-built image cannot be patched into consistency.
/// Any error aborts the whole emission.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - The caller-supplied entity graph or operand is invalid
/// - [`Error::NotSupported`] - A deliberately-unsupported feature was requested
/// - [`Error::Empty`] - Empty input provided where content was required
///
/// ## Internal Errors
/// - [`Error::InternalFault`] - An internal invariant was violated; there is no recovery
/// - [`Error::OutOfBounds`] - An out-of-bounds buffer access was attempted while writing
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors, propagated unchanged
#[derive(Error, Debug)]
pub enum Error {
    /// The input entity graph or an operand is invalid.
    ///
    /// Raised immediately where the malformation is detected - invalid values are
    /// never silently corrected. The error includes the source location where the
    /// malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This feature is deliberately not supported.
    ///
    /// Some legacy input forms (e.g. XML permission-set synthesis) are rejected up
    /// front rather than risking silently-wrong bytes in the output image.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// An internal invariant was violated.
    ///
    /// Examples: serializing an element through the wrong coded-index category,
    /// sorting a table row that declares no sort key, or a size fixed point that
    /// fails to converge. There is no recovery - a half-built metadata image is
    /// useless.
    #[error("Internal fault - {file}:{line}: {message}")]
    InternalFault {
        /// Description of the violated invariant
        message: String,
        /// The source file in which the fault was detected
        file: &'static str,
        /// The source line in which the fault was detected
        line: u32,
    },

    /// An out of bound access was attempted while writing the image.
    ///
    /// A safety check to prevent buffer overruns during serialization.
    #[error("Out of Bound access would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while writing the image to disk.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    #[test]
    fn malformed_macro_carries_location() {
        let err = malformed_error!("bad {}", "input");
        match err {
            crate::Error::Malformed { message, file, .. } => {
                assert_eq!(message, "bad input");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("expected Malformed"),
        }
    }

    #[test]
    fn internal_fault_macro_carries_location() {
        let err = internal_fault!("fixed point did not converge");
        match err {
            crate::Error::InternalFault { message, .. } => {
                assert_eq!(message, "fixed point did not converge");
            }
            _ => panic!("expected InternalFault"),
        }
    }
}
