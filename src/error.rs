use thiserror::Error;

/// Builds an [`Error::StackCorruption`] tagged with the caller's source location.
///
/// Takes the same arguments as `format!`.
macro_rules! corruption_error {
    ($($arg:tt)+) => {
        crate::Error::StackCorruption {
            message: format!($($arg)+),
            file: file!(),
            line: line!(),
        }
    };
}

/// The error type for all coordinator operations.
///
/// Both variants are caller contract violations. Neither is transient, so nothing in this
/// crate retries. A predicate that fails is not an error of the coordinator: it simply
/// raises a new exception in the host, which flows through the same machinery.
///
/// # Examples
///
/// ```rust
/// use filterscope::{Error, FilterCoordinator, FilterRegistration};
///
/// let coordinator = FilterCoordinator::<str>::new();
/// let outer = FilterRegistration::<str>::when(|_| false);
/// let inner = FilterRegistration::<str>::when(|_| false);
/// coordinator.push(&outer);
/// coordinator.push(&inner);
///
/// match coordinator.pop(&outer) {
///     Err(Error::StackCorruption { message, .. }) => eprintln!("bad pairing: {message}"),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The push/pop pairing of the filter stack was violated.
    ///
    /// Raised when popping from an empty stack or when the registration being popped is
    /// not the top of the stack. This almost always means the code driving push/pop (a
    /// rewriting transform, or hand-written glue) lost track of its protected regions.
    /// The stack is left untouched.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated pairing
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Stack corruption - {file}:{line}: {message}")]
    StackCorruption {
        /// Description of the violated pairing
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An evaluation entry point was called with an argument that breaks its contract.
    ///
    /// The registration passed to `should_run_handler` must be on the calling thread's
    /// stack.
    #[error("Invalid argument - {0}")]
    InvalidArgument(String),
}
