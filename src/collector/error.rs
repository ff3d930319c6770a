use super::procfs::ParseError;

/// Error type for sampling failures.
///
/// A probe returning one of these keeps its previous values for the
/// interval; the orchestrator logs it and moves on.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error reading a source file.
    Io(std::io::Error),
    /// Parse error in a source file.
    Parse(String),
    /// An external helper (nvidia-smi, pstree, lscpu) failed.
    Command(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
            CollectError::Command(msg) => write!(f, "command failed: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}
