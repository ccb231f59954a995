use std::fmt;

/// Severity of a [`super::Diagnostic`].
///
/// The compiler only ever constructs `Level::Error` — this language has no
/// concept of a warning — but the enum keeps the other variants so a
/// future lint pass can reuse the same renderer without a breaking change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "ERROR"),
            Level::Warning => write!(f, "WARNING"),
            Level::Note => write!(f, "NOTE"),
            Level::Help => write!(f, "HELP"),
        }
    }
}
