//! Commands pushed to connected browsers.

use std::fmt;

/// Instruction sent over a push channel.
///
/// The wire form is the plain string returned by [`Command::as_str`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Full navigation reload.
    Reload,
    /// Re-fetch stylesheets in place.
    ReloadCss,
}

impl Command {
    /// Wire representation of the command.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::ReloadCss => "reload-css",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
