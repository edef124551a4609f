use std::fmt;

/// Management API access token, injected explicitly by the caller.
///
/// `Absent` is a legitimate state: requests still go out without an
/// `Authorization` header and the remote 401/403 is reported as a skipped
/// step rather than a local failure.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AccessToken {
    Present(String),
    #[default]
    Absent,
}

impl AccessToken {
    /// Blank or whitespace-only values count as absent.
    pub fn from_option(value: Option<String>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Self::Present(v.trim().to_string()),
            _ => Self::Absent,
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }

    /// First present token wins.
    pub fn or(self, other: AccessToken) -> AccessToken {
        match self {
            Self::Present(_) => self,
            Self::Absent => other,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(_) => f.write_str("AccessToken::Present(<redacted>)"),
            Self::Absent => f.write_str("AccessToken::Absent"),
        }
    }
}
