use crate::error::{PolicyError, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Segment validation
// ---------------------------------------------------------------------------

static SEGMENT_RE: OnceLock<Regex> = OnceLock::new();

fn segment_re() -> &'static Regex {
    SEGMENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").unwrap())
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty() && s.len() <= 100 && segment_re().is_match(s)
}

// ---------------------------------------------------------------------------
// StackIdentity
// ---------------------------------------------------------------------------

/// Unique key of a managed stack: `organization/project/stack`.
///
/// Fields are private so an identity can only be built through [`StackIdentity::new`]
/// or parsing, both of which validate every segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackIdentity {
    organization: String,
    project: String,
    stack: String,
}

impl StackIdentity {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        stack: impl Into<String>,
    ) -> Result<Self> {
        let id = Self {
            organization: organization.into(),
            project: project.into(),
            stack: stack.into(),
        };
        if [&id.organization, &id.project, &id.stack]
            .iter()
            .all(|s| valid_segment(s))
        {
            Ok(id)
        } else {
            Err(PolicyError::InvalidIdentity(id.to_string()))
        }
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Same organization and project, different stack name.
    pub fn sibling(&self, stack: &str) -> Result<Self> {
        Self::new(self.organization.clone(), self.project.clone(), stack)
    }

    /// Whether the stack name marks a review (pull-request preview) stack.
    ///
    /// `pattern` may contain `{org}` and `{project}` placeholders; the stack
    /// is a review stack when its name contains the substituted pattern.
    pub fn is_review_stack(&self, pattern: &str) -> bool {
        let needle = pattern
            .replace("{org}", &self.organization)
            .replace("{project}", &self.project);
        !needle.is_empty() && self.stack.contains(&needle)
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.project, self.stack)
    }
}

impl FromStr for StackIdentity {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(org), Some(project), Some(stack), None) => Self::new(org, project, stack)
                .map_err(|_| PolicyError::InvalidIdentity(s.to_string())),
            _ => Err(PolicyError::InvalidIdentity(s.to_string())),
        }
    }
}

impl Serialize for StackIdentity {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StackIdentity {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
