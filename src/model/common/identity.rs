use std::fmt;

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// The opaque subject of an authenticated identity, as issued by the
/// external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&SubjectId> for Bson {
    fn from(subject: &SubjectId) -> Self {
        Bson::String(subject.0.clone())
    }
}

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Voter,
    Committee,
}

impl fmt::Display for Role {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Committee => "committee",
            }
        )
    }
}

/// A resolved, already-authenticated identity. Every core operation takes
/// one of these explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: SubjectId,
    pub role: Role,
}

impl Identity {
    pub fn voter(subject: impl Into<String>) -> Self {
        Self {
            subject: SubjectId::new(subject),
            role: Role::Voter,
        }
    }

    pub fn committee(subject: impl Into<String>) -> Self {
        Self {
            subject: SubjectId::new(subject),
            role: Role::Committee,
        }
    }
}
