use std::fmt;

use mongodb::bson::Bson;
use rocket::form::FromFormField;
use serde::{Deserialize, Serialize};

/// States in the election lifecycle.
///
/// The only legal moves are `Draft -> Open` and `Open -> Closed`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromFormField)]
pub enum ElectionState {
    /// Under construction, only visible to its owner. No votes accepted.
    Draft,
    /// Published; votes accepted while inside the voting window.
    Open,
    /// Explicitly finalised by the owner. Terminal.
    Closed,
}

impl ElectionState {
    /// Is `self -> target` a legal lifecycle move?
    pub fn can_transition_to(self, target: ElectionState) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Open) | (Self::Open, Self::Closed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Open => "Open",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        Bson::String(state.as_str().to_string())
    }
}
