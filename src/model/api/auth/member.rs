use crate::model::common::identity::Role;

/// Which roles a route admits. Used as the type parameter of
/// [`AuthToken`](super::AuthToken).
pub trait Member {
    /// Human-readable description for rejection messages.
    const DESCRIPTION: &'static str;

    fn admits(role: Role) -> bool;
}

/// Routes only voters may call.
#[derive(Debug)]
pub struct Voter;

/// Routes only election committee members may call.
#[derive(Debug)]
pub struct Committee;

/// Routes open to any authenticated caller.
#[derive(Debug)]
pub struct AnyRole;

impl Member for Voter {
    const DESCRIPTION: &'static str = "voters";

    fn admits(role: Role) -> bool {
        role == Role::Voter
    }
}

impl Member for Committee {
    const DESCRIPTION: &'static str = "committee members";

    fn admits(role: Role) -> bool {
        role == Role::Committee
    }
}

impl Member for AnyRole {
    const DESCRIPTION: &'static str = "authenticated users";

    fn admits(_role: Role) -> bool {
        true
    }
}
