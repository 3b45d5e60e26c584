//! The election integrity core: lifecycle, ballot admission and tallying.
//!
//! Every operation takes the store and the acting [`Identity`] explicitly, and
//! takes the current time as an argument where it matters, so none of it
//! depends on ambient state.
//!
//! [`Identity`]: crate::model::common::identity::Identity

pub mod admission;
pub mod elections;
pub mod lifecycle;
pub mod tally;
