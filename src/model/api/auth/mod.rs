mod member;
mod token;

pub use member::{AnyRole, Committee, Member, Voter};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
