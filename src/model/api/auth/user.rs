use serde::{Deserialize, Serialize};

/// What the bearer of a token is allowed to do.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rights {
    Voter,
    Admin,
}

/// A kind of caller a route can require.
pub trait User {
    /// The token rights this kind of caller may present.
    const ACCEPTS: &'static [Rights];
}

/// A voter: may cast votes and read elections.
pub struct Voter;

impl User for Voter {
    const ACCEPTS: &'static [Rights] = &[Rights::Voter];
}

/// An administrator: may manage elections and read results.
pub struct Admin;

impl User for Admin {
    const ACCEPTS: &'static [Rights] = &[Rights::Admin];
}

/// Anyone holding a valid token.
pub struct AnyUser;

impl User for AnyUser {
    const ACCEPTS: &'static [Rights] = &[Rights::Voter, Rights::Admin];
}
