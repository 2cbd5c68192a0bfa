pub mod auth;
pub mod election;
pub mod tally;
pub mod vote;
