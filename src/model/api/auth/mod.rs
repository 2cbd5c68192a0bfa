mod token;
mod user;

pub use token::{AuthFailure, AuthToken};
pub use user::{Admin, AnyUser, Rights, User, Voter};
