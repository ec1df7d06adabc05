mod rights;
mod token;

pub use rights::{Admin, Rights, Role, Voter};
pub use token::AuthToken;
