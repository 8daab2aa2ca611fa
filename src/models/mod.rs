pub mod relation;
pub mod restaurant;
pub mod user;
