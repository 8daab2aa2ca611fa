pub mod auth;
pub mod circles;
pub mod health;
pub mod restaurants;
pub mod users;
