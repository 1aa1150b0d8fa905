pub mod jwt;
pub mod notify;
