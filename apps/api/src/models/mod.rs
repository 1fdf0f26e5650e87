pub mod analysis;
pub mod purchase;
pub mod user;
