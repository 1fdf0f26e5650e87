//! Credit purchases: payment-intent creation and the signed webhook that
//! fulfills them exactly once.

pub mod handlers;
pub mod signature;
pub mod stripe;
