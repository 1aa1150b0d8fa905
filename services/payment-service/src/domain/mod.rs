pub mod audit;
pub mod order;
pub mod payment;
pub mod refund;
