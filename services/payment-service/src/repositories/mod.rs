pub mod audit_repo;
pub mod order_repo;
pub mod payment_repo;
pub mod refund_repo;
