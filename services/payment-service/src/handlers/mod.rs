pub mod admin_handler;
pub mod payment_handler;
pub mod stripe_gateway;
pub mod webhook_handler;
