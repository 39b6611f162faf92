pub mod adapter;
pub mod idpay;
pub mod payping;
pub mod registry;
pub mod signature;
pub mod zarinpal;
