pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod giftcode;
pub mod intake;
pub mod order;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod types;

pub use error::{CoreError, Result};
