pub mod checkout;
pub mod giftcodes;
pub mod orders;
pub mod products;
pub mod sessions;
