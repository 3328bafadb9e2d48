pub mod account;

pub use account::{generate_api_key, AccountRecord, DEFAULT_TIER};
