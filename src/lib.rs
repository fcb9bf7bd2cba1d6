pub mod abi;

pub mod client;

pub mod contract;

pub mod error;

pub mod events;

pub mod provider;

pub mod session;

pub mod test_helpers;

pub mod tracker;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
