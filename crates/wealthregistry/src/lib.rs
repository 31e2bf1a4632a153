//! wealthregistry: confidential comparison registry.
//!
//! Participants each submit one Paillier-encrypted amount. A comparison over
//! a list of participants runs an encrypted max-reduction and publishes only
//! the winner's address; neither the amounts nor any pairwise outcome are
//! ever decrypted.

mod address;
mod config;
mod errors;
mod registry;

pub use address::{Address, Caller, ADDRESS_LEN};
pub use config::RegistryConfig;
pub use errors::{RegistryError, Result};
pub use registry::ComparisonRegistry;
