pub mod credentials;
pub mod token;

pub use credentials::{hash_pin, verify_pin, CredentialError};
pub use token::{Claims, TokenService};
