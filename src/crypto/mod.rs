//! Cryptographic helpers shared by the handoff codec and day tokens.
//!
//! Authenticated symmetric encryption, keyed lookup hashes, and the
//! calendar-day token derivation.

pub mod clock;
pub mod cryptor;
pub mod error;

pub use clock::SystemClock;
pub use cryptor::Cryptor;
pub use error::CryptoError;

#[cfg(test)]
pub use clock::FixedClock;
