//! Cross-domain identity handoff.
//!
//! The auth site seals the IdP-asserted personal identifier into an
//! encrypted payload; the satellite opens it after checking the day token
//! that accompanies it.

pub mod codec;
pub mod identifier;
pub mod token;

pub use codec::HandoffCodec;
pub use identifier::{HashedIdentifier, PersonalIdentifier, PERSONAL_CODE_PREFIX};
pub use token::{DayTokenAuthenticator, TokenAuthority};
