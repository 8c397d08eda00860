//! Local accounts, lookup by hashed identifier and the delegated-login flag.

pub mod local;
pub mod store;
pub mod types;

pub use local::LocalDirectory;
pub use store::AccountStore;
pub use types::{Account, CurrentUser, Directory, SessionFlags, SessionGrant};
