//! Identity-domain identifiers, role sets, authenticated users, and credential models.

pub mod id;
pub mod role;
pub mod token;
pub mod user;

pub use id::*;
pub use role::*;
pub use token::{record::*, secret::*};
pub use user::*;
