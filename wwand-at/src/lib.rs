//! AT protocol engine for 3GPP TS 27.007 modems.
//!
//! A [`CommandTable`] of named command descriptors, a [`Dispatcher`] that
//! matches an asynchronous byte stream against them, and a pure error
//! classifier mapping raw error text onto the CME/CMS taxonomy.

pub mod classify;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod urc;

pub use classify::classify;
pub use command::{CommandPatch, CommandSpec, CommandTable};
pub use dispatcher::{AtMatch, Dispatcher};
pub use error::{AtError, CmeError, CmsError};
pub use urc::{Bearer, BearerBucket, Urc};
