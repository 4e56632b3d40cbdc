//! Data models exchanged between the handlers, the services and the stores.
//!
//! Request bodies deserialize from camelCase JSON; responses serialize back
//! the same way.

pub mod object;
pub mod resource;
pub mod signed_url;
pub mod upload;
