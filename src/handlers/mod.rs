//! HTTP handlers. Each route validates its input, calls into `services`, and
//! maps failures through [`crate::errors::AppError`].

pub mod access_handlers;
pub mod content_handlers;
pub mod extract;
pub mod health_handlers;
pub mod local_object_handlers;
pub mod shaper;
pub mod signed_url_handlers;
pub mod upload_handlers;
