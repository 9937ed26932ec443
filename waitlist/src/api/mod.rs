//! HTTP handlers, grouped by resource.
//!
//! - [`waitlist`]: admission, count and lookup
//! - [`artifacts`]: identity card and certificate downloads
//! - [`admin`]: certificate sweep

pub mod admin;
pub mod artifacts;
pub mod waitlist;
