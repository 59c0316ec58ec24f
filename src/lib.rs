//! bookwish application library
//!
//! The wishlist module plus the bootstrap shared by the server binary and
//! `bookwish-cli`.

pub mod bootstrap;
pub mod modules;
pub mod utils;

pub use bootstrap::{migrate, open_store, run};
