// Shared test infrastructure: an in-memory implementation of every
// repository trait plus builders for agencies, plans and wired services.
//
// Usage from a test crate:
//   #[path = "../helpers/mod.rs"]
//   mod helpers;
//   use helpers::*;

#![allow(dead_code)]


pub use fixtures::*;
pub use memory_store::*;
