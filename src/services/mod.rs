//! External collaborators
//!
//! The image generation provider and the object store are managed services
//! outside this repository; the traits here are the seams the gateway
//! consumes them through, plus the randomness source behind every minted
//! identifier.

pub mod images;
pub mod objects;
pub mod tokens;

pub use images::{HttpImageGenerator, ImageGenerator, StubImageGenerator};
pub use objects::{strong_etag, MemoryObjectStore, ObjectStore, StoredObject};
pub use tokens::{SystemTokenSource, TokenSource};
