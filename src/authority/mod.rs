//! Reference configuration authority.
//!
//! # Responsibilities
//! - Serve section documents from a directory (`<section>.config`)
//! - Answer poll requests with the sections that are newer than what the
//!   client holds, each with a download URL
//!
//! # Data Flow
//! ```text
//! POST /sections/poll  (RemoteSectionCollection, client versions)
//!     → handlers.rs reads the version header of each matching file
//!     → response lists sections with a newer minor (or another major)
//!
//! GET /sections/{name}
//!     → document text, byte for byte
//! ```

pub mod handlers;
pub mod server;

pub use handlers::{AuthorityError, AuthorityState};
pub use server::{router, serve};
