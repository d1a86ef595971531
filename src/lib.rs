//! Compiles a declarative domain topology into an orchestration file tree.
//!
//! An operator describes isolated network domains, the machines inside
//! them, and cross-cutting policies (addressing, resource budgets, shared
//! storage, network exceptions) in one structured document. This crate
//! expands that document into `inventory/`, `group_vars/`, and `host_vars/`
//! files that an external orchestration engine consumes directly.
//!
//! # Pipeline
//!
//! ```text
//! document (file or fragment dir)
//!     |  load + merge
//!     v
//! validate -> allocate addresses -> distribute resources -> resolve
//!                                                              |
//!                                  write plan <- render <------+
//!                                      |
//!                                      v
//!                        apply (atomic per file) + orphan report
//! ```
//!
//! Stages before rendering are pure; only plan application touches the
//! filesystem, and it runs only after every earlier stage succeeded for the
//! whole document. Re-running on an unchanged document is a byte-for-byte
//! no-op, and operator edits outside the managed region of a generated file
//! are never touched.

pub mod allocate;
pub mod document;
pub mod errors;
pub mod generate;
pub mod orphan;
pub mod render;
pub mod resolve;
pub mod resources;
pub mod validate;

pub use document::{Document, Domain, Machine, TrustLevel};
pub use errors::GenerateError;
pub use generate::{generate, GenerateOptions, GenerateReport};
