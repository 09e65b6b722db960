//! Kiln Transform
//!
//! Values and contracts of a transform chain:
//!
//! - [`Subject`]: the immutable input or output of one transform step, with
//!   lineage ([`ArtifactId`], [`ScopeContext`]) or a recorded failure.
//! - [`Transformer`]: `(input file, output directory, dependencies) -> files`,
//!   identified by an [`IdentityHash`] and validated on every invocation.
//! - [`ArtifactDependencies`]: upstream dependency files, resolved lazily.
//! - Built-in actions used by the command line and tests.

mod builtin;
mod dependencies;
mod error;
mod identity;
mod subject;
mod transformer;

pub use builtin::{ChecksumAction, CopyAction, PassThroughAction, builtin_transformer};
pub use dependencies::{ArtifactDependencies, FixedDependencies, LazyDependencies, NoDependencies};
pub use error::TransformError;
pub use identity::{IdentityHash, to_canonical_json};
pub use subject::{ArtifactId, Failure, ScopeContext, Subject};
pub use transformer::{DefaultTransformer, TransformAction, Transformer, validate_outputs};
