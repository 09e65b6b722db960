//! Kiln Config
//!
//! This crate contains the serializable configuration types for kiln.
//!
//! - [`KilnConfig`] carries executor settings: worker parallelism, the
//!   transform timeout budget, build cache and data directory locations.
//! - [`ChainDef`] describes a transform chain to run from the command line:
//!   a list of input files and the ordered transform steps applied to each.
//!
//! Both are plain JSON documents. The execution crates take these values and
//! build their runtime structures from them; nothing here performs work.

mod chain;
mod error;
mod settings;

pub use chain::{ChainDef, InputDef, StepDef};
pub use error::ConfigError;
pub use settings::{BuildCacheConfig, KilnConfig};
