// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # smc-compiler
//!
//! Static compiler for CMD-style JavaScript modules.
//!
//! Given an entry module, the compiler walks its synchronous `require`
//! graph and produces output whose declaration header lists every
//! transitive dependency in load order:
//!
//! - Ids are normalized into a canonical `#`-prefixed form
//! - Aliases come from the nearest `package.json` above each file
//! - Versioned references (`lib/x/1.0.0+/x`) are pinned against the
//!   constraints declared along the chain of importers
//! - Cycles and incompatible constraints are reported with their full chain
//! - Compiled files are cached for the life of the [`Compiler`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use smc_compiler::{Compiler, CompilerConfig, FsLoader};
//!
//! #[tokio::main]
//! async fn main() -> smc_compiler::Result<()> {
//!     let loader = Arc::new(FsLoader::new("/"));
//!     let compiler = Compiler::new(CompilerConfig::new("/srv/js/"), loader)?;
//!     if let Some(module) = compiler.compile("#app/main").await? {
//!         println!("{}", module.code);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod config;
pub mod error;
pub mod loader;
pub mod output;
pub mod package;
pub mod path;
pub mod rewrite;
pub mod trace;
pub mod version;

// Re-exports
pub use compiler::{CompiledFile, CompiledModule, Compiler, Dependency};
pub use config::CompilerConfig;
pub use error::{CompileError, ConstraintSite, Result};
pub use loader::{FileLoader, FsLoader, MemoryLoader};
pub use package::{PackageScope, PackageScopeResolver};
pub use trace::{Trace, TraceFrame};
pub use version::{Constraint, Direction};

/// Version of the compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
