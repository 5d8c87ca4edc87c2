// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module compiler

use std::fmt;
use thiserror::Error;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors that abort a compile request
#[derive(Debug, Error)]
pub enum CompileError {
    /// The loader could not find the file
    #[error("Cannot find file '{0}'")]
    NotFound(String),

    /// Any other loader failure
    #[error("Failed to load '{pathname}': {source}")]
    Io {
        /// Pathname being loaded
        pathname: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A package descriptor was found but could not be parsed
    #[error("Malformed package descriptor '{pathname}': {source}")]
    MalformedDescriptor {
        /// Pathname of the descriptor
        pathname: String,
        /// Parse error
        #[source]
        source: serde_json::Error,
    },

    /// A pathname reappeared in the active trace
    #[error("Circular dependencies found: {}", .cycle.join(" -> "))]
    CircularDependency {
        /// Ancestor chain ending at the repeated file
        cycle: Vec<String>,
    },

    /// The ambient constraints for a prefix have an empty intersection
    #[error("Version of \"{prefix}\" conflicts: {}", ConstraintChain(.chain))]
    VersionConflict {
        /// Versioned prefix the constraints apply to
        prefix: String,
        /// Every ancestor in the trace with its declared constraint
        chain: Vec<ConstraintSite>,
    },

    /// A version segment that cannot be represented
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// A relative reference escaped the configured base
    #[error("Reference '{reference}' in '{pathname}' resolves outside the base")]
    OutsideBase {
        /// Reference as written
        reference: String,
        /// File containing the reference
        pathname: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

impl CompileError {
    /// Whether this is a loader "not found" failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, CompileError::NotFound(_))
    }
}

/// One ancestor's declared constraint, as reported in a conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSite {
    /// Pathname of the ancestor
    pub pathname: String,
    /// Its declared constraint for the prefix, if any
    pub constraint: Option<String>,
}

struct ConstraintChain<'a>(&'a [ConstraintSite]);

impl fmt::Display for ConstraintChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, site) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(
                f,
                "{}({})",
                site.pathname,
                site.constraint.as_deref().unwrap_or("*")
            )?;
        }
        Ok(())
    }
}
