// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compiler configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};

/// Placeholder in [`CompilerConfig::stamp_template`] replaced by a pathname
pub const PATHNAME_PLACEHOLDER: &str = "{pathname}";

/// Configuration for a [`Compiler`](crate::Compiler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Absolute, `/`-terminated prefix every canonical id is relative to
    pub base: String,

    /// Module-declaration call rewritten in the entry header
    pub header_callee: String,

    /// Cache-busting suffix appended to dependency ids; empty disables it
    pub stamp_template: String,

    /// File name of package descriptors
    pub descriptor_name: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            base: "/".to_string(),
            header_callee: "define".to_string(),
            stamp_template: format!("?t=#ts(\"{}\")", PATHNAME_PLACEHOLDER),
            descriptor_name: "package.json".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Default configuration rooted at `base`
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file; absent fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CompileError::Io {
            pathname: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&content)
            .map_err(|e| CompileError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// Replace the header callee
    pub fn with_header_callee(mut self, callee: impl Into<String>) -> Self {
        self.header_callee = callee.into();
        self
    }

    /// Replace the stamp template
    pub fn with_stamp_template(mut self, template: impl Into<String>) -> Self {
        self.stamp_template = template.into();
        self
    }

    /// Check the configuration, adding a missing trailing `/` to `base`
    pub fn validate(mut self) -> Result<Self> {
        if !self.base.starts_with('/') {
            return Err(CompileError::InvalidConfig(format!(
                "base must be an absolute path, got '{}'",
                self.base
            )));
        }
        if !self.base.ends_with('/') {
            self.base.push('/');
        }

        let callee_ok = !self.header_callee.is_empty()
            && self
                .header_callee
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if !callee_ok {
            return Err(CompileError::InvalidConfig(format!(
                "header callee must be an identifier, got '{}'",
                self.header_callee
            )));
        }

        if self.descriptor_name.is_empty() || self.descriptor_name.contains('/') {
            return Err(CompileError::InvalidConfig(format!(
                "descriptor name must be a file name, got '{}'",
                self.descriptor_name
            )));
        }

        Ok(self)
    }

    /// Cache-busting suffix for a dependency pathname
    pub fn stamp(&self, pathname: &str) -> String {
        self.stamp_template.replace(PATHNAME_PLACEHOLDER, pathname)
    }
}
