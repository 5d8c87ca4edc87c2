// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! File loading capability
//!
//! The compiler never touches storage itself. Every read of a module or a
//! package descriptor goes through a [`FileLoader`], which must be idempotent
//! and safe to call repeatedly for the same pathname.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use crate::error::{CompileError, Result};

/// Source of raw file text
#[async_trait]
pub trait FileLoader: Send + Sync {
    /// Load the text at `pathname`, failing with [`CompileError::NotFound`]
    /// when nothing is there.
    async fn load(&self, pathname: &str) -> Result<String>;
}

/// Loads pathnames from a directory on disk
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    /// Map pathnames onto files below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, pathname: &str) -> PathBuf {
        self.root.join(pathname.trim_start_matches('/'))
    }
}

#[async_trait]
impl FileLoader for FsLoader {
    async fn load(&self, pathname: &str) -> Result<String> {
        let path = self.locate(pathname);
        trace!("Reading {}", path.display());

        tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => CompileError::NotFound(pathname.to_string()),
            _ => CompileError::Io {
                pathname: pathname.to_string(),
                source: e,
            },
        })
    }
}

/// In-memory file set
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: DashMap<String, String>,
    loads: DashMap<String, usize>,
}

impl MemoryLoader {
    /// Create an empty file set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, builder style
    pub fn with_file(self, pathname: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(pathname, text);
        self
    }

    /// Add or replace a file
    pub fn insert(&self, pathname: impl Into<String>, text: impl Into<String>) {
        self.files.insert(pathname.into(), text.into());
    }

    /// How many times `pathname` was requested, found or not
    pub fn load_count(&self, pathname: &str) -> usize {
        self.loads.get(pathname).map_or(0, |count| *count)
    }
}

#[async_trait]
impl FileLoader for MemoryLoader {
    async fn load(&self, pathname: &str) -> Result<String> {
        *self.loads.entry(pathname.to_string()).or_insert(0) += 1;

        self.files
            .get(pathname)
            .map(|text| text.value().clone())
            .ok_or_else(|| CompileError::NotFound(pathname.to_string()))
    }
}
