// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Package scopes: alias tables inherited from the nearest package descriptor

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{CompileError, Result};
use crate::loader::FileLoader;
use crate::path::{self, CANONICAL_MARKER};
use crate::version::Constraint;

/// Version segment inside an alias value, ending a segment or the string
static ALIAS_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)/(\d+\.\d+\.\d+[+-]?)(?:/|$)").expect("alias version pattern")
});

/// The fields of a package descriptor the compiler reads
#[derive(Debug, Default, Deserialize)]
struct PackageDescriptor {
    #[serde(default)]
    alias: Option<BTreeMap<String, String>>,
}

/// Alias table and version map shared by every file below a directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageScope {
    alias: BTreeMap<String, String>,
    versions: BTreeMap<String, Constraint>,
    origin: Option<String>,
}

impl PackageScope {
    /// Scope used when no descriptor exists up to the root
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a scope from an alias table and a version map keyed by pathname
    /// prefix
    pub fn from_parts(
        alias: BTreeMap<String, String>,
        versions: BTreeMap<String, Constraint>,
    ) -> Self {
        Self {
            alias,
            versions,
            origin: None,
        }
    }

    /// Parse descriptor text found at `pathname`
    pub fn from_descriptor(text: &str, pathname: &str, base: &str) -> Result<Self> {
        let descriptor: PackageDescriptor =
            serde_json::from_str(text).map_err(|source| CompileError::MalformedDescriptor {
                pathname: pathname.to_string(),
                source,
            })?;

        let alias = descriptor.alias.unwrap_or_default();
        let versions = version_map(&alias, base)?;

        Ok(Self {
            alias,
            versions,
            origin: Some(pathname.to_string()),
        })
    }

    /// Canonical prefix an alias name stands for
    pub fn alias_for(&self, name: &str) -> Option<&str> {
        self.alias.get(name).map(String::as_str)
    }

    /// Declared constraint for a pathname prefix
    pub fn version_for(&self, prefix: &str) -> Option<&Constraint> {
        self.versions.get(prefix)
    }

    /// Every version map entry
    pub fn versions(&self) -> &BTreeMap<String, Constraint> {
        &self.versions
    }

    /// Pathname of the descriptor this scope came from
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Whether both tables are empty
    pub fn is_empty(&self) -> bool {
        self.alias.is_empty() && self.versions.is_empty()
    }
}

/// Derive `{base + prefix: constraint}` from every versioned alias value
fn version_map(
    alias: &BTreeMap<String, String>,
    base: &str,
) -> Result<BTreeMap<String, Constraint>> {
    let mut versions = BTreeMap::new();

    for value in alias.values() {
        let value = value.strip_prefix(CANONICAL_MARKER).unwrap_or(value);
        if let Some(caps) = ALIAS_VERSION.captures(value) {
            versions.insert(format!("{}{}", base, &caps[1]), caps[2].parse()?);
        }
    }

    Ok(versions)
}

/// Finds and caches the package scope of a directory
pub struct PackageScopeResolver {
    loader: Arc<dyn FileLoader>,
    base: String,
    descriptor_name: String,
    /// Keyed by the directory the lookup started from
    cache: DashMap<String, Arc<PackageScope>>,
}

impl PackageScopeResolver {
    /// Create a resolver reading descriptors named `descriptor_name`
    pub fn new(loader: Arc<dyn FileLoader>, base: &str, descriptor_name: &str) -> Self {
        Self {
            loader,
            base: base.to_string(),
            descriptor_name: descriptor_name.to_string(),
            cache: DashMap::new(),
        }
    }

    /// Scope of the directory containing `pathname`
    pub async fn scope_for(&self, pathname: &str) -> Result<Arc<PackageScope>> {
        self.resolve(&path::dirname(pathname)).await
    }

    /// Walk from `start_dir` toward the root until a descriptor loads.
    ///
    /// A descriptor that is missing everywhere yields the empty scope. A
    /// descriptor that exists but does not parse is fatal and not cached.
    pub async fn resolve(&self, start_dir: &str) -> Result<Arc<PackageScope>> {
        if let Some(scope) = self.cache.get(start_dir) {
            return Ok(Arc::clone(scope.value()));
        }

        let mut dir = start_dir.to_string();
        let scope = loop {
            let pathname = format!("{}{}", dir, self.descriptor_name);

            match self.loader.load(&pathname).await {
                Ok(text) => {
                    debug!("Package scope for {} from {}", start_dir, pathname);
                    break PackageScope::from_descriptor(&text, &pathname, &self.base)?;
                }
                Err(e) if e.is_not_found() => match path::parent_dir(&dir) {
                    Some(parent) => dir = parent,
                    None => {
                        debug!("No package descriptor above {}", start_dir);
                        break PackageScope::empty();
                    }
                },
                Err(e) => return Err(e),
            }
        };

        Ok(self.publish(start_dir, scope))
    }

    /// Insert unless another lookup got there first; the stored value wins
    fn publish(&self, start_dir: &str, scope: PackageScope) -> Arc<PackageScope> {
        Arc::clone(
            self.cache
                .entry(start_dir.to_string())
                .or_insert_with(|| Arc::new(scope))
                .value(),
        )
    }

    /// Number of cached scopes
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing is cached yet
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
