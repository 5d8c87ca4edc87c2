// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Recursive, cycle-aware compilation of a module graph
//!
//! Per pathname: resolve the version segment, check the cache, check the
//! trace for a cycle, load, rewrite aliases, compile each dependency in
//! declaration order, then flatten the subtree into a deduplicated load
//! order. Only the top-level entry gets its header rewritten.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, try_join_all};
use tracing::{debug, info, instrument};

use crate::config::CompilerConfig;
use crate::error::{CompileError, Result};
use crate::loader::FileLoader;
use crate::output;
use crate::package::{PackageScope, PackageScopeResolver};
use crate::path::{self, ABSENT};
use crate::rewrite::AliasRewriter;
use crate::trace::{Trace, TraceFrame};
use crate::version;

/// A file whose references are canonical, before its dependencies are
/// compiled
#[derive(Debug)]
struct ScopedFile {
    pathname: String,
    source: String,
    scope: Arc<PackageScope>,
    dependencies: Vec<String>,
}

/// A module and its resolved dependency subtree
#[derive(Debug)]
pub struct CompiledFile {
    /// Pathname the file was loaded from; the cache key
    pub pathname: String,
    /// Module id declared for this file
    pub id: String,
    /// Source with every reference rewritten to canonical form
    pub source: String,
    /// Requested dependency pathnames in declaration order, before version
    /// resolution
    pub dependencies: Vec<String>,
    /// What each entry of `dependencies` resolved to
    pub children: Vec<Dependency>,
    /// Every transitive dependency pathname, each once, in load order
    pub flattened: Vec<String>,
    /// Package scope the file was compiled under
    pub scope: Arc<PackageScope>,
}

impl CompiledFile {
    fn assemble(file: ScopedFile, children: Vec<Dependency>, base: &str) -> Self {
        let flattened = flatten(&children);
        Self {
            id: path::to_module_id(&file.pathname, base),
            pathname: file.pathname,
            source: file.source,
            dependencies: file.dependencies,
            children,
            flattened,
            scope: file.scope,
        }
    }
}

/// Outcome of compiling one dependency reference
#[derive(Debug, Clone)]
pub enum Dependency {
    /// A real module
    Module(Arc<CompiledFile>),
    /// `$`, or a ranged version with no exact pin in the trace
    Absent {
        /// The reference as requested
        reference: String,
    },
}

impl Dependency {
    /// The compiled module, unless absent
    pub fn as_module(&self) -> Option<&Arc<CompiledFile>> {
        match self {
            Dependency::Module(file) => Some(file),
            Dependency::Absent { .. } => None,
        }
    }

    /// Pathname of the module, or the requested reference when absent
    pub fn pathname(&self) -> &str {
        match self {
            Dependency::Module(file) => &file.pathname,
            Dependency::Absent { reference } => reference,
        }
    }

    /// Whether nothing is loaded for this reference
    pub fn is_absent(&self) -> bool {
        matches!(self, Dependency::Absent { .. })
    }
}

/// Each child's own load order followed by the child, first occurrence kept
fn flatten(children: &[Dependency]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut flat = Vec::new();

    for file in children.iter().filter_map(Dependency::as_module) {
        for pathname in file.flattened.iter().chain(std::iter::once(&file.pathname)) {
            if seen.insert(pathname.as_str()) {
                flat.push(pathname.clone());
            }
        }
    }

    flat
}

/// A finished top-level compile
#[derive(Debug, Clone)]
pub struct CompiledModule {
    /// The entry file and its subtree
    pub file: Arc<CompiledFile>,
    /// Output text with the rewritten header and stamps
    pub code: String,
}

/// Module compiler with process-lifetime caches
pub struct Compiler {
    config: CompilerConfig,
    loader: Arc<dyn FileLoader>,
    scopes: PackageScopeResolver,
    /// Compiled files keyed by pathname
    cache: DashMap<String, Arc<CompiledFile>>,
}

impl Compiler {
    /// Create a compiler; the configuration is validated first
    pub fn new(config: CompilerConfig, loader: Arc<dyn FileLoader>) -> Result<Self> {
        let config = config.validate()?;
        let scopes =
            PackageScopeResolver::new(Arc::clone(&loader), &config.base, &config.descriptor_name);

        Ok(Self {
            config,
            loader,
            scopes,
            cache: DashMap::new(),
        })
    }

    /// The validated configuration
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Pathname for an entry given as a pathname or a `#` id.
    ///
    /// Relative pathnames are taken relative to the base.
    pub fn entry_pathname(&self, entry: &str) -> String {
        if path::is_canonical(entry) {
            return path::to_pathname(entry, &self.config.base);
        }

        let entry = path::strip_query(entry);
        if entry == ABSENT {
            entry.to_string()
        } else {
            path::resolve(&self.config.base, entry)
        }
    }

    /// Compile an entry module.
    ///
    /// Returns `None` when the entry itself resolves to no module.
    #[instrument(skip(self))]
    pub async fn compile(&self, entry: &str) -> Result<Option<CompiledModule>> {
        let pathname = self.entry_pathname(entry);

        let file = match self.compile_with_trace(pathname, &Trace::new()).await? {
            Dependency::Module(file) => file,
            Dependency::Absent { reference } => {
                debug!("Entry {} resolved to no module", reference);
                return Ok(None);
            }
        };

        let code = output::finalize(&file, &self.config)?;
        info!(
            "Compiled {} with {} dependencies",
            file.id,
            file.flattened.len()
        );

        Ok(Some(CompiledModule { file, code }))
    }

    /// Compile several entries concurrently, sharing the caches.
    ///
    /// Fails with the first error; results are in entry order.
    pub async fn compile_all<S: AsRef<str>>(
        &self,
        entries: &[S],
    ) -> Result<Vec<Option<CompiledModule>>> {
        try_join_all(entries.iter().map(|entry| self.compile(entry.as_ref()))).await
    }

    /// Compile `pathname` as a dependency of the files in `trace`.
    ///
    /// Nothing is published to the cache until the whole subtree has
    /// compiled, so dropping the returned future leaves the caches intact.
    pub fn compile_with_trace<'a>(
        &'a self,
        pathname: String,
        trace: &'a Trace,
    ) -> BoxFuture<'a, Result<Dependency>> {
        Box::pin(async move {
            if pathname == ABSENT {
                return Ok(Dependency::Absent {
                    reference: pathname,
                });
            }

            let Some(resolved) = version::resolve_version(&pathname, trace)? else {
                return Ok(Dependency::Absent {
                    reference: pathname,
                });
            };
            let pathname = path::normalize_segments(&resolved);

            if let Some(file) = self.cached(&pathname) {
                debug!("Cache hit for {}", pathname);
                return Ok(Dependency::Module(file));
            }

            if trace.contains(&pathname) {
                return Err(CompileError::CircularDependency {
                    cycle: trace.cycle_through(&pathname),
                });
            }

            let scoped = self.load(&pathname).await?;
            let inner = trace.push(TraceFrame {
                pathname: scoped.pathname.clone(),
                scope: Arc::clone(&scoped.scope),
            });

            let mut children = Vec::with_capacity(scoped.dependencies.len());
            for dependency in &scoped.dependencies {
                children.push(self.compile_with_trace(dependency.clone(), &inner).await?);
            }

            let file = CompiledFile::assemble(scoped, children, &self.config.base);
            Ok(Dependency::Module(self.publish(file)))
        })
    }

    /// Load a file and rewrite its references under its package scope
    async fn load(&self, pathname: &str) -> Result<ScopedFile> {
        let text = self.loader.load(pathname).await?;
        let scope = self.scopes.scope_for(pathname).await?;

        let rewritten = AliasRewriter::new(&scope, &self.config.base).rewrite(&text, pathname)?;
        let dependencies = rewritten
            .dependencies()
            .map(|id| path::to_pathname(id, &self.config.base))
            .collect();

        Ok(ScopedFile {
            pathname: pathname.to_string(),
            source: rewritten.source,
            scope,
            dependencies,
        })
    }

    /// Insert unless another compile got there first; the stored value wins
    fn publish(&self, file: CompiledFile) -> Arc<CompiledFile> {
        Arc::clone(
            self.cache
                .entry(file.pathname.clone())
                .or_insert_with(|| Arc::new(file))
                .value(),
        )
    }

    /// A compiled file from the cache
    pub fn cached(&self, pathname: &str) -> Option<Arc<CompiledFile>> {
        self.cache.get(pathname).map(|file| Arc::clone(file.value()))
    }

    /// Number of compiled files cached
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}
