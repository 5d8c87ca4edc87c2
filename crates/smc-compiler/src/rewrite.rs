// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dependency call sites in module source
//!
//! Three call forms are recognised:
//! - `require('id')`, a synchronous dependency
//! - `require.async('id' | ['a', 'b'], ...)`, loaded on demand
//! - `seajs.use('id' | ['a', 'b'], ...)`, loaded on demand
//!
//! Scanning runs on a copy of the source with comments blanked out byte for
//! byte, so every span found there is also valid in the original text. Edits
//! are collected as spans and spliced in one pass.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;
use crate::package::PackageScope;
use crate::path::{self, ABSENT};

/// String literals are matched so that `//` inside them is not a comment
static COMMENT_OR_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'|//[^\n]*|/\*.*?\*/"#)
        .expect("comment pattern")
});

static CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^.\w$])((?:seajs\.use|require\.async|require)\s*\(\s*\[?)(.*?)(\]?\s*\))")
        .expect("call pattern")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]*)['"]"#).expect("quoted id pattern"));

/// Which call form an id appeared in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `require(...)`
    Require,
    /// `require.async(...)`
    RequireAsync,
    /// `seajs.use(...)`
    SeajsUse,
}

impl CallKind {
    fn from_callee(callee: &str) -> Self {
        if callee.starts_with("seajs") {
            CallKind::SeajsUse
        } else if callee.starts_with("require.async") {
            CallKind::RequireAsync
        } else {
            CallKind::Require
        }
    }

    /// Whether ids in this call are load-order dependencies
    pub fn is_sync(self) -> bool {
        self == CallKind::Require
    }
}

/// A quoted id inside a call, with the byte span of the id text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSpan {
    /// Call form the id belongs to
    pub kind: CallKind,
    /// Span of the id between its quotes
    pub span: Range<usize>,
    /// The id as written
    pub id: String,
}

/// Blank out comments, keeping newlines and byte offsets
pub fn mask_comments(source: &str) -> String {
    let mut masked = String::with_capacity(source.len());
    let mut last = 0;

    for m in COMMENT_OR_STRING.find_iter(source) {
        if !m.as_str().starts_with('/') {
            continue;
        }
        masked.push_str(&source[last..m.start()]);
        for ch in m.as_str().chars() {
            if ch == '\n' {
                masked.push('\n');
            } else {
                masked.extend(std::iter::repeat_n(' ', ch.len_utf8()));
            }
        }
        last = m.end();
    }

    masked.push_str(&source[last..]);
    masked
}

/// Every quoted id inside a recognised call, in source order
pub fn scan_ids(source: &str) -> Vec<IdSpan> {
    let masked = mask_comments(source);
    let mut ids = Vec::new();

    for caps in CALL.captures_iter(&masked) {
        let (Some(callee), Some(args)) = (caps.get(2), caps.get(3)) else {
            continue;
        };
        let kind = CallKind::from_callee(callee.as_str());

        for quoted in QUOTED.captures_iter(args.as_str()) {
            if let Some(id) = quoted.get(1) {
                let start = args.start() + id.start();
                let end = args.start() + id.end();
                ids.push(IdSpan {
                    kind,
                    span: start..end,
                    id: source[start..end].to_string(),
                });
            }
        }
    }

    ids
}

/// Ids referenced by synchronous `require` calls, in declaration order, as
/// written. Duplicates are kept.
pub fn extract_dependencies(source: &str) -> Vec<String> {
    scan_ids(source)
        .into_iter()
        .filter(|id| id.kind.is_sync())
        .map(|id| id.id)
        .collect()
}

/// Replace each span with its text. Spans must not overlap.
pub fn splice(source: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(span, _)| span.start);

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for (span, text) in edits {
        out.push_str(&source[last..span.start]);
        out.push_str(&text);
        last = span.end;
    }
    out.push_str(&source[last..]);
    out
}

/// A reference after alias rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Call form it appeared in
    pub kind: CallKind,
    /// Canonical id, or `$`
    pub id: String,
}

/// Source with every reference in canonical form
#[derive(Debug, Clone)]
pub struct Rewritten {
    /// Rewritten source text
    pub source: String,
    /// Every reference in source order
    pub references: Vec<Reference>,
}

impl Rewritten {
    /// Canonical ids of synchronous dependencies, in declaration order
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .filter(|r| r.kind.is_sync())
            .map(|r| r.id.as_str())
    }
}

/// Applies a package scope's alias table to references in one file
pub struct AliasRewriter<'a> {
    scope: &'a PackageScope,
    base: &'a str,
}

impl<'a> AliasRewriter<'a> {
    /// Rewrite against `scope`, relativizing to `base`
    pub fn new(scope: &'a PackageScope, base: &'a str) -> Self {
        Self { scope, base }
    }

    /// Canonical form of one reference written in the file at `pathname`.
    ///
    /// `$` and ids that are already canonical are returned unchanged.
    pub fn rewrite_id(&self, id: &str, pathname: &str) -> Result<String> {
        if id == ABSENT || path::is_canonical(id) {
            return Ok(id.to_string());
        }

        let aliased = match id.split_once('/') {
            Some((first, rest)) => self
                .scope
                .alias_for(first)
                .map(|target| format!("{}/{}", target, rest)),
            None => self.scope.alias_for(id).map(str::to_string),
        };

        path::canonical_reference(aliased.as_deref().unwrap_or(id), pathname, self.base)
    }

    /// Rewrite every reference in `source`, the text of the file at `pathname`
    pub fn rewrite(&self, source: &str, pathname: &str) -> Result<Rewritten> {
        let mut edits = Vec::new();
        let mut references = Vec::new();

        for found in scan_ids(source) {
            let id = self.rewrite_id(&found.id, pathname)?;
            if id != found.id {
                edits.push((found.span, id.clone()));
            }
            references.push(Reference {
                kind: found.kind,
                id,
            });
        }

        Ok(Rewritten {
            source: splice(source, edits),
            references,
        })
    }
}
