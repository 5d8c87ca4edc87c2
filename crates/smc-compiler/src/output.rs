// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Output text for a top-level entry
//!
//! The entry's header call is rewritten to declare its id and flattened
//! dependency list, every dependency reference gets a cache-busting stamp,
//! and one relation comment per direct dependency is prepended.

use std::collections::HashMap;

use regex::Regex;

use crate::compiler::CompiledFile;
use crate::config::CompilerConfig;
use crate::error::{CompileError, Result};
use crate::path::{self, ABSENT};
use crate::rewrite::{self, mask_comments, splice};

/// Render the compiled output of an entry file
pub fn finalize(file: &CompiledFile, config: &CompilerConfig) -> Result<String> {
    let source = stamp_references(file, config);
    let source = rewrite_header(&source, file, config)?;
    let relations = relation_comments(file);

    if relations.is_empty() {
        Ok(source)
    } else {
        Ok(format!("{}\n\n{}", relations, source))
    }
}

/// Append a stamp to every canonical id inside a recognised call.
///
/// Synchronous ids that were resolved to a pinned version are replaced by
/// the id of the module actually compiled.
fn stamp_references(file: &CompiledFile, config: &CompilerConfig) -> String {
    let base = config.base.as_str();
    let resolved: HashMap<&str, &CompiledFile> = file
        .dependencies
        .iter()
        .zip(&file.children)
        .filter_map(|(requested, child)| {
            child
                .as_module()
                .map(|module| (requested.as_str(), &**module))
        })
        .collect();

    let mut edits = Vec::new();
    for found in rewrite::scan_ids(&file.source) {
        if found.id == ABSENT || !path::is_canonical(&found.id) || found.id.contains('?') {
            continue;
        }

        let requested = path::to_pathname(&found.id, base);
        let pinned = if found.kind.is_sync() {
            resolved.get(requested.as_str())
        } else {
            None
        };

        let text = match pinned {
            Some(module) => format!("{}{}", module.id, config.stamp(&module.pathname)),
            None => format!("{}{}", found.id, config.stamp(&path::fix_ranges(&requested))),
        };
        if text != found.id {
            edits.push((found.span, text));
        }
    }

    splice(&file.source, edits)
}

/// Replace the first `callee(... function` with the declaring header
fn rewrite_header(source: &str, file: &CompiledFile, config: &CompilerConfig) -> Result<String> {
    let callee = &config.header_callee;
    let pattern = Regex::new(&format!(
        r"(^|[^.\w$]){}\s*\(.*?function",
        regex::escape(callee)
    ))
    .map_err(|e| CompileError::InvalidConfig(format!("header callee '{}': {}", callee, e)))?;

    let masked = mask_comments(source);
    let Some(span) = pattern
        .captures(&masked)
        .and_then(|caps| Some(caps.get(1)?.end()..caps.get(0)?.end()))
    else {
        return Ok(source.to_string());
    };

    let deps = file
        .flattened
        .iter()
        .map(|pathname| {
            format!(
                "\"{}{}\"",
                path::to_module_id(pathname, &config.base),
                config.stamp(&path::fix_ranges(pathname))
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    let header = format!("{}(\"{}\", [{}], function", callee, file.id, deps);
    Ok(splice(source, vec![(span, header)]))
}

/// `// #optional <pathname>` for each distinct direct dependency
fn relation_comments(file: &CompiledFile) -> String {
    let mut lines: Vec<String> = Vec::new();

    for child in file.children.iter().filter_map(|child| child.as_module()) {
        let line = format!("// #optional <{}>", path::fix_ranges(&child.pathname));
        if !lines.contains(&line) {
            lines.push(line);
        }
    }

    lines.join("\n")
}
