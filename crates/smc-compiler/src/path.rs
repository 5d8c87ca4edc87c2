// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Conversions between module ids and pathnames
//!
//! A module id as written in source is one of:
//! - `$`, the "no module" sentinel
//! - a canonical id, `#` followed by a base-relative path
//! - a bare or aliased name, or a relative path (`./x`, `../x`)
//!
//! A pathname is the base prefix joined with a canonical id's path. Pathnames
//! are what the file loader sees and what the compiled-file cache is keyed by.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CompileError, Result};

/// Prefix marking an id as canonical
pub const CANONICAL_MARKER: char = '#';

/// Sentinel id meaning "no module"
pub const ABSENT: &str = "$";

/// `prefix/X.Y.Z[+-]` with an optional `/suffix`
static VERSIONED_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)/(\d+\.\d+\.\d+[+-]?)(?:/(.*))?$").expect("versioned id pattern")
});

/// An extension starts with a letter, so `jquery-1.7` has none
static EXTNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[A-Za-z]\w*$").expect("extname pattern"));

static RANGED_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+)[+-]").expect("ranged version pattern"));

/// Whether an id is already canonical
pub fn is_canonical(id: &str) -> bool {
    id.starts_with(CANONICAL_MARKER)
}

/// Whether an id is relative to the file that references it
pub fn is_relative(id: &str) -> bool {
    id.starts_with('.')
}

/// Collapse `.`, `..` and empty segments.
///
/// A leading `/` and a trailing `/` survive. `..` never climbs above the root
/// of an absolute path; in a relative path leading `..` segments are kept.
pub fn normalize_segments(path: &str) -> String {
    let is_absolute = path.starts_with('/');
    let trailing = path.len() > 1 && path.ends_with('/');
    let mut components: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                if !components.is_empty() && components.last() != Some(&"..") {
                    components.pop();
                } else if !is_absolute {
                    components.push("..");
                }
            }
            c => components.push(c),
        }
    }

    let mut result = components.join("/");
    if trailing && !result.is_empty() {
        result.push('/');
    }
    if is_absolute {
        result.insert(0, '/');
    }
    result
}

/// Directory of a pathname, always `/`-terminated
pub fn dirname(pathname: &str) -> String {
    match pathname.rfind('/') {
        Some(i) => pathname[..=i].to_string(),
        None => "./".to_string(),
    }
}

/// Parent of a `/`-terminated absolute directory, or `None` at the root.
///
/// Relative directories have no parent, since `..` would climb forever.
pub fn parent_dir(dir: &str) -> Option<String> {
    if dir == "/" || !dir.starts_with('/') {
        return None;
    }
    let parent = normalize_segments(&format!("{}/../", dir.trim_end_matches('/')));
    if parent.is_empty() { None } else { Some(parent) }
}

/// Resolve `reference` against the pathname of the file that contains it
pub fn resolve(from: &str, reference: &str) -> String {
    if reference.starts_with('/') {
        normalize_segments(reference)
    } else {
        normalize_segments(&format!("{}{}", dirname(from), reference))
    }
}

/// Drop a trailing `?query`
pub fn strip_query(id: &str) -> &str {
    match id.find('?') {
        Some(i) => &id[..i],
        None => id,
    }
}

/// Expand a versioned directory without a file to the file named after the
/// package: `lib/jquery/1.7.2` becomes `lib/jquery/1.7.2/jquery`.
pub fn expand_versioned(id: &str) -> Cow<'_, str> {
    let Some(caps) = VERSIONED_ID.captures(id) else {
        return Cow::Borrowed(id);
    };
    let has_suffix = caps.get(3).is_some_and(|m| !m.as_str().is_empty());
    if has_suffix {
        return Cow::Borrowed(id);
    }

    let prefix = &caps[1];
    let name = prefix.rsplit('/').next().unwrap_or(prefix);
    Cow::Owned(format!("{}/{}/{}", prefix, &caps[2], name))
}

/// Normalize an id into its canonical `#`-prefixed form.
///
/// The query string is dropped, a versioned directory is expanded and `.js`
/// is appended when there is no extension. A trailing `#` keeps the path
/// verbatim; it stays in the canonical form when the path has no extension,
/// so that applying this to its own output returns it unchanged.
pub fn to_canonical(id: &str) -> String {
    let body = id.strip_prefix(CANONICAL_MARKER).unwrap_or(id);
    let body = strip_query(body);

    let body = match body.strip_suffix(CANONICAL_MARKER) {
        Some(verbatim) => {
            let verbatim = normalize_segments(verbatim);
            if EXTNAME.is_match(&verbatim) {
                verbatim
            } else {
                return format!("{}{}{}", CANONICAL_MARKER, verbatim, CANONICAL_MARKER);
            }
        }
        None => {
            let mut body = expand_versioned(body).into_owned();
            if !body.is_empty() && !body.ends_with('/') && !EXTNAME.is_match(&body) {
                body.push_str(".js");
            }
            body
        }
    };

    format!("{}{}", CANONICAL_MARKER, normalize_segments(&body))
}

/// Convert a canonical id to a pathname under `base`; other ids are returned
/// untouched.
pub fn to_pathname(id: &str, base: &str) -> String {
    if !is_canonical(id) {
        return id.to_string();
    }
    let canonical = to_canonical(id);
    let body = &canonical[1..];
    let body = body.strip_suffix(CANONICAL_MARKER).unwrap_or(body);
    normalize_segments(&format!("{}{}", base, body))
}

/// Module id declared in compiled output: base-relative, `#`-prefixed, with
/// the extension dropped.
pub fn to_module_id(pathname: &str, base: &str) -> String {
    let relative = pathname.strip_prefix(base).unwrap_or(pathname);
    format!("{}{}", CANONICAL_MARKER, EXTNAME.replace(relative, ""))
}

/// Turn a reference written in `referrer` into its source-level canonical form.
///
/// Relative references are resolved against `referrer` and made base-relative.
/// No extension is appended here; that happens when the id becomes a pathname.
pub fn canonical_reference(reference: &str, referrer: &str, base: &str) -> Result<String> {
    if reference == ABSENT || is_canonical(reference) {
        return Ok(reference.to_string());
    }

    let id = if is_relative(reference) {
        let pathname = resolve(referrer, reference);
        match pathname.strip_prefix(base) {
            Some(relative) => relative.to_string(),
            None => {
                return Err(CompileError::OutsideBase {
                    reference: reference.to_string(),
                    pathname: referrer.to_string(),
                });
            }
        }
    } else {
        reference.to_string()
    };

    Ok(format!("{}{}", CANONICAL_MARKER, expand_versioned(&id)))
}

/// Replace range markers with the bare version: `x/1.0.0+/y` -> `x/1.0.0/y`
pub fn fix_ranges(pathname: &str) -> Cow<'_, str> {
    RANGED_VERSION.replace_all(pathname, "$1")
}
