// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Chain of files currently being compiled, root first

use std::sync::Arc;

use crate::package::PackageScope;

/// One ancestor in the trace
#[derive(Debug, Clone)]
pub struct TraceFrame {
    /// Pathname of the file being compiled
    pub pathname: String,
    /// Package scope the file was resolved under
    pub scope: Arc<PackageScope>,
}

/// Immutable ancestor chain.
///
/// Each recursive step gets its own extended copy, so siblings never observe
/// one another's frames.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    frames: Vec<TraceFrame>,
}

impl Trace {
    /// An empty trace, as seen by a top-level compile
    pub fn new() -> Self {
        Self::default()
    }

    /// A new trace with `frame` appended
    pub fn push(&self, frame: TraceFrame) -> Trace {
        let mut frames = Vec::with_capacity(self.frames.len() + 1);
        frames.extend(self.frames.iter().cloned());
        frames.push(frame);
        Trace { frames }
    }

    /// Frames from the root to the most recent ancestor
    pub fn frames(&self) -> impl DoubleEndedIterator<Item = &TraceFrame> {
        self.frames.iter()
    }

    /// Whether `pathname` is already being compiled
    pub fn contains(&self, pathname: &str) -> bool {
        self.frames.iter().any(|frame| frame.pathname == pathname)
    }

    /// The full ancestor chain followed by `pathname`
    pub fn cycle_through(&self, pathname: &str) -> Vec<String> {
        self.frames
            .iter()
            .map(|frame| frame.pathname.clone())
            .chain(std::iter::once(pathname.to_string()))
            .collect()
    }
}
