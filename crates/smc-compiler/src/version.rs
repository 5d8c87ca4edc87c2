// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Version constraints embedded in module paths
//!
//! A path segment `X.Y.Z` pins an exact version, `X.Y.Z+` asks for at least
//! that version and `X.Y.Z-` for at most that version. Every package scope in
//! the active trace may declare a constraint for the same prefix; those must
//! intersect, and the nearest exact pin decides which directory is loaded.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use tracing::debug;

use crate::error::{CompileError, ConstraintSite, Result};
use crate::trace::Trace;

static CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)([+-]?)$").expect("constraint pattern")
});

static VERSIONED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)/(\d+\.\d+\.\d+[+-]?)/(.*)$").expect("versioned path pattern")
});

/// Which side of the pinned version is acceptable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Exactly this version
    Exact,
    /// This version or newer (`+`)
    AtLeast,
    /// This version or older (`-`)
    AtMost,
}

impl Direction {
    fn marker(self) -> &'static str {
        match self {
            Direction::Exact => "",
            Direction::AtLeast => "+",
            Direction::AtMost => "-",
        }
    }
}

/// A pinned version plus a direction marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// The version named in the path
    pub version: Version,
    /// How the version bounds the acceptable range
    pub direction: Direction,
}

impl Constraint {
    /// Whether this constraint names exactly one version
    pub fn is_exact(&self) -> bool {
        self.direction == Direction::Exact
    }
}

impl FromStr for Constraint {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = CONSTRAINT
            .captures(s)
            .ok_or_else(|| CompileError::InvalidVersion(s.to_string()))?;

        let part = |i: usize| -> Result<u64> {
            caps[i]
                .parse()
                .map_err(|_| CompileError::InvalidVersion(s.to_string()))
        };

        let direction = match &caps[4] {
            "+" => Direction::AtLeast,
            "-" => Direction::AtMost,
            _ => Direction::Exact,
        };

        Ok(Self {
            version: Version::new(part(1)?, part(2)?, part(3)?),
            direction,
        })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.version, self.direction.marker())
    }
}

/// A closed interval of versions; `None` bounds are infinite
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Interval {
    lower: Option<Version>,
    upper: Option<Version>,
}

impl Interval {
    /// The interval containing every version
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Intersect with a constraint; `None` when the result is empty
    pub fn narrow(&self, constraint: &Constraint) -> Option<Interval> {
        let point = &constraint.version;
        let below = self.lower.as_ref().is_some_and(|lower| point < lower);
        let above = self.upper.as_ref().is_some_and(|upper| point > upper);

        match constraint.direction {
            Direction::Exact => {
                if below || above {
                    None
                } else {
                    Some(Interval {
                        lower: Some(point.clone()),
                        upper: Some(point.clone()),
                    })
                }
            }
            Direction::AtLeast => {
                if above {
                    None
                } else if below {
                    Some(self.clone())
                } else {
                    Some(Interval {
                        lower: Some(point.clone()),
                        upper: self.upper.clone(),
                    })
                }
            }
            Direction::AtMost => {
                if below {
                    None
                } else if above {
                    Some(self.clone())
                } else {
                    Some(Interval {
                        lower: self.lower.clone(),
                        upper: Some(point.clone()),
                    })
                }
            }
        }
    }
}

/// Fold constraints in order; `None` once the intersection is empty
pub fn intersect_all<'a>(constraints: impl IntoIterator<Item = &'a Constraint>) -> Option<Interval> {
    constraints
        .into_iter()
        .try_fold(Interval::unbounded(), |interval, constraint| {
            interval.narrow(constraint)
        })
}

/// A pathname split around its version segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPath {
    /// Everything before the version segment
    pub prefix: String,
    /// The version segment
    pub constraint: Constraint,
    /// Everything after the version segment
    pub suffix: String,
}

impl VersionedPath {
    /// Split a pathname, or `None` when it carries no version segment
    pub fn parse(pathname: &str) -> Result<Option<Self>> {
        let Some(caps) = VERSIONED_PATH.captures(pathname) else {
            return Ok(None);
        };

        Ok(Some(Self {
            prefix: caps[1].to_string(),
            constraint: caps[2].parse()?,
            suffix: caps[3].to_string(),
        }))
    }

    /// Rebuild the pathname with a concrete version
    pub fn pinned(&self, version: &Version) -> String {
        format!("{}/{}/{}", self.prefix, version, self.suffix)
    }
}

/// Resolve the version segment of `pathname` against the ambient constraints
/// of every file in `trace`.
///
/// Returns the pathname to load, or `None` when a ranged reference has no
/// exact pin anywhere in the trace. Pathnames without a version segment are
/// returned unchanged.
pub fn resolve_version(pathname: &str, trace: &Trace) -> Result<Option<String>> {
    let Some(versioned) = VersionedPath::parse(pathname)? else {
        return Ok(Some(pathname.to_string()));
    };
    let prefix = versioned.prefix.as_str();

    let ambient: Vec<&Constraint> = trace
        .frames()
        .filter_map(|frame| frame.scope.version_for(prefix))
        .collect();

    if intersect_all(ambient.iter().copied()).is_none() {
        return Err(CompileError::VersionConflict {
            prefix: prefix.to_string(),
            chain: trace
                .frames()
                .map(|frame| ConstraintSite {
                    pathname: frame.pathname.clone(),
                    constraint: frame.scope.version_for(prefix).map(ToString::to_string),
                })
                .collect(),
        });
    }

    if versioned.constraint.is_exact() {
        return Ok(Some(versioned.pinned(&versioned.constraint.version)));
    }

    match ambient.iter().rev().find(|constraint| constraint.is_exact()) {
        Some(pin) => {
            debug!("Pinned {} to {} (requested {})", prefix, pin.version, versioned.constraint);
            Ok(Some(versioned.pinned(&pin.version)))
        }
        None => {
            debug!("Deferred {} (requested {}, no exact pin)", prefix, versioned.constraint);
            Ok(None)
        }
    }
}
