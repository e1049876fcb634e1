//! Version constraint expressions
//!
//! Grammar: an optional comparison operator (`>`, `>=`, `<`, `<=`, `=`)
//! followed by a version token. Without an operator the constraint is an
//! exact match. Tokens may carry a leading `v` (`v0.1.0`). An empty
//! constraint, `*` or `latest` accepts any version.

use crate::error::{ForgeError, ForgeResult};
use semver::Version;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Exact,
    Greater,
    GreaterEq,
    Less,
    LessEq,
}

impl Op {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Exact => "=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
            Self::Less => "<",
            Self::LessEq => "<=",
        }
    }
}

/// A parsed constraint expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Any version satisfies
    Any,
    /// Version compared against a bound
    Compare(Op, Version),
}

impl Constraint {
    /// Parse a constraint expression
    pub fn parse(expr: &str) -> ForgeResult<Self> {
        let trimmed = expr.trim();
        if trimmed.is_empty() || trimmed == "*" || trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::Any);
        }

        // Two-character operators must be tried first
        let (op, rest) = [
            (">=", Op::GreaterEq),
            ("<=", Op::LessEq),
            (">", Op::Greater),
            ("<", Op::Less),
            ("=", Op::Exact),
        ]
        .iter()
        .find_map(|(prefix, op)| trimmed.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((Op::Exact, trimmed));

        let version = parse_version(rest).map_err(|reason| ForgeError::InvalidConstraint {
            constraint: expr.to_string(),
            reason,
        })?;

        Ok(Self::Compare(op, version))
    }

    /// Whether `version` satisfies this constraint
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Compare(op, bound) => match op {
                Op::Exact => version == bound,
                Op::Greater => version > bound,
                Op::GreaterEq => version >= bound,
                Op::Less => version < bound,
                Op::LessEq => version <= bound,
            },
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Compare(op, version) => write!(f, "{}v{}", op.symbol(), version),
        }
    }
}

impl FromStr for Constraint {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a version token, accepting an optional leading `v`
pub fn parse_version(token: &str) -> Result<Version, String> {
    let token = token.trim();
    let bare = token.strip_prefix('v').unwrap_or(token);
    if bare.is_empty() {
        return Err("missing version".to_string());
    }
    Version::parse(bare).map_err(|e| e.to_string())
}
