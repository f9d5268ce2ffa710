//! Content rights and their evaluators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A right an ACL can grant or deny on an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Right {
    Read,
    /// Read once the revision is published.
    PubRead,
    Write,
    Create,
    Destroy,
    Admin,
}

/// Publication facts of the revision a right is checked against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timing {
    pub ptime: Option<i64>,
    pub mtime: Option<i64>,
}

/// Refines an ACL grant. Only called when the ACL granted the right, so it
/// can only turn a grant into a denial.
type Evaluator = fn(&Timing, i64) -> bool;

fn granted(_: &Timing, _: i64) -> bool {
    true
}

/// Published when `now` has reached `ptime`, else `mtime`, else always.
fn published(timing: &Timing, now: i64) -> bool {
    now >= timing.ptime.or(timing.mtime).unwrap_or(now)
}

const EVALUATORS: [(Right, Evaluator); 6] = [
    (Right::Read, granted),
    (Right::PubRead, published),
    (Right::Write, granted),
    (Right::Create, granted),
    (Right::Destroy, granted),
    (Right::Admin, granted),
];

impl Right {
    /// Every content right, in ACL order.
    pub const CONTENT: [Right; 6] = [
        Right::Read,
        Right::PubRead,
        Right::Write,
        Right::Create,
        Right::Destroy,
        Right::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::PubRead => "pubread",
            Self::Write => "write",
            Self::Create => "create",
            Self::Destroy => "destroy",
            Self::Admin => "admin",
        }
    }

    /// Apply this right's evaluator to an ACL grant.
    pub fn refine(self, granted: bool, timing: &Timing, now: i64) -> bool {
        granted
            && EVALUATORS
                .iter()
                .find(|(right, _)| *right == self)
                .is_some_and(|(_, evaluate)| evaluate(timing, now))
    }
}

impl fmt::Display for Right {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Right {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::CONTENT
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown right {s:?}"))
    }
}
