//! Vote algebra for policy decisions.

use serde::{Deserialize, Serialize};

use crate::policy::PolicyResult;

/// The vote recorded on a pending operation.
///
/// A context holds exactly one decision; policies run in registration order
/// and the last writer wins, so a later `Denied` overrides an earlier
/// `Approved`. Enforcing that ordering is the dispatcher's job, not the
/// data model's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// No policy has voted yet.
    #[default]
    None,
    /// A policy affirmatively allowed the operation.
    Approved,
    /// A policy affirmatively rejected the operation.
    Denied,
    /// A policy explicitly abstained with insufficient information.
    Undecided,
}

impl Decision {
    /// Whether this decision permits the gated operation to proceed.
    ///
    /// `None` counts as success: a policy chain that never votes must
    /// default to "allowed" so that un-policed operations are not silently
    /// broken. Everything except `None` and `Approved` is a failure.
    pub fn is_success(self) -> bool {
        matches!(self, Decision::None | Decision::Approved)
    }

    /// Whether no vote has been recorded.
    pub fn is_none(self) -> bool {
        self == Decision::None
    }

    /// Whether the operation was affirmatively allowed.
    pub fn is_approved(self) -> bool {
        self == Decision::Approved
    }

    /// Whether the operation was affirmatively rejected.
    pub fn is_denied(self) -> bool {
        self == Decision::Denied
    }

    /// Whether a policy explicitly abstained.
    pub fn is_undecided(self) -> bool {
        self == Decision::Undecided
    }
}

/// Success of a complete policy evaluation.
///
/// The framework outcome and the recorded decision are independent axes: an
/// evaluator that errored out is always a failure, regardless of any vote it
/// managed to record before failing.
pub fn is_success<T>(outcome: &PolicyResult<T>, decision: Decision) -> bool {
    outcome.is_ok() && decision.is_success()
}

/// Outcome code of a host script or callback evaluation.
///
/// These follow the host interpreter's control-flow codes; policy strategies
/// map them onto votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnCode {
    /// Evaluation completed normally.
    Ok,
    /// Evaluation raised an error.
    Error,
    /// Evaluation returned early. Not a valid policy outcome.
    Return,
    /// Evaluation broke out of the surrounding loop.
    Break,
    /// Evaluation continued the surrounding loop.
    Continue,
}

impl ReturnCode {
    /// Whether this code reports normal completion.
    pub fn is_ok(self) -> bool {
        self == ReturnCode::Ok
    }
}

/// The outcome of running host code: a return code plus its result text.
///
/// Policies attach one of these to their context as the informational
/// result, so the dispatcher can report why a decision was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResult {
    /// Outcome code reported by the callback or script.
    pub code: ReturnCode,
    /// Result text reported alongside the code.
    pub value: String,
}

impl EvalResult {
    /// A normal-completion result carrying the given text.
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            code: ReturnCode::Ok,
            value: value.into(),
        }
    }

    /// An error result carrying the given message.
    pub fn error(value: impl Into<String>) -> Self {
        Self {
            code: ReturnCode::Error,
            value: value.into(),
        }
    }
}
