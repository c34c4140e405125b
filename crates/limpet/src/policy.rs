//! Registered policies and the framework-outcome error axis.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ClientData;
use crate::host::Host;

/// Errors raised by the policy machinery itself.
///
/// These report wiring faults — a malformed context, a missing required
/// field — never security verdicts. A rejected operation is expressed as
/// [`Decision::Denied`](crate::Decision::Denied), which is a normal value,
/// not an error. The two axes must never be conflated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The dispatcher supplied no per-call data at all.
    #[error("invalid policy clientData")]
    InvalidClientData,
    /// The per-call data does not carry a policy context.
    #[error("policy clientData is not a policyContext object")]
    NotAPolicyContext,
    /// The context payload does not carry a script object.
    #[error("invalid script")]
    InvalidScript,
    /// The context payload does not name a file.
    #[error("invalid file name")]
    InvalidFileName,
    /// The context does not record an originating plugin.
    #[error("invalid plugin")]
    InvalidPlugin,
    /// The context does not reference the executable object being gated.
    #[error("policyContext does not contain an executable object")]
    MissingExecutable,
    /// A safe interpreter asked for a foreign resource it may not use.
    #[error("permission denied: safe interpreter cannot use {kind} from {origin:?}")]
    PermissionDenied {
        /// The kind of resource that was refused ("type", "object").
        kind: &'static str,
        /// Where the resource request came from.
        origin: String,
    },
}

/// Result of running the policy machinery. `Err` means the mechanism
/// itself faulted, independent of any vote recorded on the context.
pub type PolicyResult<T> = Result<T, PolicyError>;

bitflags! {
    /// Capability flags carried by a registered policy.
    ///
    /// The kind flags tag what a policy gates; hosts may use them for their
    /// own dispatch decisions. [`ARGUMENTS`](PolicyFlags::ARGUMENTS) and
    /// [`SPLIT_LIST`](PolicyFlags::SPLIT_LIST) control how the script
    /// strategy merges the argument list into its script text.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PolicyFlags: u32 {
        /// Gates invocation of a command.
        const COMMAND = 1 << 0;
        /// Gates sub-command selection of an ensemble.
        const SUB_COMMAND = 1 << 1;
        /// Gates loading from a file or remote origin.
        const URI = 1 << 2;
        /// Gates loading from a directory.
        const DIRECTORY = 1 << 3;
        /// Gates foreign type instantiation.
        const TYPE = 1 << 4;
        /// Merge the argument list into the policy script before running it.
        const ARGUMENTS = 1 << 5;
        /// Parse the policy script as a list and append the arguments as a
        /// single element, instead of concatenating their string form.
        const SPLIT_LIST = 1 << 6;
    }
}

/// Diagnostic identity of a policy: the scope that declared it and the
/// function implementing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyName {
    /// Module or type that declared the evaluator.
    pub scope: String,
    /// Function name of the evaluator.
    pub method: String,
}

impl PolicyName {
    /// Name a policy by its declaring scope and function.
    pub fn new(scope: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.scope, self.method)
    }
}

/// A policy evaluator: inspects one pending operation and records a vote on
/// its context.
///
/// The returned outcome reports whether the evaluation mechanism ran
/// cleanly; it is independent of the vote. An evaluator that cannot
/// positively assess an operation (wrong target, missing optional field)
/// returns `Ok(())` and leaves the decision untouched.
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate one gated operation.
    fn evaluate(
        &self,
        host: &dyn Host,
        data: &mut ClientData<'_>,
        arguments: &[String],
    ) -> PolicyResult<()>;
}

impl<F> PolicyEvaluator for F
where
    F: Fn(&dyn Host, &mut ClientData<'_>, &[String]) -> PolicyResult<()> + Send + Sync,
{
    fn evaluate(
        &self,
        host: &dyn Host,
        data: &mut ClientData<'_>,
        arguments: &[String],
    ) -> PolicyResult<()> {
        self(host, data, arguments)
    }
}

/// A named, stateless evaluator registered with an interpreter.
///
/// Policies are registered once at interpreter initialization and live for
/// the interpreter's lifetime; all per-operation state lives on the
/// [`PolicyContext`](crate::PolicyContext) instead.
pub struct Policy {
    name: PolicyName,
    origin: Option<String>,
    flags: PolicyFlags,
    evaluator: Box<dyn PolicyEvaluator>,
}

impl Policy {
    /// Create a policy from an evaluator and its diagnostic name.
    pub fn new(name: PolicyName, evaluator: impl PolicyEvaluator + 'static) -> Self {
        Self {
            name,
            origin: None,
            flags: PolicyFlags::empty(),
            evaluator: Box::new(evaluator),
        }
    }

    /// Tag the plugin or module that supplied this policy.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Set the capability flags.
    #[must_use]
    pub fn with_flags(mut self, flags: PolicyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The policy's diagnostic name.
    pub fn name(&self) -> &PolicyName {
        &self.name
    }

    /// The plugin or module that supplied this policy, if tagged.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// The policy's capability flags.
    pub fn flags(&self) -> PolicyFlags {
        self.flags
    }

    /// Run the evaluator for one gated operation.
    pub fn evaluate(
        &self,
        host: &dyn Host,
        data: &mut ClientData<'_>,
        arguments: &[String],
    ) -> PolicyResult<()> {
        tracing::trace!(policy = %self.name, "evaluating policy");
        self.evaluator.evaluate(host, data, arguments)
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
