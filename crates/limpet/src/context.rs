//! Per-operation policy context and the extraction layer.
//!
//! The dispatcher builds one [`PolicyContext`] for each gated operation,
//! hands it through [`ClientData`] to every registered policy in turn, then
//! reads the accumulated decision and discards the context. Contexts are
//! never shared across threads or reused across operations.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decision::{Decision, EvalResult};
use crate::host::{CommandDescriptor, CommandHandle, Host};
use crate::policy::{PolicyError, PolicyResult};

/// A script supplied to the interpreter, with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSource {
    /// The script text.
    pub text: String,
    /// The file or resource the text was read from, when known.
    pub location: Option<String>,
}

impl ScriptSource {
    /// A script with no recorded location.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
        }
    }
}

/// The plugin or module a gated operation originated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginRef {
    /// The plugin's registered name.
    pub name: String,
    /// Whether the plugin runs in an isolated execution domain. The engine
    /// records this for diagnostics only; command resolution for isolated
    /// plugins is the host resolver's concern.
    pub isolated: bool,
}

impl PluginRef {
    /// Reference a plugin loaded into the interpreter's own domain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isolated: false,
        }
    }

    /// Reference a plugin running in an isolated execution domain.
    pub fn isolated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isolated: true,
        }
    }
}

/// Operation-specific inputs carried by a policy context.
///
/// One shape per category of gated operation; the extraction accessors on
/// [`PolicyContext`] pattern-match on these, so a policy asking for a field
/// the operation does not have gets an explicit error instead of a silent
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationPayload {
    /// A command invocation; the inputs are the raw arguments themselves.
    Command,
    /// A script object being handed to the interpreter.
    Script(ScriptSource),
    /// A file (or remote location) being loaded.
    FileName(String),
    /// Dynamically supplied text, possibly empty.
    Text(String),
    /// Text plus the undecoded bytes it was read from.
    TextWithBytes {
        /// The decoded text.
        text: String,
        /// The raw bytes the text was decoded from.
        bytes: Vec<u8>,
    },
}

/// Per-operation payload carrying the gated target, the operation inputs,
/// and the accumulated vote.
pub struct PolicyContext {
    target: Option<CommandHandle>,
    plugin: Option<PluginRef>,
    payload: OperationPayload,
    decision: Decision,
    reason: Option<String>,
    result: Option<EvalResult>,
}

impl PolicyContext {
    /// A context for an operation with the given payload and no recorded
    /// vote.
    pub fn new(payload: OperationPayload) -> Self {
        Self {
            target: None,
            plugin: None,
            payload,
            decision: Decision::None,
            reason: None,
            result: None,
        }
    }

    /// Attach the executable target being gated.
    #[must_use]
    pub fn with_target(mut self, target: CommandHandle) -> Self {
        self.target = Some(target);
        self
    }

    /// Attach the plugin the operation originated from.
    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginRef) -> Self {
        self.plugin = Some(plugin);
        self
    }

    /// Seed the decision the chain starts from. With last-writer-wins
    /// voting an original `Denied` stands unless a later policy overrides
    /// it.
    #[must_use]
    pub fn with_original_decision(mut self, decision: Decision) -> Self {
        self.decision = decision;
        self
    }

    /// The current decision.
    pub fn decision(&self) -> Decision {
        self.decision
    }

    /// The reason attached to the most recent vote, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// The informational result attached by a policy, if any.
    pub fn result(&self) -> Option<&EvalResult> {
        self.result.as_ref()
    }

    /// Attach an informational result for the dispatcher to surface.
    pub fn set_result(&mut self, result: EvalResult) {
        self.result = Some(result);
    }

    /// The executable target being gated, if one is attached.
    pub fn target(&self) -> Option<&CommandHandle> {
        self.target.as_ref()
    }

    /// The operation payload.
    pub fn payload(&self) -> &OperationPayload {
        &self.payload
    }

    fn vote(&mut self, decision: Decision) {
        tracing::trace!(previous = ?self.decision, ?decision, "recording policy vote");
        self.decision = decision;
    }

    /// Vote to allow the operation.
    pub fn approve(&mut self) {
        self.vote(Decision::Approved);
    }

    /// Vote to allow the operation, recording why.
    pub fn approve_with_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
        self.approve();
    }

    /// Vote to reject the operation.
    pub fn deny(&mut self) {
        self.vote(Decision::Denied);
    }

    /// Vote to reject the operation, recording why. The reason is visible
    /// from inside the safe interpreter, so it must not leak sensitive
    /// information.
    pub fn deny_with_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
        self.deny();
    }

    /// Explicitly abstain with insufficient information.
    pub fn undecide(&mut self) {
        self.vote(Decision::Undecided);
    }

    /// Explicitly abstain, recording why.
    pub fn undecide_with_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
        self.undecide();
    }

    /// Whether the current decision is `Approved`.
    pub fn is_approved(&self) -> bool {
        self.decision.is_approved()
    }

    /// Whether the current decision is `Denied`.
    pub fn is_denied(&self) -> bool {
        self.decision.is_denied()
    }

    /// Whether the current decision is `Undecided`.
    pub fn is_undecided(&self) -> bool {
        self.decision.is_undecided()
    }

    /// The plugin the operation originated from.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidPlugin`] when no plugin is recorded.
    pub fn plugin(&self) -> PolicyResult<&PluginRef> {
        self.plugin.as_ref().ok_or(PolicyError::InvalidPlugin)
    }

    /// The script object this operation supplies.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidScript`] when the payload carries no script.
    pub fn script(&self) -> PolicyResult<&ScriptSource> {
        match &self.payload {
            OperationPayload::Script(script) => Ok(script),
            _ => Err(PolicyError::InvalidScript),
        }
    }

    /// The file name this operation loads from.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidFileName`] when the payload names no file, or
    /// names an empty one.
    pub fn file_name(&self) -> PolicyResult<&str> {
        match &self.payload {
            OperationPayload::FileName(name) if !name.is_empty() => Ok(name),
            _ => Err(PolicyError::InvalidFileName),
        }
    }

    /// The text this operation supplies.
    ///
    /// Unlike the other accessors this never fails: a payload without text
    /// reads as empty, because an empty script is a legal operation.
    pub fn text(&self) -> &str {
        match &self.payload {
            OperationPayload::Text(text) => text,
            OperationPayload::TextWithBytes { text, .. } => text,
            OperationPayload::Script(script) => &script.text,
            _ => "",
        }
    }

    /// The text this operation supplies together with the raw bytes it was
    /// read from, when the operation kept them.
    pub fn text_and_bytes(&self) -> (&str, Option<&[u8]>) {
        match &self.payload {
            OperationPayload::TextWithBytes { text, bytes } => (text, Some(bytes)),
            _ => (self.text(), None),
        }
    }

    /// Locate the live command the caller expects to gate and compare it by
    /// identity to this operation's target.
    ///
    /// A `None` descriptor skips the comparison and reports that a target
    /// is attached. A descriptor the host cannot resolve yields `false`
    /// rather than an error — the policy simply is not about this command.
    ///
    /// # Errors
    ///
    /// [`PolicyError::MissingExecutable`] when the context has no
    /// executable target at all; that is a dispatcher wiring fault.
    pub fn command_match(
        &self,
        host: &dyn Host,
        descriptor: Option<&CommandDescriptor>,
    ) -> PolicyResult<bool> {
        let target = self
            .target
            .as_ref()
            .ok_or(PolicyError::MissingExecutable)?;

        match descriptor {
            Some(descriptor) => match host.resolve_command(descriptor) {
                Some(command) => Ok(Arc::ptr_eq(target, &command)),
                None => Ok(false),
            },
            None => Ok(true),
        }
    }
}

impl fmt::Debug for PolicyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyContext")
            .field("target", &self.target.as_ref().map(|t| t.name()))
            .field("plugin", &self.plugin)
            .field("payload", &self.payload)
            .field("decision", &self.decision)
            .field("reason", &self.reason)
            .field("result", &self.result)
            .finish()
    }
}

/// Opaque per-call data handed to a policy evaluator by the dispatcher.
///
/// Policy evaluators share their signature with other host callbacks, so
/// the data that arrives is not guaranteed to be a policy context.
/// Recovering the context is the first step of every evaluator and fails
/// explicitly when the dispatcher was wired incorrectly.
pub enum ClientData<'a> {
    /// No per-call data was supplied.
    Empty,
    /// Host-defined data that does not carry a policy context.
    Foreign(&'a dyn Any),
    /// The policy context for the pending operation.
    Context(&'a mut PolicyContext),
}

impl fmt::Debug for ClientData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientData::Empty => f.write_str("ClientData::Empty"),
            ClientData::Foreign(_) => f.write_str("ClientData::Foreign(..)"),
            ClientData::Context(context) => {
                f.debug_tuple("ClientData::Context").field(context).finish()
            }
        }
    }
}

impl ClientData<'_> {
    /// Recover the policy context from the per-call data.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidClientData`] when no data was supplied,
    /// [`PolicyError::NotAPolicyContext`] when the data is something else.
    pub fn policy_context(&mut self) -> PolicyResult<&mut PolicyContext> {
        match self {
            ClientData::Context(context) => Ok(context),
            ClientData::Empty => Err(PolicyError::InvalidClientData),
            ClientData::Foreign(_) => Err(PolicyError::NotAPolicyContext),
        }
    }
}
