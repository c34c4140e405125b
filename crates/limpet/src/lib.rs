//! Limpet: policy engine for interpreters that run untrusted scripts.
//!
//! An embeddable, command-based interpreter that supports a restricted
//! ("safe") execution mode consults a chain of registered [`Policy`] values
//! before a sensitive operation runs: invoking a sub-command of a
//! multi-verb command, loading a script from a file or remote origin,
//! instantiating a foreign type, or running dynamically supplied policy
//! logic. Each policy inspects the pending operation through a
//! [`PolicyContext`] and records a vote; the dispatcher reads the
//! accumulated [`Decision`] and lets the operation proceed only on
//! success.
//!
//! Two failure axes are kept strictly apart. The framework outcome
//! ([`PolicyResult`]) reports whether the policy machinery itself ran
//! without fault; the [`Decision`] is the security verdict, and `Denied` is
//! a normal value there, not an error. A chain that never votes counts as
//! success so that un-policed operations keep working; user-supplied
//! callback and script policies, by contrast, deny on anything but an
//! explicit success outcome.
//!
//! The engine is deliberately host-agnostic: everything it needs from the
//! interpreter — script evaluation, the mutable trust lists, command
//! resolution, path substitution — comes in through the [`Host`] trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use limpet::{ClientData, OperationPayload, PolicyContext, default_policies, is_success};
//!
//! let policies = default_policies();
//! let mut context = PolicyContext::new(OperationPayload::Command)
//!     .with_target(file_command.clone());
//!
//! for policy in &policies {
//!     let outcome = policy.evaluate(&host, &mut ClientData::Context(&mut context), &arguments);
//!     if !is_success(&outcome, context.decision()) {
//!         // refuse the operation
//!     }
//! }
//! ```

mod context;
mod decision;
mod defaults;
mod ensemble;
mod host;
mod list;
mod policy;
mod strategy;
mod trust;

pub use context::{ClientData, OperationPayload, PluginRef, PolicyContext, ScriptSource};
pub use decision::{Decision, EvalResult, ReturnCode, is_success};
pub use defaults::{
    ALLOWED_FILE_SUB_COMMANDS, ALLOWED_INFO_SUB_COMMANDS, ALLOWED_INTERP_SUB_COMMANDS,
    ALLOWED_OBJECT_SUB_COMMANDS, DISALLOWED_PACKAGE_SUB_COMMANDS, default_policies,
};
pub use ensemble::{Ensemble, ResolveError};
pub use host::{CommandDescriptor, CommandHandle, CommandTarget, Host, TrustLists};
pub use list::{ListError, join_list, split_list};
pub use policy::{Policy, PolicyError, PolicyEvaluator, PolicyFlags, PolicyName, PolicyResult};
pub use strategy::{
    PolicyCallback, callback_policy, directory_policy, script_policy, sub_command_policy,
    type_policy, uri_policy,
};
pub use trust::{
    ObjectFlags, Origin, TypeIdentity, check_trusted_object, check_trusted_type, remote_origin,
    trusted_directories, trusted_origins, trusted_types,
};
