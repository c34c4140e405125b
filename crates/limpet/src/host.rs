//! The boundary between the policy engine and the host interpreter.
//!
//! The engine never reaches into interpreter internals. Everything it needs
//! — script evaluation, the mutable trust lists, command lookup, path
//! substitution — is consumed through the [`Host`] trait, so embedders
//! decide how those are implemented (including whether command resolution
//! crosses an isolated execution domain; the engine only ever compares the
//! resulting handles by identity).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::decision::EvalResult;
use crate::ensemble::Ensemble;
use crate::trust::{Origin, TypeIdentity};

/// A live executable command object registered with the host.
///
/// Handles are compared by identity ([`Arc::ptr_eq`]): two handles match
/// only when they refer to the same registered object, never by name or
/// structural equality.
pub type CommandHandle = Arc<dyn CommandTarget>;

/// A host command that can be gated by policies.
pub trait CommandTarget: Send + Sync + fmt::Debug {
    /// The name the command is registered under.
    fn name(&self) -> &str;

    /// The sub-command table, when this command is an ensemble.
    fn ensemble(&self) -> Option<&Ensemble>;
}

/// Identifies the command a policy expects to gate.
///
/// The host resolves a descriptor to a [`CommandHandle`] however it sees
/// fit — by registration name, by token, through an isolated plugin scope —
/// and the engine compares the result to the context's target by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandDescriptor {
    /// The name the command was registered under.
    Name(String),
    /// The registration token issued when the command was added.
    Token(u64),
}

impl CommandDescriptor {
    /// Descriptor for a command registered under `name`.
    pub fn name(name: impl Into<String>) -> Self {
        CommandDescriptor::Name(name.into())
    }
}

/// The interpreter-owned mutable trust lists.
///
/// Scripts can grow these at runtime (e.g. a trusted script granting
/// additional trusted paths), which is why the trust registries are rebuilt
/// from them on every policy evaluation rather than cached.
#[derive(Debug, Clone, Default)]
pub struct TrustLists {
    /// Directories scripts may be loaded from.
    pub paths: Vec<PathBuf>,
    /// Remote origins scripts may be loaded from.
    pub origins: Vec<Origin>,
    /// Foreign types safe scripts may instantiate.
    pub types: Vec<TypeIdentity>,
}

/// Host interpreter services consumed by the policy engine.
///
/// Implementations must be safe to call re-entrantly: the callback and
/// script strategies run user code which may itself trigger another policy
/// check. The engine never holds the [`TrustLists`] lock while doing so.
pub trait Host: Send + Sync {
    /// Evaluate a policy script and report its outcome.
    fn evaluate_script(&self, text: &str) -> EvalResult;

    /// The interpreter's mutable trust lists, behind its reader lock.
    fn trust_lists(&self) -> &RwLock<TrustLists>;

    /// Resolve a descriptor to the live command it names, if any.
    ///
    /// Lookup strategy (direct registry, isolated plugin scope) is the
    /// host's concern; callers only compare the handle by identity.
    fn resolve_command(&self, descriptor: &CommandDescriptor) -> Option<CommandHandle>;

    /// Apply the interpreter's base-directory substitution to a path, so
    /// relative and virtual paths resolve consistently.
    fn base_directory_substitute(&self, path: &Path) -> PathBuf;

    /// The directory this interpreter was initialized from, if known.
    /// Always trusted for script loading.
    fn initialized_path(&self) -> Option<PathBuf>;

    /// The origin the interpreter's own code was loaded from, if any.
    /// Trusted for remote script loading when secure.
    fn origin(&self) -> Option<Origin>;

    /// Whether this interpreter runs scripts in restricted (safe) mode.
    fn is_safe(&self) -> bool;
}
