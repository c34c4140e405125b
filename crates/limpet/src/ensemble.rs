//! Sub-command resolution for ensemble (multi-verb) commands.
//!
//! An ensemble's first argument selects a sub-command. For policy checking
//! the interesting set is not the full table but the names a restricted
//! script is allowed to see: an explicit allow-list (or the full table)
//! minus an explicit deny-list. The derived name set is cached on the
//! ensemble and revalidated against the table size, so sub-commands added
//! or removed at runtime (plugin loading) are never served from a stale
//! cache.

use std::collections::BTreeSet;
use std::sync::RwLock;

use thiserror::Error;

use crate::host::Host;

/// Failure to resolve a candidate sub-command name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No visible sub-command matches the candidate.
    #[error("unknown sub-command {0:?}")]
    Unknown(String),
    /// More than one visible sub-command starts with the candidate.
    #[error("ambiguous sub-command {0:?}")]
    Ambiguous(String),
}

/// Allow/deny lists an ensemble declares for policy checking.
///
/// An ensemble carrying these (even empty) is policy-aware; one without
/// them exposes only its raw table and is never filtered.
#[derive(Debug, Clone, Default)]
struct PolicyLists {
    allowed: Option<BTreeSet<String>>,
    disallowed: Option<BTreeSet<String>>,
}

/// Names derived for an ensemble, valid only while the table size matches.
#[derive(Debug, Clone)]
struct NameCache {
    table_len: usize,
    names: BTreeSet<String>,
}

/// The sub-command table of an ensemble command.
#[derive(Debug)]
pub struct Ensemble {
    name: String,
    entries: BTreeSet<String>,
    policy_lists: Option<PolicyLists>,
    cache: RwLock<Option<NameCache>>,
}

impl Ensemble {
    /// An ensemble with the given sub-commands and no policy lists.
    pub fn new<I, S>(name: impl Into<String>, sub_commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            entries: sub_commands.into_iter().map(Into::into).collect(),
            policy_lists: None,
            cache: RwLock::new(None),
        }
    }

    /// Declare the sub-commands restricted scripts may use. Marks the
    /// ensemble policy-aware.
    #[must_use]
    pub fn with_allow_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy_lists
            .get_or_insert_with(PolicyLists::default)
            .allowed = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Declare the sub-commands withheld from restricted scripts. Marks the
    /// ensemble policy-aware.
    #[must_use]
    pub fn with_deny_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy_lists
            .get_or_insert_with(PolicyLists::default)
            .disallowed = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// The name the ensemble command is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full sub-command table, unfiltered.
    pub fn sub_commands(&self) -> &BTreeSet<String> {
        &self.entries
    }

    /// The number of registered sub-commands.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a sub-command at runtime.
    pub fn add_sub_command(&mut self, name: impl Into<String>) {
        self.entries.insert(name.into());
    }

    /// Remove a sub-command at runtime.
    pub fn remove_sub_command(&mut self, name: &str) {
        self.entries.remove(name);
    }

    /// The sub-command names relevant for policy checking.
    ///
    /// With `allowed` set, this is the explicit allow-list (or the full
    /// table when none is declared) minus the explicit deny-list; without
    /// it, the explicit deny-list verbatim — `None` when the ensemble
    /// declares none, which is distinct from an empty list. An ensemble
    /// that is not policy-aware always yields its raw table.
    ///
    /// The computed allowed set is cached keyed by the current table size;
    /// a size mismatch forces recomputation.
    pub fn resolve_names(&self, allowed: bool) -> Option<BTreeSet<String>> {
        let Some(lists) = &self.policy_lists else {
            // Not policy-aware: the raw table, no filtering.
            return Some(self.entries.clone());
        };

        if !allowed {
            return lists.disallowed.clone();
        }

        if let Ok(cache) = self.cache.read()
            && let Some(cache) = cache.as_ref()
            && cache.table_len == self.entries.len()
        {
            return Some(cache.names.clone());
        }

        let possible = lists.allowed.as_ref().unwrap_or(&self.entries);
        let names: BTreeSet<String> = match &lists.disallowed {
            Some(disallowed) => possible.difference(disallowed).cloned().collect(),
            None => possible.clone(),
        };

        tracing::trace!(
            ensemble = %self.name,
            visible = names.len(),
            table = self.entries.len(),
            "recomputed allowed sub-command names"
        );

        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(NameCache {
                table_len: self.entries.len(),
                names: names.clone(),
            });
        }

        Some(names)
    }

    /// The sub-command names visible to the given interpreter: the raw
    /// table for a trusted interpreter, the policy-filtered set for a safe
    /// one.
    pub fn visible_names(&self, host: &dyn Host) -> Option<BTreeSet<String>> {
        if host.is_safe() {
            self.resolve_names(true)
        } else {
            Some(self.entries.clone())
        }
    }

    /// Restrict candidate names to the visible set.
    ///
    /// Used when ambiguous-abbreviation candidates must be pruned before
    /// resolution, so a restricted script cannot learn that a hidden
    /// sub-command exists from an ambiguity error.
    pub fn filter_to_allowed(&self, host: &dyn Host, candidates: &[String]) -> Vec<String> {
        match self.visible_names(host) {
            Some(visible) => candidates
                .iter()
                .filter(|candidate| visible.contains(*candidate))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Resolve a possibly-abbreviated sub-command name against the names
    /// visible to the given interpreter.
    ///
    /// An exact match always wins; otherwise the candidate must be a
    /// unique prefix of one visible name.
    ///
    /// # Errors
    ///
    /// [`ResolveError::Unknown`] when nothing matches,
    /// [`ResolveError::Ambiguous`] when several names share the prefix.
    pub fn resolve_sub_command(
        &self,
        host: &dyn Host,
        candidate: &str,
    ) -> Result<String, ResolveError> {
        let Some(visible) = self.visible_names(host) else {
            return Err(ResolveError::Unknown(candidate.to_string()));
        };

        if visible.contains(candidate) {
            return Ok(candidate.to_string());
        }

        if candidate.is_empty() {
            return Err(ResolveError::Unknown(String::new()));
        }

        let mut matches = visible.iter().filter(|name| name.starts_with(candidate));
        match (matches.next(), matches.next()) {
            (Some(name), None) => Ok(name.clone()),
            (Some(_), Some(_)) => Err(ResolveError::Ambiguous(candidate.to_string())),
            (None, _) => Err(ResolveError::Unknown(candidate.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::RwLock as HostLock;

    use crate::decision::EvalResult;
    use crate::host::{CommandDescriptor, CommandHandle, TrustLists};
    use crate::trust::Origin;

    struct FixedHost {
        safe: bool,
        lists: HostLock<TrustLists>,
    }

    impl FixedHost {
        fn safe() -> Self {
            Self {
                safe: true,
                lists: HostLock::new(TrustLists::default()),
            }
        }

        fn trusted() -> Self {
            Self {
                safe: false,
                lists: HostLock::new(TrustLists::default()),
            }
        }
    }

    impl Host for FixedHost {
        fn evaluate_script(&self, _text: &str) -> EvalResult {
            EvalResult::ok("")
        }

        fn trust_lists(&self) -> &HostLock<TrustLists> {
            &self.lists
        }

        fn resolve_command(&self, _descriptor: &CommandDescriptor) -> Option<CommandHandle> {
            None
        }

        fn base_directory_substitute(&self, path: &Path) -> PathBuf {
            path.to_path_buf()
        }

        fn initialized_path(&self) -> Option<PathBuf> {
            None
        }

        fn origin(&self) -> Option<Origin> {
            None
        }

        fn is_safe(&self) -> bool {
            self.safe
        }
    }

    fn file_like() -> Ensemble {
        Ensemble::new(
            "file",
            ["channels", "dirname", "join", "split", "delete", "rename"],
        )
        .with_allow_list(["channels", "dirname", "join", "split"])
    }

    #[test]
    fn test_raw_table_when_not_policy_aware() {
        let ensemble = Ensemble::new("clock", ["format", "seconds"]);
        let names = ensemble.resolve_names(true).unwrap();
        assert_eq!(names.len(), 2);
        // Without policy lists the deny-mode resolution also falls back to
        // the raw table.
        assert_eq!(ensemble.resolve_names(false).unwrap().len(), 2);
    }

    #[test]
    fn test_allow_list_resolution() {
        let ensemble = file_like();
        let names = ensemble.resolve_names(true).unwrap();
        assert!(names.contains("join"));
        assert!(!names.contains("delete"));
    }

    #[test]
    fn test_allow_list_minus_deny_list() {
        let ensemble = file_like().with_deny_list(["dirname"]);
        let names = ensemble.resolve_names(true).unwrap();
        assert!(names.contains("join"));
        assert!(!names.contains("dirname"));
    }

    #[test]
    fn test_deny_mode_returns_deny_list_verbatim() {
        let ensemble = Ensemble::new("package", ["require", "provide", "scan", "reset"])
            .with_deny_list(["scan", "reset"]);
        let names = ensemble.resolve_names(false).unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("scan"));

        // Policy-aware but no deny list: absent, not empty.
        let bare = Ensemble::new("info", ["vars"]).with_allow_list(["vars"]);
        assert!(bare.resolve_names(false).is_none());
    }

    #[test]
    fn test_cache_invalidated_by_table_growth() {
        let mut ensemble = Ensemble::new("string", ["length", "index"]).with_deny_list(["index"]);

        let names = ensemble.resolve_names(true).unwrap();
        assert!(!names.contains("reverse"));

        ensemble.add_sub_command("reverse");

        // The table size changed, so the cached set must not be reused.
        let names = ensemble.resolve_names(true).unwrap();
        assert!(names.contains("reverse"));
        assert!(!names.contains("index"));
    }

    #[test]
    fn test_visible_names_follow_safe_mode() {
        let ensemble = file_like();

        let safe = ensemble.visible_names(&FixedHost::safe()).unwrap();
        assert!(!safe.contains("delete"));

        let trusted = ensemble.visible_names(&FixedHost::trusted()).unwrap();
        assert!(trusted.contains("delete"));
    }

    #[test]
    fn test_filter_to_allowed() {
        let ensemble = file_like();
        let host = FixedHost::safe();

        let candidates = vec![
            "delete".to_string(),
            "dirname".to_string(),
            "join".to_string(),
        ];
        let filtered = ensemble.filter_to_allowed(&host, &candidates);
        assert_eq!(filtered, vec!["dirname".to_string(), "join".to_string()]);
    }

    #[test]
    fn test_resolve_exact_and_prefix() {
        let ensemble = file_like();
        let host = FixedHost::safe();

        assert_eq!(ensemble.resolve_sub_command(&host, "join").unwrap(), "join");
        assert_eq!(
            ensemble.resolve_sub_command(&host, "sp").unwrap(),
            "split"
        );
    }

    #[test]
    fn test_resolve_hides_disallowed_names() {
        let ensemble = file_like();
        let host = FixedHost::safe();

        // "delete" exists in the table but is not policy-visible; a safe
        // script must not discover it.
        assert_eq!(
            ensemble.resolve_sub_command(&host, "del"),
            Err(ResolveError::Unknown("del".to_string()))
        );

        // "d" is unambiguous among visible names even though the raw table
        // has both "delete" and "dirname".
        assert_eq!(
            ensemble.resolve_sub_command(&host, "d").unwrap(),
            "dirname"
        );
    }

    #[test]
    fn test_resolve_ambiguous() {
        let ensemble = Ensemble::new("x", ["stat", "start", "stop"]);
        let host = FixedHost::trusted();
        assert_eq!(
            ensemble.resolve_sub_command(&host, "st"),
            Err(ResolveError::Ambiguous("st".to_string()))
        );
    }
}
