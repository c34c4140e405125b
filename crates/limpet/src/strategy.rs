//! The built-in policy strategies.
//!
//! Every strategy follows the same contract: verify the operation targets
//! the command the policy was registered for, evaluate its category of
//! evidence, and vote on the context. An operation the strategy cannot
//! positively evaluate — wrong target, missing argument, unresolvable
//! candidate — is left without a vote and the evaluation still succeeds.
//! Silence is not approval: it leaves the decision to the rest of the
//! chain, and a chain that stays silent defaults to allowed.

use std::collections::BTreeSet;
use std::path::Path;

use crate::context::{ClientData, PolicyContext};
use crate::decision::{EvalResult, ReturnCode};
use crate::host::{CommandDescriptor, Host};
use crate::list;
use crate::policy::{PolicyFlags, PolicyResult};
use crate::trust::{Origin, TypeIdentity};

/// Caller-supplied dynamic policy logic: receives the argument list of the
/// gated operation and reports an outcome the engine maps onto a vote.
pub type PolicyCallback = dyn Fn(&[String]) -> EvalResult + Send + Sync;

/// Map a host outcome code onto a vote.
///
/// Anything that is not an explicit approval, abstention, or undecided
/// signal counts as a denial — the conservative default for user-supplied
/// policy logic.
fn apply_vote(context: &mut PolicyContext, code: ReturnCode) {
    match code {
        ReturnCode::Ok => context.approve(),
        // No vote at all: distinct from both approval and undecided.
        ReturnCode::Break => {}
        ReturnCode::Continue => context.undecide(),
        ReturnCode::Error | ReturnCode::Return => context.deny(),
    }
}

/// Gate an ensemble invocation on its selected sub-command.
///
/// The candidate is the second argument (`<command> <subcommand> ...`),
/// resolved through the ensemble's abbreviation logic restricted to
/// policy-visible names. With `allowed` set the vote is `Approved` when the
/// resolved name is in `names`; in deny mode when it is absent. The
/// resolved name is attached as the informational result. When `names` is
/// `None` the set is resolved from the ensemble itself.
///
/// # Errors
///
/// Fails only on extraction faults: missing context or missing executable
/// target.
pub fn sub_command_policy(
    host: &dyn Host,
    descriptor: Option<&CommandDescriptor>,
    names: Option<&BTreeSet<String>>,
    allowed: bool,
    data: &mut ClientData<'_>,
    arguments: &[String],
) -> PolicyResult<()> {
    let context = data.policy_context()?;
    if !context.command_match(host, descriptor)? {
        return Ok(());
    }

    let Some(candidate) = arguments.get(1).map(String::as_str).filter(|c| !c.is_empty()) else {
        return Ok(());
    };

    let Some(target) = context.target().cloned() else {
        return Ok(());
    };
    let Some(ensemble) = target.ensemble() else {
        return Ok(());
    };

    let resolved = match ensemble.resolve_sub_command(host, candidate) {
        Ok(resolved) => resolved,
        Err(error) => {
            tracing::debug!(ensemble = ensemble.name(), %candidate, %error, "no vote");
            return Ok(());
        }
    };

    let computed;
    let names = match names {
        Some(names) => Some(names),
        None => {
            computed = ensemble.resolve_names(allowed);
            computed.as_ref()
        }
    };

    if matches!(names, Some(names) if names.contains(&resolved) == allowed) {
        context.approve();
        context.set_result(EvalResult::ok(resolved));
    }

    Ok(())
}

/// Gate an operation on the trust of a network origin.
///
/// In allow mode the vote is `Approved` when the origin is in the registry;
/// in deny mode when it is not.
///
/// # Errors
///
/// Fails only on extraction faults.
pub fn uri_policy(
    host: &dyn Host,
    descriptor: Option<&CommandDescriptor>,
    origin: &Origin,
    origins: &BTreeSet<Origin>,
    allowed: bool,
    data: &mut ClientData<'_>,
    _arguments: &[String],
) -> PolicyResult<()> {
    let context = data.policy_context()?;
    if !context.command_match(host, descriptor)? {
        return Ok(());
    }

    if origins.contains(origin) == allowed {
        context.approve();
    } else {
        tracing::debug!(%origin, allowed, "origin not approved; no vote");
    }

    Ok(())
}

/// Gate an operation on the trust of the directory a file lives in.
///
/// The containing directory is derived after the host's base-directory
/// substitution; when no directory can be derived the strategy skips
/// silently. Otherwise the membership logic matches [`uri_policy`].
///
/// # Errors
///
/// Fails only on extraction faults.
pub fn directory_policy(
    host: &dyn Host,
    descriptor: Option<&CommandDescriptor>,
    file_name: &str,
    directories: &BTreeSet<std::path::PathBuf>,
    allowed: bool,
    data: &mut ClientData<'_>,
    _arguments: &[String],
) -> PolicyResult<()> {
    let context = data.policy_context()?;
    if !context.command_match(host, descriptor)? {
        return Ok(());
    }

    let substituted = host.base_directory_substitute(Path::new(file_name));
    let Some(directory) = substituted
        .parent()
        .filter(|directory| !directory.as_os_str().is_empty())
    else {
        tracing::debug!(file = %file_name, "no containing directory; no vote");
        return Ok(());
    };

    if directories.contains(directory) == allowed {
        context.approve();
    }

    Ok(())
}

/// Gate an operation on the trust of a foreign type identity.
///
/// # Errors
///
/// Fails only on extraction faults.
pub fn type_policy(
    host: &dyn Host,
    descriptor: Option<&CommandDescriptor>,
    identity: &TypeIdentity,
    types: &BTreeSet<TypeIdentity>,
    allowed: bool,
    data: &mut ClientData<'_>,
    _arguments: &[String],
) -> PolicyResult<()> {
    let context = data.policy_context()?;
    if !context.command_match(host, descriptor)? {
        return Ok(());
    }

    if types.contains(identity) == allowed {
        context.approve();
    }

    Ok(())
}

/// Gate an operation through caller-supplied callback logic.
///
/// The callback receives the raw argument list; its outcome code maps onto
/// the vote (`Ok` approves, `Break` abstains without voting, `Continue`
/// records undecided, anything else denies). Its full outcome is attached
/// as the informational result regardless of the vote, so the dispatcher
/// can report why the decision was made.
///
/// # Errors
///
/// Fails only on extraction faults.
pub fn callback_policy(
    host: &dyn Host,
    descriptor: Option<&CommandDescriptor>,
    callback: &PolicyCallback,
    data: &mut ClientData<'_>,
    arguments: &[String],
) -> PolicyResult<()> {
    let context = data.policy_context()?;
    if !context.command_match(host, descriptor)? {
        return Ok(());
    }

    // The callback runs arbitrary user code and may re-enter the policy
    // chain; no engine lock is held here.
    let outcome = callback(arguments);
    apply_vote(context, outcome.code);
    context.set_result(outcome);

    Ok(())
}

/// Gate an operation through a user-supplied policy script.
///
/// The script is built from the base text and the argument list according
/// to `flags`, evaluated in the designated policy interpreter, and its
/// outcome mapped onto the vote exactly as in [`callback_policy`]. An empty
/// base text is a legal script, not a missing one.
///
/// # Errors
///
/// Fails only on extraction faults.
pub fn script_policy(
    host: &dyn Host,
    descriptor: Option<&CommandDescriptor>,
    policy_host: &dyn Host,
    text: &str,
    flags: PolicyFlags,
    data: &mut ClientData<'_>,
    arguments: &[String],
) -> PolicyResult<()> {
    let context = data.policy_context()?;
    if !context.command_match(host, descriptor)? {
        return Ok(());
    }

    let outcome = evaluate_policy_script(policy_host, text, arguments, flags);
    apply_vote(context, outcome.code);
    context.set_result(outcome);

    Ok(())
}

/// Build and run a policy script.
///
/// In list mode the base text is parsed as a list, the argument list pushed
/// as a single trailing element, and the result reserialized; otherwise the
/// arguments' list form is appended after a single space. A base text that
/// fails to parse as a list reports an error outcome, which the caller maps
/// to a denial.
fn evaluate_policy_script(
    host: &dyn Host,
    text: &str,
    arguments: &[String],
    flags: PolicyFlags,
) -> EvalResult {
    let append = flags.contains(PolicyFlags::ARGUMENTS);

    let script = if flags.contains(PolicyFlags::SPLIT_LIST) {
        match list::split_list(text) {
            Ok(mut elements) => {
                if append {
                    elements.push(list::join_list(arguments.iter().map(String::as_str)));
                }
                list::join_list(elements.iter().map(String::as_str))
            }
            Err(error) => return EvalResult::error(error.to_string()),
        }
    } else if append {
        let mut script = text.to_string();
        script.push(' ');
        script.push_str(&list::join_list(arguments.iter().map(String::as_str)));
        script
    } else {
        text.to_string()
    };

    host.evaluate_script(&script)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::OperationPayload;
    use crate::decision::Decision;

    fn context() -> PolicyContext {
        PolicyContext::new(OperationPayload::Command)
    }

    #[test]
    fn test_vote_mapping() {
        let mut ctx = context();
        apply_vote(&mut ctx, ReturnCode::Ok);
        assert_eq!(ctx.decision(), Decision::Approved);

        let mut ctx = context();
        apply_vote(&mut ctx, ReturnCode::Break);
        assert_eq!(ctx.decision(), Decision::None);

        let mut ctx = context();
        apply_vote(&mut ctx, ReturnCode::Continue);
        assert_eq!(ctx.decision(), Decision::Undecided);

        let mut ctx = context();
        apply_vote(&mut ctx, ReturnCode::Error);
        assert_eq!(ctx.decision(), Decision::Denied);

        // "return" is not a valid policy outcome and denies like an error.
        let mut ctx = context();
        apply_vote(&mut ctx, ReturnCode::Return);
        assert_eq!(ctx.decision(), Decision::Denied);
    }

    #[test]
    fn test_missing_client_data_is_a_hard_error() {
        struct NoHost;
        // The uri strategy never gets far enough to use the host when the
        // client data is absent, so a panicking stub keeps the test honest.
        impl Host for NoHost {
            fn evaluate_script(&self, _text: &str) -> EvalResult {
                unreachable!()
            }
            fn trust_lists(&self) -> &std::sync::RwLock<crate::host::TrustLists> {
                unreachable!()
            }
            fn resolve_command(
                &self,
                _descriptor: &CommandDescriptor,
            ) -> Option<crate::host::CommandHandle> {
                unreachable!()
            }
            fn base_directory_substitute(&self, _path: &Path) -> std::path::PathBuf {
                unreachable!()
            }
            fn initialized_path(&self) -> Option<std::path::PathBuf> {
                unreachable!()
            }
            fn origin(&self) -> Option<Origin> {
                unreachable!()
            }
            fn is_safe(&self) -> bool {
                true
            }
        }

        let origin = Origin::new("https", "example.com");
        let outcome = uri_policy(
            &NoHost,
            None,
            &origin,
            &BTreeSet::new(),
            true,
            &mut ClientData::Empty,
            &[],
        );
        assert_eq!(
            outcome,
            Err(crate::policy::PolicyError::InvalidClientData)
        );
    }
}
