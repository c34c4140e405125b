//! The default policy set registered into every safe interpreter.
//!
//! Four built-in ensembles get an allow-list policy, `package` gets a
//! deny-list policy, and `source` branches between origin trust and
//! directory trust depending on where it would load from. The concrete
//! allow/deny lists live here so hosts can also attach them to the
//! ensembles they construct.

use crate::context::ClientData;
use crate::host::{CommandDescriptor, Host};
use crate::policy::{Policy, PolicyFlags, PolicyName, PolicyResult};
use crate::strategy::{directory_policy, sub_command_policy, uri_policy};
use crate::trust::{remote_origin, trusted_directories, trusted_origins};

/// `file` sub-commands safe scripts may use.
pub const ALLOWED_FILE_SUB_COMMANDS: &[&str] = &["channels", "dirname", "join", "split"];

/// `info` sub-commands safe scripts may use.
pub const ALLOWED_INFO_SUB_COMMANDS: &[&str] = &[
    "appdomain",
    "args",
    "body",
    "commands",
    "complete",
    "context",
    "default",
    "engine",
    "ensembles",
    "exists",
    "functions",
    "globals",
    "level",
    "library",
    "locals",
    "objects",
    "operands",
    "operators",
    "patchlevel",
    "procs",
    "script",
    "subcommands",
    "tclversion",
    "vars",
];

/// `interp` sub-commands safe scripts may use.
pub const ALLOWED_INTERP_SUB_COMMANDS: &[&str] =
    &["alias", "aliases", "cancel", "exists", "issafe", "slaves"];

/// `object` sub-commands safe scripts may use.
pub const ALLOWED_OBJECT_SUB_COMMANDS: &[&str] = &["dispose", "invoke", "invokeall", "isoftype"];

/// `package` sub-commands withheld from safe scripts.
pub const DISALLOWED_PACKAGE_SUB_COMMANDS: &[&str] = &["indexes", "reset", "scan", "vloaded"];

fn file_policy(host: &dyn Host, data: &mut ClientData<'_>, arguments: &[String]) -> PolicyResult<()> {
    let descriptor = CommandDescriptor::name("file");
    sub_command_policy(host, Some(&descriptor), None, true, data, arguments)
}

fn info_policy(host: &dyn Host, data: &mut ClientData<'_>, arguments: &[String]) -> PolicyResult<()> {
    let descriptor = CommandDescriptor::name("info");
    sub_command_policy(host, Some(&descriptor), None, true, data, arguments)
}

fn interp_policy(
    host: &dyn Host,
    data: &mut ClientData<'_>,
    arguments: &[String],
) -> PolicyResult<()> {
    let descriptor = CommandDescriptor::name("interp");
    sub_command_policy(host, Some(&descriptor), None, true, data, arguments)
}

fn object_policy(
    host: &dyn Host,
    data: &mut ClientData<'_>,
    arguments: &[String],
) -> PolicyResult<()> {
    let descriptor = CommandDescriptor::name("object");
    sub_command_policy(host, Some(&descriptor), None, true, data, arguments)
}

fn package_policy(
    host: &dyn Host,
    data: &mut ClientData<'_>,
    arguments: &[String],
) -> PolicyResult<()> {
    let descriptor = CommandDescriptor::name("package");
    sub_command_policy(host, Some(&descriptor), None, false, data, arguments)
}

/// The `source` policy branches on the shape of its final argument: a
/// remote location is checked against the trusted origins, anything else
/// against the trusted directories. The argument is examined before the
/// target check, which is harmless when the command being gated turns out
/// not to be `source` — the strategies re-verify the target themselves.
fn source_policy(
    host: &dyn Host,
    data: &mut ClientData<'_>,
    arguments: &[String],
) -> PolicyResult<()> {
    let descriptor = CommandDescriptor::name("source");

    let file_name = if arguments.len() >= 2 {
        arguments.last().map(String::as_str).unwrap_or("")
    } else {
        ""
    };

    if let Some(origin) = remote_origin(file_name) {
        // Only remote sites we know, trust, and fully control.
        let origins = trusted_origins(host);
        uri_policy(host, Some(&descriptor), &origin, &origins, true, data, arguments)
    } else {
        let directories = trusted_directories(host);
        directory_policy(
            host,
            Some(&descriptor),
            file_name,
            &directories,
            true,
            data,
            arguments,
        )
    }
}

/// The default policies added to every interpreter, in registration order.
///
/// Each interpreter instance gets its own copy; there is no process-wide
/// registry to interfere across instances.
pub fn default_policies() -> Vec<Policy> {
    let scope = module_path!();

    vec![
        Policy::new(PolicyName::new(scope, "file_policy"), file_policy)
            .with_flags(PolicyFlags::SUB_COMMAND),
        Policy::new(PolicyName::new(scope, "info_policy"), info_policy)
            .with_flags(PolicyFlags::SUB_COMMAND),
        Policy::new(PolicyName::new(scope, "interp_policy"), interp_policy)
            .with_flags(PolicyFlags::SUB_COMMAND),
        Policy::new(PolicyName::new(scope, "object_policy"), object_policy)
            .with_flags(PolicyFlags::SUB_COMMAND),
        Policy::new(PolicyName::new(scope, "package_policy"), package_policy)
            .with_flags(PolicyFlags::SUB_COMMAND),
        Policy::new(PolicyName::new(scope, "source_policy"), source_policy)
            .with_flags(PolicyFlags::URI | PolicyFlags::DIRECTORY),
    ]
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order() {
        let policies = default_policies();
        let methods: Vec<_> = policies
            .iter()
            .map(|policy| policy.name().method.as_str())
            .collect();
        assert_eq!(
            methods,
            vec![
                "file_policy",
                "info_policy",
                "interp_policy",
                "object_policy",
                "package_policy",
                "source_policy",
            ]
        );
    }

    #[test]
    fn test_default_lists_are_disjoint_where_expected() {
        // The package deny-list names none of the allowed file verbs; a
        // regression here would mean a copy/paste slip in the tables.
        for name in DISALLOWED_PACKAGE_SUB_COMMANDS {
            assert!(!ALLOWED_FILE_SUB_COMMANDS.contains(name));
        }
    }
}
