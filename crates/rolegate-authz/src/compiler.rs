//! Grant compilation.
//!
//! Turns a raw grant (identifiers only) plus fetched metadata into the
//! `(subject, resource name, action name)` relation that `can` evaluates.
//!
//! # Example
//!
//! ```
//! use rolegate_authz::{PermissionMeta, PolicyCompiler, PolicyTriple, RawGrant, ResourceMeta};
//!
//! let mut grant = RawGrant::new();
//! grant.insert("10".to_string(), vec!["1".to_string()]);
//!
//! let triples = PolicyCompiler::compile(
//!     "u1",
//!     &grant,
//!     &[ResourceMeta::new("10", "User Management")],
//!     &[PermissionMeta::new("1", "read")],
//! );
//! assert_eq!(triples, vec![PolicyTriple::new("u1", "User Management", "read")]);
//! ```

use std::collections::HashMap;

use crate::types::{PermissionMeta, PolicyTriple, RawGrant, ResourceMeta};

/// Counters describing one compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Number of triples emitted.
    pub emitted: usize,

    /// Grant entries whose resource id had no metadata.
    pub skipped_resources: usize,

    /// Permission ids (within known resources) that had no metadata.
    pub skipped_permissions: usize,
}

/// Pure grant compiler. Holds no state.
pub struct PolicyCompiler;

impl PolicyCompiler {
    /// Compile a grant into policy triples.
    ///
    /// Unknown resource ids drop their whole entry, unknown permission ids
    /// drop just that permission. An empty subject or an empty grant yields
    /// no triples. Output order is unspecified.
    #[must_use]
    pub fn compile(
        subject: &str,
        grant: &RawGrant,
        resources: &[ResourceMeta],
        permissions: &[PermissionMeta],
    ) -> Vec<PolicyTriple> {
        Self::compile_with_report(subject, grant, resources, permissions).0
    }

    /// Same as [`compile`](Self::compile), also returning skip counters.
    #[must_use]
    pub fn compile_with_report(
        subject: &str,
        grant: &RawGrant,
        resources: &[ResourceMeta],
        permissions: &[PermissionMeta],
    ) -> (Vec<PolicyTriple>, CompileReport) {
        let mut report = CompileReport::default();

        if subject.is_empty() || grant.is_empty() {
            return (Vec::new(), report);
        }

        let resource_names: HashMap<&str, &str> = resources
            .iter()
            .map(|r| (r.id.as_str(), r.name.as_str()))
            .collect();
        let action_names: HashMap<&str, &str> = permissions
            .iter()
            .map(|p| (p.id.as_str(), p.name.as_str()))
            .collect();

        let mut triples = Vec::new();

        for (resource_id, permission_ids) in grant {
            let Some(resource_name) = resource_names.get(resource_id.as_str()) else {
                report.skipped_resources += 1;
                continue;
            };

            for permission_id in permission_ids {
                match action_names.get(permission_id.as_str()) {
                    Some(action_name) => {
                        triples.push(PolicyTriple::new(subject, *resource_name, *action_name));
                    }
                    None => report.skipped_permissions += 1,
                }
            }
        }

        report.emitted = triples.len();
        (triples, report)
    }
}
