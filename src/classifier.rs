//! Repository classifier: which org repositories are tracked applications.

use crate::config::SelectionConfig;
use crate::model::RepositoryRef;

/// Pure inclusion predicate over a repository name.
pub fn is_application(name: &str, selection: &SelectionConfig) -> bool {
    (name.starts_with(&selection.app_prefix) || selection.special_names.contains(name))
        && !selection.exclusions.contains(name)
}

/// Stable filter: keeps input order, performs no I/O.
pub fn select_applications(
    repos: &[RepositoryRef],
    selection: &SelectionConfig,
) -> Vec<RepositoryRef> {
    repos
        .iter()
        .filter(|repo| is_application(&repo.name, selection))
        .cloned()
        .collect()
}
