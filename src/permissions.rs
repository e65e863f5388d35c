//! Decides whether a user's token may be proxied into a namespace.
//!
//! Tokens of cluster administrators are highly privileged. Proxying them into
//! an arbitrary workspace would let whoever controls that workspace act as a
//! cluster admin, so the reserved terminal namespace is limited to members of
//! the cluster-admin group. Every other namespace is open to any
//! authenticated user, subject to the workspace ownership check done by the
//! router.

use serde_json::Value;

/// Namespace reserved for cluster-admin terminals.
pub const ADMIN_TERMINAL_NAMESPACE: &str = "openshift-terminal";

/// Group whose members may use [`ADMIN_TERMINAL_NAMESPACE`].
pub const CLUSTER_ADMIN_GROUP: &str = "system:cluster-admins";

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("user info field `groups` is not a list of strings")]
    GroupsNotStringList,
}

/// Returns whether we are willing to proxy this user's token into `namespace`.
///
/// `user_info` is the identity object the cluster returned for the user.
/// A missing `groups` field denies without an error; a `groups` field of the
/// wrong shape (including `null`) is an error.
pub fn check_user_permissions(user_info: &Value, namespace: &str) -> Result<bool, PermissionError> {
    let groups = match user_info.get("groups") {
        None => return Ok(false),
        Some(groups) => string_list(groups)?,
    };

    if namespace == ADMIN_TERMINAL_NAMESPACE {
        return Ok(groups.contains(&CLUSTER_ADMIN_GROUP));
    }
    Ok(true)
}

fn string_list(value: &Value) -> Result<Vec<&str>, PermissionError> {
    value
        .as_array()
        .ok_or(PermissionError::GroupsNotStringList)?
        .iter()
        .map(|group| group.as_str().ok_or(PermissionError::GroupsNotStringList))
        .collect()
}
