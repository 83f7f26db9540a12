use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

/// Source of truth for which permission tags the current run holds.
pub trait PermissionContext: Send + Sync {
    fn has_permission(&self, permission: &str) -> bool;

    /// Entries of `required` that are not granted, in input order.
    fn missing(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|permission| !self.has_permission(permission))
            .cloned()
            .collect()
    }
}

/// Permission set loaded from config, adjustable at runtime.
#[derive(Debug, Default)]
pub struct GrantedPermissions {
    granted: RwLock<BTreeSet<String>>,
}

impl GrantedPermissions {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: RwLock::new(
                permissions
                    .into_iter()
                    .map(Into::into)
                    .map(|permission: String| permission.trim().to_string())
                    .filter(|permission| !permission.is_empty())
                    .collect(),
            ),
        }
    }

    pub fn grant(&self, permission: impl Into<String>) {
        let permission = permission.into();
        tracing::debug!(%permission, "permission granted");
        self.granted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(permission);
    }

    pub fn revoke(&self, permission: &str) -> bool {
        let removed = self
            .granted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(permission);
        if removed {
            tracing::debug!(%permission, "permission revoked");
        }
        removed
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.granted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl PermissionContext for GrantedPermissions {
    fn has_permission(&self, permission: &str) -> bool {
        self.granted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(permission)
    }
}

/// Grants everything. Used by `check` and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionContext for AllowAll {
    fn has_permission(&self, _permission: &str) -> bool {
        true
    }
}
