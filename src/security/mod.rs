pub mod permissions;
pub mod sandbox;

pub use permissions::{AllowAll, GrantedPermissions, PermissionContext};
pub use sandbox::WorkspaceSandbox;
