//! Declarative operation → role table.

use std::fmt;

use serde::{Serialize, Serializer};

use super::{Identity, Role};
use crate::error::{AdminError, AdminResult};
use crate::model::{EntityKind, ReleaseScope};

/// Every guarded intent of the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Any read of either tier, including published history.
    Read,
    Create(EntityKind),
    Update(EntityKind),
    Delete(EntityKind),
    UpdateBase,
    Publish(ReleaseScope),
    CancelRelease,
    ReleaseStatus,
    ReleaseHistory,
    /// Session and profile endpoints of the caller's own account.
    Account,
    ChangePassword,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Create(kind) => write!(f, "create {kind}"),
            Operation::Update(kind) => write!(f, "update {kind}"),
            Operation::Delete(kind) => write!(f, "delete {kind}"),
            Operation::UpdateBase => f.write_str("update base"),
            Operation::Publish(scope) => write!(f, "publish {scope}"),
            Operation::CancelRelease => f.write_str("cancel release"),
            Operation::ReleaseStatus => f.write_str("release status"),
            Operation::ReleaseHistory => f.write_str("release history"),
            Operation::Account => f.write_str("account"),
            Operation::ChangePassword => f.write_str("change password"),
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

use EntityKind::{Cluster, Listener, Method, PluginGroup, Resource};
use Operation::*;

/// Minimum role per operation.
pub const POLICY: &[(Operation, Role)] = &[
    (Read, Role::User),
    (Account, Role::User),
    (ChangePassword, Role::User),
    // Routing surface owned by service teams.
    (Create(Resource), Role::User),
    (Update(Resource), Role::User),
    (Delete(Resource), Role::User),
    (Create(Method), Role::User),
    (Update(Method), Role::User),
    (Delete(Method), Role::User),
    // Infrastructure owned by operators.
    (Create(Cluster), Role::Admin),
    (Update(Cluster), Role::Admin),
    (Delete(Cluster), Role::Admin),
    (Create(Listener), Role::Admin),
    (Update(Listener), Role::Admin),
    (Delete(Listener), Role::Admin),
    (Create(PluginGroup), Role::Admin),
    (Update(PluginGroup), Role::Admin),
    (Delete(PluginGroup), Role::Admin),
    (UpdateBase, Role::Admin),
    (Publish(ReleaseScope::Resource), Role::Admin),
    (Publish(ReleaseScope::Method), Role::Admin),
    (Publish(ReleaseScope::PluginGroup), Role::Admin),
    (Publish(ReleaseScope::All), Role::Admin),
    (CancelRelease, Role::Admin),
    (ReleaseStatus, Role::Admin),
    (ReleaseHistory, Role::Admin),
];

/// Unlisted operations require the highest role.
pub fn required_role(operation: Operation) -> Role {
    POLICY
        .iter()
        .find(|(op, _)| *op == operation)
        .map(|(_, role)| *role)
        .unwrap_or(Role::Admin)
}

pub fn authorize(identity: &Identity, operation: Operation) -> AdminResult<()> {
    let required = required_role(operation);
    if identity.role.satisfies(required) {
        Ok(())
    } else {
        Err(AdminError::Forbidden {
            operation,
            required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn identity(role: Role) -> Identity {
        Identity {
            subject: "someone".to_string(),
            role,
            token_id: "jti".to_string(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_every_operation_listed_once() {
        let mut all = vec![
            Read,
            Account,
            ChangePassword,
            UpdateBase,
            CancelRelease,
            ReleaseStatus,
            ReleaseHistory,
        ];
        for kind in EntityKind::DEPENDENCY_ORDER {
            all.extend([Create(kind), Update(kind), Delete(kind)]);
        }
        for scope in [
            ReleaseScope::Resource,
            ReleaseScope::Method,
            ReleaseScope::PluginGroup,
            ReleaseScope::All,
        ] {
            all.push(Publish(scope));
        }

        assert_eq!(all.len(), POLICY.len());
        for op in all {
            assert_eq!(POLICY.iter().filter(|(o, _)| *o == op).count(), 1, "{op}");
        }
    }

    #[test]
    fn test_role_checks() {
        let user = identity(Role::User);
        let admin = identity(Role::Admin);

        assert!(authorize(&user, Read).is_ok());
        assert!(authorize(&user, Create(Method)).is_ok());
        assert!(authorize(&user, Delete(Resource)).is_ok());
        assert!(authorize(&user, ChangePassword).is_ok());

        let err = authorize(&user, Delete(Cluster)).unwrap_err();
        assert_eq!(err.to_string(), "operation `delete cluster` requires the `admin` role");
        assert!(authorize(&user, Publish(ReleaseScope::Method)).is_err());
        assert!(authorize(&user, CancelRelease).is_err());

        assert!(authorize(&admin, Publish(ReleaseScope::All)).is_ok());
        assert!(authorize(&admin, Create(Method)).is_ok());
    }
}
