use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declare a newtype wrapper around a UUIDv4 string identifier, with the
/// `Display`/`From<&str>`/`From<String>` boilerplate the gateway needs to
/// pass ids across crate boundaries without losing type distinctions.
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_type!(PrincipalId);
id_type!(ThreadId);
id_type!(BindingId);
id_type!(RequestId);
id_type!(ConnId);

/// The kind of party a [`PrincipalId`] identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Client,
    Agent,
    Pack,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalKind::Client => write!(f, "client"),
            PrincipalKind::Agent => write!(f, "agent"),
            PrincipalKind::Pack => write!(f, "pack"),
        }
    }
}

impl std::str::FromStr for PrincipalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(PrincipalKind::Client),
            "agent" => Ok(PrincipalKind::Agent),
            "pack" => Ok(PrincipalKind::Pack),
            other => Err(format!("unknown principal kind: {other}")),
        }
    }
}

/// Lifecycle status of a [`PrincipalId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    Pending,
    Approved,
    Online,
    Offline,
    Revoked,
}

impl fmt::Display for PrincipalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalStatus::Pending => write!(f, "pending"),
            PrincipalStatus::Approved => write!(f, "approved"),
            PrincipalStatus::Online => write!(f, "online"),
            PrincipalStatus::Offline => write!(f, "offline"),
            PrincipalStatus::Revoked => write!(f, "revoked"),
        }
    }
}

impl std::str::FromStr for PrincipalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PrincipalStatus::Pending),
            "approved" => Ok(PrincipalStatus::Approved),
            "online" => Ok(PrincipalStatus::Online),
            "offline" => Ok(PrincipalStatus::Offline),
            "revoked" => Ok(PrincipalStatus::Revoked),
            other => Err(format!("unknown principal status: {other}")),
        }
    }
}

/// Role names grantable to a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleName {
    Owner,
    Admin,
    Member,
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleName::Owner => write!(f, "owner"),
            RoleName::Admin => write!(f, "admin"),
            RoleName::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for RoleName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(RoleName::Owner),
            "admin" => Ok(RoleName::Admin),
            "member" => Ok(RoleName::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_display() {
        let id = PrincipalId::new();
        let again = PrincipalId::from(id.as_str());
        assert_eq!(id, again);
    }

    #[test]
    fn principal_status_round_trips() {
        for s in ["pending", "approved", "online", "offline", "revoked"] {
            let status: PrincipalStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
    }
}
