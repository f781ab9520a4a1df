use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer, Serialize};

/// Principal role, ordered by privilege (`Viewer` < `Sales` < `Admin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Viewer,
    Sales,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Viewer, Role::Sales, Role::Admin];

    /// Parse a backend role string. Unknown or legacy values (`user`) map to
    /// the least-privileged role.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "administrator" => Role::Admin,
            "sales" => Role::Sales,
            _ => Role::Viewer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Sales => "sales",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Role::parse(&s))
    }
}

/// A UI action a role may be permitted to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    View,
    Create,
    Edit,
    Delete,
    Export,
    ManageUsers,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::View,
        Capability::Create,
        Capability::Edit,
        Capability::Delete,
        Capability::Export,
        Capability::ManageUsers,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "view" => Some(Capability::View),
            "create" => Some(Capability::Create),
            "edit" => Some(Capability::Edit),
            "delete" => Some(Capability::Delete),
            "export" => Some(Capability::Export),
            "manage_users" => Some(Capability::ManageUsers),
            _ => None,
        }
    }
}

/// Static role → capability table.
#[derive(Debug, Clone)]
pub struct CapabilityMap {
    grants: HashMap<Role, BTreeSet<Capability>>,
}

impl CapabilityMap {
    fn builtin() -> Self {
        use Capability::*;

        let viewer: BTreeSet<Capability> = [View].into_iter().collect();
        let sales: BTreeSet<Capability> = viewer
            .iter()
            .copied()
            .chain([Create, Edit, Export])
            .collect();
        let admin: BTreeSet<Capability> = Capability::ALL.into_iter().collect();

        let grants = [(Role::Viewer, viewer), (Role::Sales, sales), (Role::Admin, admin)]
            .into_iter()
            .collect();
        Self { grants }
    }

    /// The process-wide mapping, built once on first use.
    pub fn global() -> &'static CapabilityMap {
        static MAP: OnceLock<CapabilityMap> = OnceLock::new();
        MAP.get_or_init(CapabilityMap::builtin)
    }

    pub fn allows(&self, role: Role, capability: Capability) -> bool {
        self.grants
            .get(&role)
            .map(|caps| caps.contains(&capability))
            .unwrap_or(false)
    }

    pub fn capabilities(&self, role: Role) -> impl Iterator<Item = Capability> + '_ {
        self.grants.get(&role).into_iter().flatten().copied()
    }
}
