//! Role-gated access to pages and UI regions.
//!
//! This module provides:
//! - `Role` / `Capability`: the principal's role and the actions it unlocks
//! - `CapabilityMap`: the static role → capability table
//! - `Element`: a UI region that can be rendered read-only
//! - `RoleGuard`: checks and enforcement against the current session

pub mod region;
pub mod role;

use std::sync::Arc;

use tracing::{debug, info};

pub use region::{ControlPurpose, Element, ElementKind};
pub use role::{Capability, CapabilityMap, Role};

use crate::auth::SessionManager;
use crate::nav::{Destination, Navigator, Notice};

pub struct RoleGuard {
    sessions: Arc<SessionManager>,
    navigator: Arc<dyn Navigator>,
    capabilities: &'static CapabilityMap,
}

impl RoleGuard {
    pub fn new(sessions: Arc<SessionManager>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            sessions,
            navigator,
            capabilities: CapabilityMap::global(),
        }
    }

    /// Role of the active session, or the least-privileged role.
    pub fn current_role(&self) -> Role {
        self.sessions
            .get_session()
            .ok()
            .flatten()
            .map(|s| s.role)
            .unwrap_or_default()
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.allows(self.current_role(), capability)
    }

    /// Deny with a blocking notice and navigate to `fallback` unless the
    /// current role is one of `allowed`.
    pub fn enforce(&self, allowed: &[Role], fallback: &Destination) -> bool {
        let role = self.current_role();
        if allowed.contains(&role) {
            return true;
        }
        info!(role = %role, fallback = %fallback, "Access denied");
        self.navigator.notify(&Notice::Denied(format!(
            "Your role ({}) does not have access to this page.",
            role
        )));
        self.navigator.navigate(fallback);
        false
    }

    /// Render `region` read-only. Navigation, logout and always-enabled
    /// controls stay usable. Returns how many controls were disabled.
    pub fn restrict_region(&self, region: &mut Element) -> usize {
        let disabled = region.disable_controls();
        debug!(region = %region.id, disabled, "Region restricted");
        disabled
    }

    /// `restrict_region` only when the current role lacks `capability`.
    pub fn restrict_unless(&self, capability: Capability, region: &mut Element) -> usize {
        if self.can(capability) {
            0
        } else {
            self.restrict_region(region)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryStore, Session};
    use crate::nav::testing::RecordingNavigator;

    fn guard_for(role: Option<Role>) -> (RoleGuard, Arc<RecordingNavigator>) {
        let sessions = Arc::new(SessionManager::new(Arc::new(MemoryStore::new())));
        if let Some(role) = role {
            let session = Session::with_ttl("tok", "p@x.com", role, std::time::Duration::from_secs(600)).unwrap();
            sessions.set_session(&session).unwrap();
        }
        let navigator = Arc::new(RecordingNavigator::default());
        (RoleGuard::new(sessions, navigator.clone()), navigator)
    }

    fn sale_form() -> Element {
        Element::container(
            "sale-form",
            vec![
                Element::new(ElementKind::Input, "qty"),
                Element::new(ElementKind::Select, "product"),
                Element::container(
                    "actions",
                    vec![
                        Element::new(ElementKind::Button, "save"),
                        Element::new(ElementKind::Button, "logout").with_purpose(ControlPurpose::Logout),
                        Element::new(ElementKind::Button, "back").with_purpose(ControlPurpose::Navigation),
                        Element::new(ElementKind::Button, "print").always_enabled(),
                        Element::new(ElementKind::Link, "home"),
                    ],
                ),
                Element::new(ElementKind::Textarea, "notes"),
            ],
        )
    }

    #[test]
    fn test_current_role_defaults_to_least_privileged() {
        let (guard, _) = guard_for(None);
        assert_eq!(guard.current_role(), Role::Viewer);
        assert!(guard.can(Capability::View));
        assert!(!guard.can(Capability::Create));

        let (guard, _) = guard_for(Some(Role::Sales));
        assert_eq!(guard.current_role(), Role::Sales);
        assert!(guard.can(Capability::Create));
    }

    #[test]
    fn test_enforce_denies_and_navigates() {
        let (guard, navigator) = guard_for(Some(Role::Sales));
        let fallback = Destination::new("dashboard");

        assert!(!guard.enforce(&[Role::Admin], &fallback));
        assert_eq!(navigator.last_visit(), Some(fallback.clone()));
        assert!(matches!(navigator.notices.lock().first(), Some(Notice::Denied(_))));

        assert!(guard.enforce(&[Role::Admin, Role::Sales], &fallback));
        assert_eq!(navigator.visits.lock().len(), 1);
    }

    #[test]
    fn test_viewer_region_is_read_only_except_exempt_controls() {
        let (guard, _) = guard_for(Some(Role::Viewer));
        let mut form = sale_form();

        assert_eq!(guard.restrict_unless(Capability::Edit, &mut form), 4);
        for id in ["qty", "product", "save", "notes"] {
            assert!(form.find(id).unwrap().disabled, "{} should be disabled", id);
        }
        for id in ["logout", "back", "print", "home"] {
            assert!(!form.find(id).unwrap().disabled, "{} should stay enabled", id);
        }
    }

    #[test]
    fn test_privileged_role_keeps_region_editable() {
        let (guard, _) = guard_for(Some(Role::Admin));
        let mut form = sale_form();
        assert_eq!(guard.restrict_unless(Capability::Edit, &mut form), 0);
        assert!(!form.find("save").unwrap().disabled);
    }
}
