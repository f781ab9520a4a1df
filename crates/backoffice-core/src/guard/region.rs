//! In-memory model of a UI region, used to render read-only views.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Container,
    Input,
    Select,
    Textarea,
    Button,
    Link,
}

impl ElementKind {
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            ElementKind::Input | ElementKind::Select | ElementKind::Textarea | ElementKind::Button
        )
    }
}

/// What a control does, as far as restriction is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPurpose {
    #[default]
    Data,
    Navigation,
    Logout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub kind: ElementKind,
    pub id: String,
    pub purpose: ControlPurpose,
    /// Never disabled by a restriction.
    pub always_enabled: bool,
    pub disabled: bool,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(kind: ElementKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            purpose: ControlPurpose::Data,
            always_enabled: false,
            disabled: false,
            children: Vec::new(),
        }
    }

    pub fn container(id: impl Into<String>, children: Vec<Element>) -> Self {
        Self {
            children,
            ..Self::new(ElementKind::Container, id)
        }
    }

    pub fn with_purpose(mut self, purpose: ControlPurpose) -> Self {
        self.purpose = purpose;
        self
    }

    pub fn always_enabled(mut self) -> Self {
        self.always_enabled = true;
        self
    }

    fn is_exempt(&self) -> bool {
        self.always_enabled
            || matches!(self.purpose, ControlPurpose::Navigation | ControlPurpose::Logout)
    }

    /// Disable every non-exempt interactive control in this subtree.
    /// Returns how many controls changed state.
    pub fn disable_controls(&mut self) -> usize {
        let mut changed = 0;
        if self.kind.is_interactive() && !self.is_exempt() && !self.disabled {
            self.disabled = true;
            changed += 1;
        }
        for child in &mut self.children {
            changed += child.disable_controls();
        }
        changed
    }

    /// Depth-first lookup by id.
    pub fn find(&self, id: &str) -> Option<&Element> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_controls_is_idempotent() {
        let mut form = Element::container(
            "form",
            vec![
                Element::new(ElementKind::Input, "qty"),
                Element::new(ElementKind::Link, "help"),
            ],
        );
        assert_eq!(form.disable_controls(), 1);
        assert_eq!(form.disable_controls(), 0);
        assert!(form.find("qty").unwrap().disabled);
        assert!(!form.find("help").unwrap().disabled);
    }
}
