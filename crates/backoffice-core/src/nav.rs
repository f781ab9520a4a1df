//! Navigation seam between the core and its host.
//!
//! The core never renders anything itself: it asks a `Navigator` to move to a
//! page or to show a short notice.

use std::fmt;

/// Query parameter that carries the originally requested page.
pub const RETURN_PARAM: &str = "next";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub page: String,
    pub params: Vec<(String, String)>,
}

impl Destination {
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The page the entry flow should resume at, if any.
    pub fn return_target(&self) -> Option<&str> {
        self.param(RETURN_PARAM)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.page)?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(
                f,
                "{}{}={}",
                sep,
                urlencoding::encode(key),
                urlencoding::encode(value)
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Blocking denial (the user must acknowledge it).
    Denied(String),
    Error(String),
}

/// Host-provided navigation and notification primitive.
pub trait Navigator: Send + Sync {
    fn navigate(&self, destination: &Destination);

    fn notify(&self, notice: &Notice);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_display_encodes_params() {
        let dest = Destination::new("login").with_param(RETURN_PARAM, "sales report");
        assert_eq!(dest.to_string(), "login?next=sales%20report");
        assert_eq!(dest.return_target(), Some("sales report"));
        assert_eq!(Destination::new("dashboard").to_string(), "dashboard");
    }
}
