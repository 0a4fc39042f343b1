use serde::Deserialize;

/// A resolved `User` entity. Cached per session once fetched; identities
/// rarely change mid-session, so entries are never invalidated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DriverIdentity {
    pub id: String,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
    pub name: Option<String>,
}

impl DriverIdentity {
    /// "First Last", falling back to the account name, then the id.
    pub fn display_name(&self) -> String {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        self.name.clone().unwrap_or_else(|| self.id.clone())
    }
}
