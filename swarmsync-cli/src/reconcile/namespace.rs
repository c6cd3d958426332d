//! Secret naming
//!
//! A secret is named `lower(service) + "_" + lower(key)`. That format alone is
//! not injective (`a_b`/`C` and `a`/`B_C` meet at `a_b_c`), so every name
//! claimed by more than one (service, key) pair is refused for all claimants.

use std::collections::{BTreeMap, BTreeSet};

/// Docker rejects secret names longer than this
const MAX_SECRET_NAME: usize = 64;

pub fn secret_name(service: &str, key: &str) -> String {
    format!("{}_{}", service.to_lowercase(), key.to_lowercase())
}

/// Check a derived name against the orchestrator's naming rules
pub fn validate_secret_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > MAX_SECRET_NAME {
        return Err(format!(
            "secret name must be 1-{MAX_SECRET_NAME} characters, got {}",
            name.len()
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(format!("secret name contains invalid character {bad:?}"));
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err("secret name must start and end with a letter or digit".to_string());
    }
    Ok(())
}

/// Ownership of every derived secret name across all discovered services
#[derive(Debug, Default, Clone)]
pub struct SecretNamespace {
    claims: BTreeMap<String, BTreeSet<(String, String)>>,
}

impl SecretNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, service: &str, key: &str) {
        self.claims
            .entry(secret_name(service, key))
            .or_default()
            .insert((service.to_string(), key.to_string()));
    }

    /// The secret name for a pair, or why it cannot be used
    pub fn resolve(&self, service: &str, key: &str) -> Result<String, String> {
        let name = secret_name(service, key);
        match self.claims.get(&name) {
            Some(owners) if owners.len() > 1 => {
                let others: Vec<String> = owners
                    .iter()
                    .filter(|(s, k)| !(s == service && k == key))
                    .map(|(s, k)| format!("{s}/{k}"))
                    .collect();
                Err(format!(
                    "name {name} is also derived from {}; rename one of the keys",
                    others.join(", ")
                ))
            }
            _ => {
                validate_secret_name(&name)?;
                Ok(name)
            }
        }
    }

    /// Secret names whose prefix belongs to `service` and not to a longer service name
    pub fn owned_by<'a>(
        service: &str,
        names: impl IntoIterator<Item = &'a String>,
        all_services: &BTreeSet<String>,
    ) -> Vec<String> {
        let prefix = format!("{}_", service.to_lowercase());
        let shadowing: Vec<String> = all_services
            .iter()
            .map(|s| format!("{}_", s.to_lowercase()))
            .filter(|other| other.len() > prefix.len() && other.starts_with(&prefix))
            .collect();
        names
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .filter(|name| !shadowing.iter().any(|other| name.starts_with(other.as_str())))
            .cloned()
            .collect()
    }
}
