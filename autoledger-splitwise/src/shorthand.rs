//! Category flags embedded in expense descriptions.
//!
//! - Global shorthand `M<modifiers>:<CODE>`, e.g. `MC:GROC`. `CODE` maps to a
//!   ledger category through the shorthand table.
//! - Per-user flag `U<identifier>:<modifiers>`, e.g. `UJD:C`, honored only
//!   for the configured identifier.
//! - Fallback: a trailing JSON object such as `{"category": "Groceries"}`.
//!
//! The only modifier is `C`: also charge the full paid share.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;

use crate::error::{Result, SplitwiseError};

/// Shorthand code → ledger category.
#[derive(Debug, Clone, Default)]
pub struct ShorthandTable(HashMap<String, String>);

impl ShorthandTable {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(raw)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| SplitwiseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn category(&self, code: &str) -> Option<&str> {
        self.0.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for ShorthandTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalShorthand {
    pub modifiers: String,
    pub code: String,
}

impl GlobalShorthand {
    pub fn charges_paid_share(&self) -> bool {
        self.modifiers.contains('C')
    }
}

/// Compiled flag patterns for one user identifier.
#[derive(Debug, Clone)]
pub struct FlagParser {
    global: Regex,
    strip: Regex,
    user: Option<Regex>,
}

impl FlagParser {
    pub fn new(user_identifier: Option<&str>) -> Result<Self> {
        let user = match user_identifier {
            Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_uppercase()) => {
                Some(Regex::new(&format!(r"\bU{id}:[A-Z]+\b"))?)
            }
            Some(id) => return Err(SplitwiseError::InvalidUserIdentifier(id.to_string())),
            None => None,
        };
        Ok(Self {
            global: Regex::new(r"\bM[A-Z]*:[A-Z]+\b")?,
            strip: Regex::new(r"\b[MU][A-Z]*:[A-Z]+\b")?,
            user,
        })
    }

    /// Every global shorthand in `description`, in order.
    pub fn global_shorthands(&self, description: &str) -> Vec<GlobalShorthand> {
        self.global
            .find_iter(description)
            .filter_map(|m| {
                let (head, code) = m.as_str().split_once(':')?;
                Some(GlobalShorthand {
                    modifiers: head[1..].to_string(),
                    code: code.to_string(),
                })
            })
            .collect()
    }

    /// Modifiers of this user's flag, if present.
    pub fn user_modifiers(&self, description: &str) -> Option<String> {
        let found = self.user.as_ref()?.find(description)?;
        found.as_str().split_once(':').map(|(_, mods)| mods.to_string())
    }

    /// `description` with every flag removed and whitespace collapsed.
    pub fn strip(&self, description: &str) -> String {
        let stripped = self.strip.replace_all(description, "");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Split a trailing `{...}` category object off a stripped description.
///
/// Returns the category and the text before the object. Accepts the
/// `category` key, falling back to `mint_category`.
pub fn json_category(description: &str) -> Option<(String, String)> {
    let open = description.find('{')?;
    let close = description.rfind('}')?;
    if close < open {
        return None;
    }
    let object: serde_json::Value = serde_json::from_str(&description[open..=close]).ok()?;
    let category = object
        .get("category")
        .or_else(|| object.get("mint_category"))?
        .as_str()?
        .to_string();
    Some((category, description[..open].trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_global_shorthand_with_modifiers() {
        let p = FlagParser::new(None).unwrap();
        assert_eq!(
            p.global_shorthands("Costco run MC:GROC"),
            vec![GlobalShorthand {
                modifiers: "C".to_string(),
                code: "GROC".to_string()
            }]
        );
        assert_eq!(p.global_shorthands("Dinner M:REST")[0].modifiers, "");
        assert!(p.global_shorthands("MEMO: lowercase m:rest").is_empty());
    }

    #[test]
    fn user_flag_only_matches_configured_identifier() {
        let p = FlagParser::new(Some("JD")).unwrap();
        assert_eq!(p.user_modifiers("Hotel UJD:C UAB:C").as_deref(), Some("C"));
        assert_eq!(p.user_modifiers("Hotel UAB:C"), None);
        assert_eq!(FlagParser::new(None).unwrap().user_modifiers("Hotel UJD:C"), None);
    }

    #[test]
    fn rejects_bad_identifier() {
        assert!(matches!(
            FlagParser::new(Some("j1")),
            Err(SplitwiseError::InvalidUserIdentifier(_))
        ));
    }

    #[test]
    fn strips_all_flags() {
        let p = FlagParser::new(Some("JD")).unwrap();
        assert_eq!(p.strip("Hotel  MC:TRAV UJD:C night"), "Hotel night");
    }

    #[test]
    fn json_fallback() {
        assert_eq!(
            json_category(r#"Pizza {"category": "Restaurants"}"#),
            Some(("Restaurants".to_string(), "Pizza".to_string()))
        );
        assert_eq!(
            json_category(r#"Pizza {"mint_category": "Restaurants"}"#).map(|(c, _)| c),
            Some("Restaurants".to_string())
        );
        assert_eq!(json_category(r#"Pizza {"tip": 3}"#), None);
        assert_eq!(json_category("Pizza {not json}"), None);
        assert_eq!(json_category("Pizza"), None);
    }

    #[test]
    fn table_lookup() {
        let t = ShorthandTable::from_json(r#"{"GROC": "Groceries"}"#).unwrap();
        assert_eq!(t.category("GROC"), Some("Groceries"));
        assert_eq!(t.category("REST"), None);
    }
}
