//! Entity kinds and name normalization
//!
//! Every stable identifier is `<TAG>-<NORMALIZED-NAME>`, where the tag is
//! fixed per [`EntityKind`] and the name is case-folded with every run of
//! non-alphanumeric characters collapsed to a single `-`.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Separator between tag and name segments
pub const SEPARATOR: char = '-';

/// Kind of system-level entity a story can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// UI component
    Component,
    /// Screen or page
    Screen,
    /// Backend service
    Service,
    /// API contract
    ApiContract,
    /// Piece of shared state
    State,
    /// Domain event
    Event,
    /// Product feature
    Feature,
    /// Persisted data model
    DataModel,
}

impl EntityKind {
    /// All kinds
    pub const ALL: [Self; 8] = [
        Self::Component,
        Self::Screen,
        Self::Service,
        Self::ApiContract,
        Self::State,
        Self::Event,
        Self::Feature,
        Self::DataModel,
    ];

    /// Fixed identifier tag
    #[inline]
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Component => "COMP",
            Self::Screen => "SCREEN",
            Self::Service => "SVC",
            Self::ApiContract => "API",
            Self::State => "STATE",
            Self::Event => "EVT",
            Self::Feature => "FEAT",
            Self::DataModel => "MODEL",
        }
    }

    /// Tag plus separator, the prefix every id of this kind starts with
    #[must_use]
    pub fn id_prefix(self) -> String {
        format!("{}{SEPARATOR}", self.tag())
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Component => "component",
            Self::Screen => "screen",
            Self::Service => "service",
            Self::ApiContract => "apiContract",
            Self::State => "state",
            Self::Event => "event",
            Self::Feature => "feature",
            Self::DataModel => "dataModel",
        })
    }
}

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let kind = match folded.as_str() {
            "component" | "comp" | "uicomponent" => Self::Component,
            "screen" | "page" | "view" => Self::Screen,
            "service" | "svc" | "backendservice" => Self::Service,
            "apicontract" | "api" | "contract" | "endpoint" => Self::ApiContract,
            "state" | "store" | "statestore" => Self::State,
            "event" | "evt" | "domainevent" => Self::Event,
            "feature" | "feat" => Self::Feature,
            "datamodel" | "model" | "entity" => Self::DataModel,
            _ => return Err(UnknownEntityKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Entity kind string not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind \"{0}\"")]
pub struct UnknownEntityKind(pub String);

/// Normalize a human name into an identifier segment
///
/// ASCII letters are upper-cased, digits kept, and every run of other
/// characters becomes one separator. Leading and trailing separators are
/// dropped. A name with no alphanumerics normalizes to `UNNAMED`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push(SEPARATOR);
            }
            pending_separator = false;
            out.push(c.to_ascii_uppercase());
        } else {
            pending_separator = true;
        }
    }
    if out.is_empty() {
        out.push_str("UNNAMED");
    }
    out
}

/// Unsuffixed identifier for a (kind, name) pair
#[must_use]
pub fn base_id(kind: EntityKind, name: &str) -> String {
    format!("{}{SEPARATOR}{}", kind.tag(), normalize_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_separators() {
        assert_eq!(normalize_name("Login Button"), "LOGIN-BUTTON");
        assert_eq!(normalize_name("  login--button!! "), "LOGIN-BUTTON");
        assert_eq!(normalize_name("login_button"), "LOGIN-BUTTON");
        assert_eq!(normalize_name("Café Menu"), "CAF-MENU");
        assert_eq!(normalize_name("v2 API"), "V2-API");
    }

    #[test]
    fn empty_names_get_placeholder() {
        assert_eq!(normalize_name(""), "UNNAMED");
        assert_eq!(normalize_name("***"), "UNNAMED");
    }

    #[test]
    fn base_id_uses_kind_tag() {
        assert_eq!(base_id(EntityKind::Component, "Login Button"), "COMP-LOGIN-BUTTON");
        assert_eq!(base_id(EntityKind::Event, "order placed"), "EVT-ORDER-PLACED");
    }

    #[test]
    fn kind_parsing_is_lenient() {
        assert_eq!("Component".parse::<EntityKind>(), Ok(EntityKind::Component));
        assert_eq!("api_contract".parse::<EntityKind>(), Ok(EntityKind::ApiContract));
        assert_eq!("store".parse::<EntityKind>(), Ok(EntityKind::State));
        assert!("widgetry".parse::<EntityKind>().is_err());
    }

    #[test]
    fn no_tag_is_a_prefix_of_another() {
        for a in EntityKind::ALL {
            for b in EntityKind::ALL {
                if a != b {
                    assert!(!b.id_prefix().starts_with(&a.id_prefix()));
                }
            }
        }
    }
}
