//! Realm union, realm references, and realm membership.
//!
//! A realm is the ownership context of an entity. The set of realm kinds is
//! closed: unknown strings are rejected at the parsing boundary, so every
//! downstream `match` is exhaustive.
//!
//! Precedence tiers are fixed. A lower tier number wins when the same entity
//! name is visible through several realms:
//!
//! ```text
//! client (1) > synth (2) > synth_class (3) > skill_module (4) > human (5) > system (6)
//! ```

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

// ---------------------------------------------------------------------------
// RealmKind
// ---------------------------------------------------------------------------

/// Ownership context kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RealmKind {
    Client,
    Synth,
    SynthClass,
    SkillModule,
    Human,
    System,
}

impl RealmKind {
    /// Every realm kind, ordered by precedence tier.
    pub const ALL: [Self; 6] = [
        Self::Client,
        Self::Synth,
        Self::SynthClass,
        Self::SkillModule,
        Self::Human,
        Self::System,
    ];

    /// Return the string representation used in SQL storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Synth => "synth",
            Self::SynthClass => "synth_class",
            Self::SkillModule => "skill_module",
            Self::Human => "human",
            Self::System => "system",
        }
    }

    /// Precedence tier. Lower numbers win.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Client => 1,
            Self::Synth => 2,
            Self::SynthClass => 3,
            Self::SkillModule => 4,
            Self::Human => 5,
            Self::System => 6,
        }
    }

    /// Name of the actor-directory collection that owns IDs of this kind.
    ///
    /// `System` has no directory entry: system realms always exist.
    #[must_use]
    pub const fn directory_collection(self) -> Option<&'static str> {
        match self {
            Self::Client => Some("clients"),
            Self::Synth => Some("synths"),
            Self::SynthClass => Some("synth_classes"),
            Self::SkillModule => Some("skill_modules"),
            Self::Human => Some("client_users"),
            Self::System => None,
        }
    }
}

impl fmt::Display for RealmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RealmKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::InvalidRealmKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// RealmRef
// ---------------------------------------------------------------------------

/// A concrete realm: a kind plus the ID of the actor that owns it.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct RealmRef {
    pub kind: RealmKind,
    pub id: String,
}

impl RealmRef {
    #[must_use]
    pub fn new(kind: RealmKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn client(id: impl Into<String>) -> Self {
        Self::new(RealmKind::Client, id)
    }

    #[must_use]
    pub fn synth(id: impl Into<String>) -> Self {
        Self::new(RealmKind::Synth, id)
    }

    #[must_use]
    pub fn synth_class(id: impl Into<String>) -> Self {
        Self::new(RealmKind::SynthClass, id)
    }

    #[must_use]
    pub fn skill_module(id: impl Into<String>) -> Self {
        Self::new(RealmKind::SkillModule, id)
    }

    #[must_use]
    pub const fn precedence(&self) -> u8 {
        self.kind.precedence()
    }

    /// Parse the `kind:id` form produced by `Display`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRealmKind` for an unknown kind and
    /// `CoreError::Validation` when the separator or ID is missing.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| CoreError::Validation(format!("realm '{s}' is not 'kind:id'")))?;
        if id.is_empty() {
            return Err(CoreError::Validation(format!("realm '{s}' has an empty id")));
        }
        Ok(Self::new(kind.parse()?, id))
    }
}

impl fmt::Display for RealmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ---------------------------------------------------------------------------
// RealmMembership
// ---------------------------------------------------------------------------

/// The realms a caller can see, as reported by the membership directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RealmMembership {
    /// The caller's own realm.
    pub own: RealmRef,
    /// Inherited synth class, for synth callers.
    #[serde(default)]
    pub synth_class: Option<RealmRef>,
    /// Subscribed skill modules, in subscription order.
    #[serde(default)]
    pub skill_modules: Vec<RealmRef>,
    /// The owning client.
    #[serde(default)]
    pub client: Option<RealmRef>,
}

impl RealmMembership {
    /// Membership that only sees the caller's own realm.
    #[must_use]
    pub const fn solo(own: RealmRef) -> Self {
        Self {
            own,
            synth_class: None,
            skill_modules: Vec::new(),
            client: None,
        }
    }

    /// All visible realms, deduplicated and ordered by precedence tier.
    ///
    /// Realms sharing a tier (several skill modules) are ordered by realm ID,
    /// which is also the tie-break order during resolution.
    #[must_use]
    pub fn visible_realms(&self) -> Vec<RealmRef> {
        let mut realms: Vec<RealmRef> = Vec::with_capacity(3 + self.skill_modules.len());
        let candidates = std::iter::once(&self.own)
            .chain(self.client.iter())
            .chain(self.synth_class.iter())
            .chain(self.skill_modules.iter());
        for realm in candidates {
            if !realms.contains(realm) {
                realms.push(realm.clone());
            }
        }
        // Derived `Ord` compares kind first, and kinds are declared in tier order.
        realms.sort();
        realms
    }

    /// Whether `realm` is visible to this caller.
    #[must_use]
    pub fn can_see(&self, realm: &RealmRef) -> bool {
        &self.own == realm
            || self.client.as_ref() == Some(realm)
            || self.synth_class.as_ref() == Some(realm)
            || self.skill_modules.contains(realm)
    }
}
