//! Domain newtypes
//!
//! Strongly-typed wrappers around the identifiers the core passes around.
//! `Guid` is server-assigned and opaque; `LocalId` is client-chosen and
//! stable even before the server has ever heard of the entity. Every
//! cross-entity reference in this crate is carried as `(LocalId,
//! Option<Guid>)`, per the specification's "Object identity across local
//! and remote" design note.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// A server-assigned opaque identifier.
///
/// Evernote guids are UUID-shaped strings in practice, but the service does
/// not document a strict grammar; this type only rejects the empty string,
/// matching the original implementation's permissiveness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::InvalidId("guid must not be empty".into()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Guid {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A client-chosen stable identifier that exists for an entity even before
/// it has ever been synced to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("invalid local id: {e}")))
    }
}

/// A server-assigned update sequence number. Monotonically increasing per
/// account-scope; advanced by the server on every modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Usn(pub i32);

impl Usn {
    pub const ZERO: Usn = Usn(0);

    pub fn next(self) -> Usn {
        Usn(self.0 + 1)
    }
}

impl Display for Usn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cross-entity reference that may or may not have been resolved to a
/// server guid yet. The upload pipeline is responsible for backfilling the
/// guid once the referent has been synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
}

impl EntityRef {
    pub fn new(local_id: LocalId) -> Self {
        Self {
            local_id,
            guid: None,
        }
    }

    pub fn with_guid(local_id: LocalId, guid: Guid) -> Self {
        Self {
            local_id,
            guid: Some(guid),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.guid.is_some()
    }
}
