//! Strong type definitions for the Veil engine.
//!
//! Identifiers and principal names are newtypes to prevent misuse at
//! compile time: an owner username cannot be swapped for a grant id.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds in one day, the unit policies use for durations.
pub const DAY_MS: i64 = 86_400_000;

/// A profile username, used for both owners and viewers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(pub String);

impl Username {
    /// Create a username from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the username as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque reference to a single protected resource instance.
///
/// Images are individually addressable, so an owner with N images has N
/// distinct refs. Scalar PII fields (email, phone, ...) carry no ref.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(pub String);

impl ResourceRef {
    /// Create a resource ref from anything string-like.
    pub fn new(r: impl Into<String>) -> Self {
        Self(r.into())
    }

    /// Get the ref as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the canonical hyphenated form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for an access grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(pub Uuid);

impl GrantId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the canonical hyphenated form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kinds of protected profile data the engine governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Profile photos. Individually addressed via [`ResourceRef`].
    Images,
    /// Contact email address.
    ContactEmail,
    /// Contact phone number.
    ContactNumber,
    /// LinkedIn profile URL.
    LinkedinUrl,
    /// Date of birth.
    DateOfBirth,
}

impl ResourceType {
    /// All resource types, in a stable order.
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Images,
        ResourceType::ContactEmail,
        ResourceType::ContactNumber,
        ResourceType::LinkedinUrl,
        ResourceType::DateOfBirth,
    ];

    /// Stable string form, used for storage columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Images => "images",
            ResourceType::ContactEmail => "contact_email",
            ResourceType::ContactNumber => "contact_number",
            ResourceType::LinkedinUrl => "linkedin_url",
            ResourceType::DateOfBirth => "date_of_birth",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "images" => Some(ResourceType::Images),
            "contact_email" => Some(ResourceType::ContactEmail),
            "contact_number" => Some(ResourceType::ContactNumber),
            "linkedin_url" => Some(ResourceType::LinkedinUrl),
            "date_of_birth" => Some(ResourceType::DateOfBirth),
            _ => None,
        }
    }

    /// Whether resources of this type are individually addressed.
    ///
    /// Only images carry a [`ResourceRef`]; the scalar PII fields are a
    /// single value per owner.
    pub fn is_addressable(&self) -> bool {
        matches!(self, ResourceType::Images)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
