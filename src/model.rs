// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Model descriptions and the [`Searchable`] contract.
//!
//! The search layer never talks to host application types directly. A host
//! registers a static [`ModelDescriptor`] per searchable type and implements
//! [`Searchable`] on its objects; everything else (extraction, indexing,
//! filtering) is driven through those two surfaces.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Primary key shape of a searchable model.
///
/// `Int` marks keys that fit the denormalized integer column on index
/// entries, which enables the fast integer join when filtering. `BigInt`
/// keys are deliberately kept on the generic text path: values near the
/// top of the 64-bit range survive the round-trip through a text column,
/// where a lossy numeric cast would not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkKind {
    Int,
    BigInt,
    Uuid,
    Text,
}

impl PkKind {
    /// Whether entries for this model populate the denormalized integer
    /// object id column.
    pub fn uses_int_column(&self) -> bool {
        matches!(self, PkKind::Int)
    }
}

/// A concrete primary key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimaryKey {
    Int(i64),
    Uuid(Uuid),
    Text(String),
}

impl PrimaryKey {
    /// Canonical text form, used for the universal `object_id` column.
    /// UUIDs serialize hyphenated and lowercase.
    pub fn as_text(&self) -> String {
        match self {
            PrimaryKey::Int(v) => v.to_string(),
            PrimaryKey::Uuid(u) => u.hyphenated().to_string(),
            PrimaryKey::Text(s) => s.clone(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PrimaryKey::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Static description of a searchable model: how it is named in the index,
/// where its rows live, and which fields are searchable by default.
///
/// `content_type` is the stable label stored on every index entry for the
/// model ("blog.article"). `db_table` / `pk_column` let the store join index
/// entries back onto the model's own table when filtering.
#[derive(Debug)]
pub struct ModelDescriptor {
    pub content_type: &'static str,
    pub db_table: &'static str,
    pub pk_column: &'static str,
    pub pk_kind: PkKind,
    /// Fields indexed when the adapter config names none explicitly.
    pub text_fields: &'static [&'static str],
}

/// Value returned by [`Searchable::field`].
///
/// `Related` and `Many` let field paths traverse into other searchable
/// objects ("author.name", "tags.label").
pub enum FieldValue {
    Text(String),
    Related(Arc<dyn Searchable>),
    Many(Vec<Arc<dyn Searchable>>),
    Null,
}

/// Contract a host object must satisfy to be indexed.
pub trait Searchable: Send + Sync {
    /// The descriptor this object belongs to.
    fn descriptor(&self) -> &'static ModelDescriptor;

    /// This object's primary key.
    fn pk(&self) -> PrimaryKey;

    /// Human-readable representation, the default title source.
    fn display(&self) -> String;

    /// Look up a named field. `None` means the field does not exist on this
    /// object, which is reported as an adapter error during extraction.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Canonical URL for the object, if it has one.
    fn absolute_url(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_pk_text_forms() {
        assert_eq!(PrimaryKey::Int(42).as_text(), "42");
        assert_eq!(PrimaryKey::Text("slug-9".into()).as_text(), "slug-9");
        let u = Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
        assert_eq!(
            PrimaryKey::Uuid(u).as_text(),
            "6ba7b810-9dad-11d1-80b4-00c04fd430c8"
        );
    }

    #[test]
    fn happy_int_column_eligibility() {
        assert!(PkKind::Int.uses_int_column());
        assert!(!PkKind::BigInt.uses_int_column());
        assert!(!PkKind::Uuid.uses_int_column());
        assert!(!PkKind::Text.uses_int_column());
        assert_eq!(PrimaryKey::Int(7).as_int(), Some(7));
        assert_eq!(PrimaryKey::Text("7".into()).as_int(), None);
    }
}
