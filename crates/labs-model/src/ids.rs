//! Identifier types
//!
//! Pipeline-owned entities get ULID identifiers (sortable by creation time).
//! Identities that come from outside the pipeline (procedures, crew, projects,
//! stored photos) are opaque strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate a new identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an externally issued identifier
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

ulid_id!(
    /// Unique observation identifier
    ObservationId
);
ulid_id!(
    /// Unique submission identifier
    SubmissionId
);
ulid_id!(
    /// Unique experiment identifier
    ExperimentId
);
ulid_id!(
    /// Unique knowledge item identifier
    KnowledgeItemId
);
ulid_id!(
    /// Unique ballot identifier
    BallotId
);

external_id!(
    /// Standard operating procedure identifier
    SopId
);
external_id!(
    /// Crew member identifier (already authenticated upstream)
    CrewMemberId
);
external_id!(
    /// Project identifier
    ProjectId
);
external_id!(
    /// Reference to a photo held by the external file store
    PhotoRef
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulid_ids_are_unique_and_ordered() {
        let a = ObservationId::new();
        let b = ObservationId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 26);
    }

    #[test]
    fn external_ids_serialize_transparently() {
        let id = CrewMemberId::new("crew-7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"crew-7\"");
        assert_eq!(id.as_str(), "crew-7");
    }
}
