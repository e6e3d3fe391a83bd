use crate::error::ModelError;

/// Declares an opaque, backend-assigned identifier.
///
/// The backend hands these out as strings (UUIDs today). The client never
/// inspects them, so they are carried verbatim.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier, rejecting blank input.
            pub fn parse(raw: impl Into<String>) -> Result<Self, ModelError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(ModelError::EmptyId($label));
                }
                if trimmed.len() == raw.len() {
                    Ok(Self(raw))
                } else {
                    Ok(Self(trimmed.to_string()))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Identifier of an uploaded project, assigned at creation.
    ProjectId,
    "project id"
);
opaque_id!(
    /// Identifier of a generation job started for a project.
    JobId,
    "job id"
);
opaque_id!(
    /// Identifier of an output format in the format catalog.
    FormatId,
    "format id"
);
opaque_id!(
    /// Identifier of a source or generated asset.
    AssetId,
    "asset id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ids_are_rejected() {
        assert_eq!(
            ProjectId::parse("   "),
            Err(ModelError::EmptyId("project id"))
        );
        assert!(JobId::parse("").is_err());
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let id: FormatId = " f1 ".parse().unwrap();
        assert_eq!(id.as_str(), "f1");
    }
}
