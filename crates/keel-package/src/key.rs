//! Package keys (`Vendor.PackageName`)

use crate::{PackageError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validated package identifier
///
/// One or more dot-separated segments, each starting with an uppercase ASCII
/// letter followed by ASCII letters or digits. Keys compare case-sensitively;
/// [`PackageKey::lookup_form`] gives the case-folded form used for lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageKey(String);

impl PackageKey {
    /// Parse and validate a package key
    pub fn parse(key: &str) -> Result<Self> {
        Self::validate(key)?;
        Ok(Self(key.to_string()))
    }

    /// Validate key format
    pub fn validate(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(PackageError::InvalidKey(
                "package key cannot be empty".to_string(),
            ));
        }

        for segment in key.split('.') {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) if first.is_ascii_uppercase() => {}
                Some(_) => {
                    return Err(PackageError::InvalidKey(format!(
                        "'{}': segment '{}' must start with an uppercase letter",
                        key, segment
                    )));
                }
                None => {
                    return Err(PackageError::InvalidKey(format!(
                        "'{}' contains an empty segment",
                        key
                    )));
                }
            }

            if !chars.all(|c| c.is_ascii_alphanumeric()) {
                return Err(PackageError::InvalidKey(format!(
                    "'{}': segment '{}' may only contain letters and digits",
                    key, segment
                )));
            }
        }

        Ok(())
    }

    /// Derive a key from a manifest's external name (`acme/foo-bar` -> `Acme.FooBar`)
    pub fn from_external_name(name: &str) -> Option<Self> {
        let segments: Vec<String> = name
            .split(['/', '.'])
            .map(camel_case)
            .collect();
        Self::parse(&segments.join(".")).ok()
    }

    /// Derive a key from a directory name (`foo-bar` -> `FooBar`, `acme.foo` -> `Acme.Foo`)
    pub fn from_directory_name(name: &str) -> Option<Self> {
        Self::from_external_name(name)
    }

    /// Case-folded form used for case-insensitive lookups
    pub fn lookup_form(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// First segment of the key
    pub fn vendor(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// External name used for packages created from this key
    ///
    /// `Acme.Foo.Bar` becomes `acme/foo-bar`; a single-segment key maps to
    /// itself lower-cased.
    pub fn default_external_name(&self) -> String {
        let mut segments = self.0.split('.');
        let vendor = segments.next().unwrap_or_default().to_ascii_lowercase();
        let rest: Vec<String> = segments.map(|s| s.to_ascii_lowercase()).collect();
        if rest.is_empty() {
            vendor
        } else {
            format!("{}/{}", vendor, rest.join("-"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Upper-case the first letter of every `-`/`_` separated piece and drop the separators
fn camel_case(part: &str) -> String {
    part.split(['-', '_'])
        .map(|piece| {
            let mut chars = piece.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PackageKey {
    type Error = PackageError;

    fn try_from(value: String) -> Result<Self> {
        Self::validate(&value)?;
        Ok(Self(value))
    }
}

impl From<PackageKey> for String {
    fn from(key: PackageKey) -> Self {
        key.0
    }
}

impl std::str::FromStr for PackageKey {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Acme")]
    #[case("Acme.Foo")]
    #[case("Acme.Foo2.Bar")]
    #[case("Acme.ContentRepository")]
    fn test_valid_keys(#[case] key: &str) {
        assert!(PackageKey::parse(key).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("acme.Foo")]
    #[case("Acme..Foo")]
    #[case("Acme.")]
    #[case("Acme.Foo-Bar")]
    #[case("Acme.2Foo")]
    #[case("Acme/Foo")]
    fn test_invalid_keys(#[case] key: &str) {
        assert!(matches!(
            PackageKey::parse(key),
            Err(PackageError::InvalidKey(_))
        ));
    }

    #[rstest]
    #[case("acme/foo", "Acme.Foo")]
    #[case("acme/foo-bar", "Acme.FooBar")]
    #[case("acme/foo_bar.baz", "Acme.FooBar.Baz")]
    #[case("Acme.Foo", "Acme.Foo")]
    #[case("acme/content-repository-tools", "Acme.ContentRepositoryTools")]
    fn test_from_external_name(#[case] name: &str, #[case] expected: &str) {
        let key = PackageKey::from_external_name(name).unwrap();
        assert_eq!(key.as_str(), expected);
    }

    #[test]
    fn test_from_external_name_rejects_underivable() {
        assert!(PackageKey::from_external_name("acme/1foo").is_none());
        assert!(PackageKey::from_external_name("acme//foo").is_none());
        assert!(PackageKey::from_external_name("acme/foo+bar").is_none());
    }

    #[test]
    fn test_lookup_form() {
        let key = PackageKey::parse("Acme.FooBar").unwrap();
        assert_eq!(key.lookup_form(), "acme.foobar");
        assert_eq!(key.vendor(), "Acme");
    }

    #[rstest]
    #[case("Acme.Foo", "acme/foo")]
    #[case("Acme.Foo.Bar", "acme/foo-bar")]
    #[case("Acme", "acme")]
    fn test_default_external_name(#[case] key: &str, #[case] expected: &str) {
        let key = PackageKey::parse(key).unwrap();
        assert_eq!(key.default_external_name(), expected);
    }
}
