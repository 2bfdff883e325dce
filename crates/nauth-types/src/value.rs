//! Set-semantics value types shared by several CRDs (spec.md §4.1).
//!
//! `StringList`/`TagList`/`CidrList` all decode from either a JSON array or a
//! comma-separated string, and store their elements deduplicated. Tags and
//! CIDRs canonicalize case-insensitively on insertion; `StringList` does not.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

fn split_or_array<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct V;
    impl<'de> Visitor<'de> for V {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a JSON array of strings or a comma-separated string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                out.push(item);
            }
            Ok(out)
        }
    }
    deserializer.deserialize_any(V)
}

macro_rules! set_list {
    ($name:ident, $canon:expr) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, schemars::JsonSchema)]
        #[serde(transparent)]
        pub struct $name(Vec<String>);

        impl $name {
            pub fn new() -> Self {
                Self(Vec::new())
            }

            pub fn add(&mut self, value: impl Into<String>) {
                let canon: fn(&str) -> String = $canon;
                let value = canon(&value.into());
                if !self.contains(&value) {
                    self.0.push(value);
                }
            }

            pub fn remove(&mut self, value: &str) {
                let canon: fn(&str) -> String = $canon;
                let value = canon(value);
                self.0.retain(|v| *v != value);
            }

            pub fn contains(&self, value: &str) -> bool {
                let canon: fn(&str) -> String = $canon;
                let value = canon(value);
                self.0.iter().any(|v| *v == value)
            }

            pub fn iter(&self) -> std::slice::Iter<'_, String> {
                self.0.iter()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }
        }

        impl FromIterator<String> for $name {
            fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
                let mut out = Self::new();
                for v in iter {
                    out.add(v);
                }
                out
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = split_or_array(deserializer)?;
                Ok(raw.into_iter().collect())
            }
        }
    };
}

set_list!(StringList, |s: &str| s.to_string());
set_list!(TagList, |s: &str| s.to_ascii_lowercase());
set_list!(CidrList, |s: &str| s.to_ascii_lowercase());

/// A time-of-day window a user is permitted to connect within, e.g. `"01:00:00-06:00:00"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_list_accepts_csv() {
        let v: StringList = serde_json::from_str(r#""a, b ,c""#).unwrap();
        assert_eq!(v.len(), 3);
        assert!(v.contains("b"));
    }

    #[test]
    fn string_list_accepts_array() {
        let v: StringList = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn tag_list_canonicalizes_case() {
        let mut t = TagList::new();
        t.add("Foo");
        assert!(t.contains("foo"));
        t.add("FOO");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn cidr_list_dedupes_case_insensitively() {
        let v: CidrList = serde_json::from_str(r#"["10.0.0.0/8","10.0.0.0/8"]"#).unwrap();
        assert_eq!(v.len(), 1);
    }
}
