use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::MappingError;

/// An absolute, `/`-separated location of a node inside a store.
///
/// `/` is the root group. Components are non-empty and never `.` or `..`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(String);

impl NodePath {
    /// Returns the root group path.
    pub fn root() -> Self {
        NodePath("/".to_string())
    }

    /// Parses and validates an absolute node path.
    pub fn parse(path: &str) -> Result<Self, MappingError> {
        if path == "/" {
            return Ok(Self::root());
        }
        let Some(rest) = path.strip_prefix('/') else {
            return Err(MappingError::configuration(format!(
                "node path {path:?} is not absolute"
            )));
        };
        for component in rest.split('/') {
            validate_component(component)
                .map_err(|reason| MappingError::configuration(format!("node path {path:?}: {reason}")))?;
        }
        Ok(NodePath(path.to_string()))
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the path into its parent group and leaf name.
    ///
    /// Returns None for the root, which has no parent.
    pub fn split(&self) -> Option<(NodePath, &str)> {
        if self.is_root() {
            return None;
        }
        let idx = self.0.rfind('/')?;
        let parent = if idx == 0 {
            Self::root()
        } else {
            NodePath(self.0[..idx].to_string())
        };
        Some((parent, &self.0[idx + 1..]))
    }

    pub fn parent(&self) -> Option<NodePath> {
        self.split().map(|(parent, _)| parent)
    }

    /// Returns the leaf name, or an empty string for the root.
    pub fn name(&self) -> &str {
        self.split().map(|(_, leaf)| leaf).unwrap_or("")
    }

    /// Appends a single child component.
    pub fn join(&self, child: &str) -> Result<NodePath, MappingError> {
        validate_component(child)
            .map_err(|reason| MappingError::configuration(format!("node name {child:?}: {reason}")))?;
        if self.is_root() {
            Ok(NodePath(format!("/{child}")))
        } else {
            Ok(NodePath(format!("{}/{child}", self.0)))
        }
    }

    /// Returns true if `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// Every proper ancestor, from the root down to the direct parent.
    pub fn ancestors(&self) -> Vec<NodePath> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            out.push(path);
        }
        out.reverse();
        out
    }
}

fn validate_component(component: &str) -> Result<(), &'static str> {
    match component {
        "" => Err("empty path component"),
        "." | ".." => Err("relative path component"),
        _ if component.contains('/') => Err("component contains '/'"),
        _ => Ok(()),
    }
}

impl FromStr for NodePath {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({})", self.0)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NodePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NodePath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "data", "/data/", "//data", "/a//b", "/a/../b", "/."] {
            assert!(NodePath::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn split_and_join() {
        let path = NodePath::parse("/arrays/earray").unwrap();
        let (parent, leaf) = path.split().unwrap();
        assert_eq!(parent.as_str(), "/arrays");
        assert_eq!(leaf, "earray");
        assert_eq!(parent.join(leaf).unwrap(), path);

        let top = NodePath::parse("/table").unwrap();
        assert_eq!(top.parent(), Some(NodePath::root()));
        assert!(NodePath::root().split().is_none());
    }

    #[test]
    fn join_rejects_nested_names() {
        assert!(NodePath::root().join("a/b").is_err());
        assert!(NodePath::root().join("").is_err());
    }

    #[test]
    fn ancestry() {
        let group = NodePath::parse("/data").unwrap();
        let leaf = NodePath::parse("/data/table").unwrap();
        let sibling = NodePath::parse("/database").unwrap();

        assert!(group.is_ancestor_of(&leaf));
        assert!(!group.is_ancestor_of(&sibling));
        assert!(!group.is_ancestor_of(&group));
        assert!(NodePath::root().is_ancestor_of(&group));

        let ancestors: Vec<_> = leaf.ancestors().iter().map(|p| p.to_string()).collect();
        assert_eq!(ancestors, vec!["/", "/data"]);
    }
}
