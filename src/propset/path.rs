use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};

/// Absolute, slash-separated hierarchical path. `/` is the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(String);

impl Path {
    pub fn root() -> Self {
        Path("/".to_string())
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s == "/" {
            return Ok(Self::root());
        }
        if !s.starts_with('/') || s.ends_with('/') {
            return Err(Error::invalid_argument(format!("Invalid path '{}'", s)));
        }
        if s[1..].split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(Error::invalid_argument(format!("Invalid path segment in '{}'", s)));
        }
        Ok(Path(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Root is 0, `/a` is 1
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(i) => Some(Path(self.0[..i].to_string())),
            None => None,
        }
    }

    /// Proper ancestors, root first
    pub fn ancestors(&self) -> Vec<Path> {
        let mut ancestors = Vec::with_capacity(self.depth());
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            ancestors.push(path);
        }
        ancestors.reverse();
        ancestors
    }

    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    pub fn child(&self, name: &str) -> Result<Path> {
        if self.is_root() {
            Path::parse(&format!("/{}", name))
        } else {
            Path::parse(&format!("{}/{}", self.0, name))
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}
