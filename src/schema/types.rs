use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Boolean,
    Int,
    Long,
    Date,       // Date only
    Timestamp,
    String,
    Html,
    Json,
    Principal,
    ImageRef,
    Binary,     // Never indexed or stored
}

impl ValueType {
    /// String subkinds share the string encoding
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            ValueType::String | ValueType::Html | ValueType::Json | ValueType::Principal | ValueType::ImageRef
        )
    }

    /// Types that get a second, lower-cased search field
    pub fn has_lowercase_field(&self) -> bool {
        matches!(self, ValueType::String | ValueType::Html | ValueType::Json)
    }
}

/// Namespace prefix plus local name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyKey {
    pub prefix: Option<String>,
    pub name: String,
}

impl PropertyKey {
    pub fn new(prefix: Option<&str>, name: &str) -> Self {
        PropertyKey {
            prefix: prefix.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn local(name: &str) -> Self {
        Self::new(None, name)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Type definition as supplied by the content repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyTypeDefinition {
    pub key: PropertyKey,
    pub value_type: ValueType,
    pub multiple: bool,
    pub indexable_json_attributes: Vec<String>,  // Top-level JSON keys to expand
}

impl PropertyTypeDefinition {
    pub fn new(prefix: Option<&str>, name: &str, value_type: ValueType) -> Self {
        PropertyTypeDefinition {
            key: PropertyKey::new(prefix, name),
            value_type,
            multiple: false,
            indexable_json_attributes: Vec::new(),
        }
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn with_json_attributes(mut self, attributes: &[&str]) -> Self {
        self.indexable_json_attributes = attributes.iter().map(|a| a.to_string()).collect();
        self
    }
}

/// Type-definition lookup offered by the content repository
pub trait TypeDefinitions: Send + Sync {
    fn definition(&self, key: &PropertyKey) -> Option<Arc<PropertyTypeDefinition>>;

    /// Every definition known at startup
    fn definitions(&self) -> Vec<Arc<PropertyTypeDefinition>>;
}

/// Fixed, in-memory set of definitions
#[derive(Debug, Default)]
pub struct StaticTypeRegistry {
    definitions: HashMap<PropertyKey, Arc<PropertyTypeDefinition>>,
}

impl StaticTypeRegistry {
    pub fn new() -> Self {
        StaticTypeRegistry {
            definitions: HashMap::new(),
        }
    }

    pub fn register(&mut self, definition: PropertyTypeDefinition) -> Arc<PropertyTypeDefinition> {
        let definition = Arc::new(definition);
        self.definitions.insert(definition.key.clone(), definition.clone());
        definition
    }
}

impl FromIterator<PropertyTypeDefinition> for StaticTypeRegistry {
    fn from_iter<I: IntoIterator<Item = PropertyTypeDefinition>>(iter: I) -> Self {
        let mut registry = StaticTypeRegistry::new();
        for definition in iter {
            registry.register(definition);
        }
        registry
    }
}

impl TypeDefinitions for StaticTypeRegistry {
    fn definition(&self, key: &PropertyKey) -> Option<Arc<PropertyTypeDefinition>> {
        self.definitions.get(key).cloned()
    }

    fn definitions(&self) -> Vec<Arc<PropertyTypeDefinition>> {
        let mut all: Vec<_> = self.definitions.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }
}
