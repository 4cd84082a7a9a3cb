use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use crate::schema::types::{PropertyKey, PropertyTypeDefinition, TypeDefinitions};

// Reserved system fields. The leading underscore keeps them apart from
// property field names, which are registered only if they do not clash.
pub const PATH: &str = "_path";
pub const PATH_DEPTH: &str = "_depth";
pub const PATH_ANCESTORS: &str = "_ancestors";
pub const TYPE_NAME: &str = "_type";
pub const ID: &str = "_id";
pub const ACL_INHERITED_FROM: &str = "_acl_inherited";
pub const ACL_READ_PRINCIPALS: &str = "_acl_read";

pub const RESERVED: [&str; 7] = [
    PATH,
    PATH_DEPTH,
    PATH_ANCESTORS,
    TYPE_NAME,
    ID,
    ACL_INHERITED_FROM,
    ACL_READ_PRINCIPALS,
];

/// Principal granting read access to everyone
pub const ALL_PRINCIPALS: &str = "pseudo:all";

const LOWERCASE_PREFIX: &str = "l#";
const STORED_PREFIX: &str = "b#";
/// Between a JSON property's field name and the attribute key
pub const JSON_ATTRIBUTE_SEPARATOR: char = '@';

/// Engine field names used for one property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFields {
    pub search: String,
    pub lowercase: Option<String>,
    pub stored: String,
    pub json_attributes: Vec<(String, String)>,  // (attribute, field)
}

/// Immutable two-way table between type definitions and field names.
/// Built once from the definitions known at startup.
#[derive(Debug, Default)]
pub struct FieldNames {
    by_key: HashMap<PropertyKey, PropertyFields>,
    by_stored: HashMap<String, Arc<PropertyTypeDefinition>>,
    by_search: HashMap<String, Arc<PropertyTypeDefinition>>,
}

impl FieldNames {
    pub fn build(types: &dyn TypeDefinitions) -> Self {
        let mut names = FieldNames::default();
        for definition in types.definitions() {
            names.register(definition);
        }
        names
    }

    fn register(&mut self, definition: Arc<PropertyTypeDefinition>) {
        let search = definition.key.to_string();
        if is_reserved(&search) {
            warn!(property = %definition.key, "property name clashes with a system field, not indexed");
            return;
        }

        let fields = PropertyFields {
            lowercase: definition.value_type.has_lowercase_field()
                .then(|| format!("{}{}", LOWERCASE_PREFIX, search)),
            stored: format!("{}{}", STORED_PREFIX, search),
            json_attributes: definition.indexable_json_attributes.iter()
                .map(|attr| (attr.clone(), format!("{}{}{}", search, JSON_ATTRIBUTE_SEPARATOR, attr)))
                .collect(),
            search,
        };

        self.by_stored.insert(fields.stored.clone(), definition.clone());
        self.by_search.insert(fields.search.clone(), definition.clone());
        if let Some(lowercase) = &fields.lowercase {
            self.by_search.insert(lowercase.clone(), definition.clone());
        }
        for (_, field) in &fields.json_attributes {
            self.by_search.insert(field.clone(), definition.clone());
        }
        self.by_key.insert(definition.key.clone(), fields);
    }

    pub fn fields(&self, key: &PropertyKey) -> Option<&PropertyFields> {
        self.by_key.get(key)
    }

    pub fn search_field(&self, key: &PropertyKey) -> Option<&str> {
        self.fields(key).map(|f| f.search.as_str())
    }

    pub fn lowercase_field(&self, key: &PropertyKey) -> Option<&str> {
        self.fields(key).and_then(|f| f.lowercase.as_deref())
    }

    pub fn stored_field(&self, key: &PropertyKey) -> Option<&str> {
        self.fields(key).map(|f| f.stored.as_str())
    }

    pub fn json_attribute_field(&self, key: &PropertyKey, attribute: &str) -> Option<&str> {
        self.fields(key)?
            .json_attributes.iter()
            .find(|(attr, _)| attr == attribute)
            .map(|(_, field)| field.as_str())
    }

    /// Definition behind a stored field name
    pub fn definition_for_stored(&self, field: &str) -> Option<&Arc<PropertyTypeDefinition>> {
        self.by_stored.get(field)
    }

    /// Definition behind any search field (plain, lower-cased or JSON attribute)
    pub fn definition_for_search(&self, field: &str) -> Option<&Arc<PropertyTypeDefinition>> {
        self.by_search.get(field)
    }

    pub fn is_lowercase_field(&self, field: &str) -> bool {
        field.starts_with(LOWERCASE_PREFIX)
    }

    /// Key encoded in a stored field name the table does not know about
    pub fn parse_stored_name(field: &str) -> Option<PropertyKey> {
        let qualified = field.strip_prefix(STORED_PREFIX)?;
        Some(match qualified.split_once(':') {
            Some((prefix, name)) => PropertyKey::new(Some(prefix), name),
            None => PropertyKey::local(qualified),
        })
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

pub fn is_reserved(field: &str) -> bool {
    RESERVED.contains(&field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{StaticTypeRegistry, ValueType};

    fn registry() -> StaticTypeRegistry {
        [
            PropertyTypeDefinition::new(None, "x", ValueType::Int),
            PropertyTypeDefinition::new(Some("dc"), "title", ValueType::String),
            PropertyTypeDefinition::new(None, "meta", ValueType::Json).with_json_attributes(&["author"]),
            PropertyTypeDefinition::new(None, "_path", ValueType::String),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_names_resolve_both_ways() {
        let names = FieldNames::build(&registry());
        let title = PropertyKey::new(Some("dc"), "title");

        assert_eq!(names.search_field(&title), Some("dc:title"));
        assert_eq!(names.lowercase_field(&title), Some("l#dc:title"));
        assert_eq!(names.stored_field(&title), Some("b#dc:title"));
        assert_eq!(names.definition_for_stored("b#dc:title").unwrap().key, title);
        assert_eq!(names.definition_for_search("l#dc:title").unwrap().key, title);

        let x = PropertyKey::local("x");
        assert_eq!(names.lowercase_field(&x), None);
        assert_eq!(
            names.json_attribute_field(&PropertyKey::local("meta"), "author"),
            Some("meta@author")
        );
    }

    #[test]
    fn test_reserved_clash_is_skipped() {
        let names = FieldNames::build(&registry());
        assert_eq!(names.len(), 3);
        assert!(names.fields(&PropertyKey::local("_path")).is_none());
    }

    #[test]
    fn test_parse_unknown_stored_name() {
        assert_eq!(FieldNames::parse_stored_name("b#ns:gone"), Some(PropertyKey::new(Some("ns"), "gone")));
        assert_eq!(FieldNames::parse_stored_name("b#gone"), Some(PropertyKey::local("gone")));
        assert_eq!(FieldNames::parse_stored_name(PATH), None);
    }
}
