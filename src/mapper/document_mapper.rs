use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::codec::value_codec::ValueCodec;
use crate::core::error::{Error, Result};
use crate::core::types::{Document, Field};
use crate::index::index_reader::FieldSelector;
use crate::index::term::Term;
use crate::mapper::field_names::{self, FieldNames, PropertyFields};
use crate::propset::model::{Property, PropertySet, Value};
use crate::propset::path::Path;
use crate::schema::types::{PropertyKey, PropertyTypeDefinition, TypeDefinitions, ValueType};

/// Which properties `DocumentMapper::from_document` should load.
/// System fields are always loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PropertySelector {
    #[default]
    All,
    Only(HashSet<PropertyKey>),
}

impl PropertySelector {
    pub fn only(keys: impl IntoIterator<Item = PropertyKey>) -> Self {
        PropertySelector::Only(keys.into_iter().collect())
    }

    pub fn includes(&self, key: &PropertyKey) -> bool {
        match self {
            PropertySelector::All => true,
            PropertySelector::Only(keys) => keys.contains(key),
        }
    }
}

/// Engine-side selector derived from a `PropertySelector`
pub struct StoredFieldSelector {
    names: Option<HashSet<String>>,   // None loads everything
}

impl FieldSelector for StoredFieldSelector {
    fn accept(&self, field: &str) -> bool {
        match &self.names {
            None => true,
            Some(names) => field_names::is_reserved(field) || names.contains(field),
        }
    }
}

/// Maps property sets to engine documents and back
pub struct DocumentMapper {
    types: Arc<dyn TypeDefinitions>,
    names: FieldNames,
}

impl DocumentMapper {
    pub fn new(types: Arc<dyn TypeDefinitions>) -> Self {
        let names = FieldNames::build(types.as_ref());
        debug!(properties = names.len(), "built field name table");
        DocumentMapper { types, names }
    }

    pub fn field_names(&self) -> &FieldNames {
        &self.names
    }

    pub fn types(&self) -> &Arc<dyn TypeDefinitions> {
        &self.types
    }

    pub fn to_document(&self, ps: &PropertySet, acl_read_principals: &[String]) -> Result<Document> {
        let mut doc = Document::new();

        doc.add(Field::indexed_stored(field_names::PATH, ps.path.as_str()));
        doc.add(Field::indexed(field_names::PATH_DEPTH, ValueCodec::encode_int(ps.path.depth() as i32)));
        for ancestor in ps.path.ancestors() {
            doc.add(Field::indexed(field_names::PATH_ANCESTORS, ancestor.as_str()));
        }
        doc.add(Field::indexed_stored(field_names::TYPE_NAME, ps.type_name.as_str()));
        Self::add_int(&mut doc, field_names::ID, ps.id);
        Self::add_int(&mut doc, field_names::ACL_INHERITED_FROM, ps.acl_inherited_from);

        // Public read needs no other principal
        let public = acl_read_principals.iter().any(|p| p == field_names::ALL_PRINCIPALS);
        let principals: Vec<&str> = if public {
            vec![field_names::ALL_PRINCIPALS]
        } else {
            acl_read_principals.iter().map(String::as_str).collect()
        };
        for principal in principals {
            doc.add(Field::indexed(field_names::ACL_READ_PRINCIPALS, principal));
            doc.add(Field::stored_bytes(field_names::ACL_READ_PRINCIPALS, principal.as_bytes().to_vec()));
        }

        for property in &ps.properties {
            let Some(fields) = self.names.fields(property.key()) else {
                debug!(property = %property.key(), path = %ps.path, "no type definition for property, not indexed");
                continue;
            };
            if property.definition.value_type == ValueType::Binary {
                continue;
            }
            self.add_property(&mut doc, property, fields)?;
        }

        Ok(doc)
    }

    fn add_int(doc: &mut Document, name: &str, value: i32) {
        doc.add(Field::indexed(name, ValueCodec::encode_int(value)));
        doc.add(Field::stored_bytes(name, ValueCodec::encode_stored(&Value::Int(value))));
    }

    fn add_property(&self, doc: &mut Document, property: &Property, fields: &PropertyFields) -> Result<()> {
        let values = property.values();

        for value in values {
            doc.add(Field::indexed(&fields.search, ValueCodec::encode_search(value, false)?));
            if let Some(lowercase) = &fields.lowercase {
                doc.add(Field::indexed(lowercase, ValueCodec::encode_search(value, true)?));
            }
            if !fields.json_attributes.is_empty() {
                if let Some(json) = value.as_str() {
                    Self::add_json_attributes(doc, property.key(), json, fields);
                }
            }
        }

        // One contiguous stored run per property
        for value in values {
            doc.add(Field::stored_bytes(&fields.stored, ValueCodec::encode_stored(value)));
        }
        Ok(())
    }

    fn add_json_attributes(doc: &mut Document, key: &PropertyKey, json: &str, fields: &PropertyFields) {
        let parsed: serde_json::Value = match serde_json::from_str(json) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(property = %key, error = %e, "malformed JSON value, attributes not indexed");
                return;
            }
        };
        let Some(object) = parsed.as_object() else {
            warn!(property = %key, "JSON value is not an object, attributes not indexed");
            return;
        };

        for (attribute, field) in &fields.json_attributes {
            match object.get(attribute) {
                Some(serde_json::Value::Array(items)) => {
                    for item in items {
                        if let Some(text) = json_scalar(item) {
                            doc.add(Field::indexed(field, text));
                        }
                    }
                }
                Some(item) => {
                    if let Some(text) = json_scalar(item) {
                        doc.add(Field::indexed(field, text));
                    }
                }
                None => {}
            }
        }
    }

    pub fn from_document(&self, doc: &Document) -> Result<PropertySet> {
        let stored: Vec<&Field> = doc.fields.iter().filter(|f| f.stored).collect();

        let mut path = None;
        let mut type_name = None;
        let mut id = None;
        let mut acl_inherited_from = None;
        let mut principals = None;
        let mut properties = Vec::new();

        for group in stored.chunk_by(|a, b| a.name == b.name) {
            let name = group[0].name.as_str();
            match name {
                field_names::PATH => {
                    path = Some(Path::parse(Self::single_text(name, group)?)
                        .map_err(|e| Error::mapping(e.context))?);
                }
                field_names::TYPE_NAME => type_name = Some(Self::single_text(name, group)?.to_string()),
                field_names::ID => id = Some(Self::single_int(name, group)?),
                field_names::ACL_INHERITED_FROM => acl_inherited_from = Some(Self::single_int(name, group)?),
                field_names::ACL_READ_PRINCIPALS => {
                    let list = principals.get_or_insert_with(Vec::new);
                    for field in group {
                        list.push(String::from_utf8_lossy(field.value.as_bytes()).into_owned());
                    }
                }
                _ => {
                    if let Some(property) = self.decode_property(name, group)? {
                        properties.push(property);
                    }
                }
            }
        }

        let path = path.ok_or_else(|| Error::mapping("Document has no path"))?;
        Ok(PropertySet {
            type_name: type_name.ok_or_else(|| Error::mapping(format!("{}: no type name", path)))?,
            id: id.ok_or_else(|| Error::mapping(format!("{}: no id", path)))?,
            acl_inherited_from: acl_inherited_from
                .ok_or_else(|| Error::mapping(format!("{}: no ACL back-reference", path)))?,
            path,
            properties,
            acl_read_principals: principals,
        })
    }

    fn decode_property(&self, name: &str, group: &[&Field]) -> Result<Option<Property>> {
        if let Some(definition) = self.names.definition_for_stored(name) {
            let values = group.iter()
                .map(|f| ValueCodec::decode_stored(f.value.as_bytes(), definition.value_type))
                .collect::<Result<Vec<_>>>()?;

            let property = if definition.multiple {
                Property::multiple(definition.clone(), values)
            } else {
                let [value] = <[Value; 1]>::try_from(values).map_err(|values| {
                    Error::mapping(format!(
                        "Single-valued property {} has {} stored values",
                        definition.key,
                        values.len()
                    ))
                })?;
                Property::single(definition.clone(), value)
            };
            return property.map(Some).map_err(|e| Error::mapping(e.context));
        }

        // Stored by an older schema: keep the raw values as strings
        let Some(key) = FieldNames::parse_stored_name(name) else {
            warn!(field = name, "unrecognised stored field, skipped");
            return Ok(None);
        };
        warn!(property = %key, values = group.len(), "no type definition for stored field, loaded as string");

        let values: Vec<Value> = group.iter()
            .map(|f| Value::String(String::from_utf8_lossy(f.value.as_bytes()).into_owned()))
            .collect();
        let definition = PropertyTypeDefinition::new(key.prefix.as_deref(), &key.name, ValueType::String);
        let property = match <[Value; 1]>::try_from(values) {
            Ok([value]) => Property::single(Arc::new(definition), value),
            Err(values) => Property::multiple(Arc::new(definition.multiple()), values),
        };
        property.map(Some).map_err(|e| Error::mapping(e.context))
    }

    fn single<'a>(name: &str, group: &[&'a Field]) -> Result<&'a Field> {
        match group {
            [field] => Ok(field),
            _ => Err(Error::mapping(format!("System field {} stored {} times", name, group.len()))),
        }
    }

    fn single_text<'a>(name: &str, group: &[&'a Field]) -> Result<&'a str> {
        Self::single(name, group)?
            .value
            .as_text()
            .ok_or_else(|| Error::mapping(format!("System field {} is not text", name)))
    }

    fn single_int(name: &str, group: &[&Field]) -> Result<i32> {
        let field = Self::single(name, group)?;
        match ValueCodec::decode_stored(field.value.as_bytes(), ValueType::Int)? {
            Value::Int(v) => Ok(v),
            other => Err(Error::mapping(format!("System field {} decoded as {:?}", name, other))),
        }
    }

    pub fn field_selector(&self, selector: &PropertySelector) -> StoredFieldSelector {
        let names = match selector {
            PropertySelector::All => None,
            PropertySelector::Only(keys) => Some(
                keys.iter()
                    .filter_map(|key| self.names.stored_field(key))
                    .map(str::to_string)
                    .collect(),
            ),
        };
        StoredFieldSelector { names }
    }

    // Query terms

    pub fn path_term(path: &Path) -> Term {
        Term::new(field_names::PATH, path.as_str())
    }

    /// Matches every descendant of `path`
    pub fn ancestor_term(path: &Path) -> Term {
        Term::new(field_names::PATH_ANCESTORS, path.as_str())
    }

    pub fn depth_term(depth: usize) -> Term {
        Term::new(field_names::PATH_DEPTH, &ValueCodec::encode_int(depth as i32))
    }

    pub fn id_term(id: i32) -> Term {
        Term::new(field_names::ID, &ValueCodec::encode_int(id))
    }

    pub fn type_term(type_name: &str) -> Term {
        Term::new(field_names::TYPE_NAME, type_name)
    }

    pub fn principal_term(principal: &str) -> Term {
        Term::new(field_names::ACL_READ_PRINCIPALS, principal)
    }

    /// Exact-match term for a property value, against the lower-cased
    /// field when `ignore_case` is set and the type has one
    pub fn property_term(&self, key: &PropertyKey, value: &Value, ignore_case: bool) -> Result<Term> {
        let fields = self.names.fields(key)
            .ok_or_else(|| Error::invalid_argument(format!("Property {} is not indexed", key)))?;
        match (&fields.lowercase, ignore_case) {
            (Some(lowercase), true) => Ok(Term::new(lowercase, &ValueCodec::encode_search(value, true)?)),
            _ => Ok(Term::new(&fields.search, &ValueCodec::encode_search(value, false)?)),
        }
    }

    pub fn json_attribute_term(&self, key: &PropertyKey, attribute: &str, value: &str) -> Result<Term> {
        let field = self.names.json_attribute_field(key, attribute).ok_or_else(|| {
            Error::invalid_argument(format!("{}{}{} is not indexed", key, field_names::JSON_ATTRIBUTE_SEPARATOR, attribute))
        })?;
        Ok(Term::new(field, value))
    }
}

fn json_scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::FieldValue;
    use crate::schema::types::StaticTypeRegistry;

    fn mapper() -> DocumentMapper {
        let registry: StaticTypeRegistry = [
            PropertyTypeDefinition::new(None, "x", ValueType::Int),
            PropertyTypeDefinition::new(None, "title", ValueType::String),
            PropertyTypeDefinition::new(None, "tags", ValueType::String).multiple(),
            PropertyTypeDefinition::new(None, "meta", ValueType::Json).with_json_attributes(&["author", "keywords"]),
            PropertyTypeDefinition::new(None, "blob", ValueType::Binary),
        ]
        .into_iter()
        .collect();
        DocumentMapper::new(Arc::new(registry))
    }

    fn property(mapper: &DocumentMapper, name: &str, value: Value) -> Property {
        let definition = mapper.types().definition(&PropertyKey::local(name)).unwrap();
        Property::single(definition, value).unwrap()
    }

    fn tags(mapper: &DocumentMapper, values: &[&str]) -> Property {
        let definition = mapper.types().definition(&PropertyKey::local("tags")).unwrap();
        Property::multiple(definition, values.iter().map(|v| Value::String(v.to_string())).collect()).unwrap()
    }

    fn sample(mapper: &DocumentMapper) -> PropertySet {
        PropertySet::new(Path::parse("/a/b").unwrap(), "file", 7)
            .with_acl_inherited_from(3)
            .with_property(property(mapper, "x", Value::Int(42)))
            .with_property(tags(mapper, &["red", "green", "blue"]))
            .with_property(property(mapper, "title", Value::String("Hello World".into())))
    }

    #[test]
    fn test_roundtrip_keeps_values_and_order() {
        let mapper = mapper();
        let ps = sample(&mapper);
        let doc = mapper.to_document(&ps, &["user:alice".to_string()]).unwrap();

        let loaded = mapper.from_document(&doc.stored_only()).unwrap();
        assert_eq!(loaded.path, ps.path);
        assert_eq!(loaded.type_name, "file");
        assert_eq!(loaded.id, 7);
        assert_eq!(loaded.acl_inherited_from, 3);
        assert_eq!(loaded.acl_read_principals, Some(vec!["user:alice".to_string()]));
        assert_eq!(loaded.properties, ps.properties);

        let tags = loaded.property(&PropertyKey::local("tags")).unwrap();
        let values: Vec<&str> = tags.values().iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(values, vec!["red", "green", "blue"]);
    }

    #[test]
    fn test_system_and_search_fields() {
        let mapper = mapper();
        let doc = mapper.to_document(&sample(&mapper), &[]).unwrap();

        assert!(doc.has_term(&DocumentMapper::path_term(&Path::parse("/a/b").unwrap())));
        assert!(doc.has_term(&DocumentMapper::ancestor_term(&Path::root())));
        assert!(doc.has_term(&DocumentMapper::ancestor_term(&Path::parse("/a").unwrap())));
        assert!(doc.has_term(&DocumentMapper::depth_term(2)));
        assert!(doc.has_term(&DocumentMapper::id_term(7)));

        let title = PropertyKey::local("title");
        let value = Value::String("HELLO world".into());
        assert!(doc.has_term(&mapper.property_term(&title, &value, true).unwrap()));
        assert!(!doc.has_term(&mapper.property_term(&title, &value, false).unwrap()));
    }

    #[test]
    fn test_public_read_short_circuits_principals() {
        let mapper = mapper();
        let principals = vec!["user:a".to_string(), field_names::ALL_PRINCIPALS.to_string()];
        let doc = mapper.to_document(&sample(&mapper), &principals).unwrap();
        let acl: Vec<_> = doc.fields_named(field_names::ACL_READ_PRINCIPALS).filter(|f| f.indexed).collect();
        assert_eq!(acl.len(), 1);
        assert_eq!(acl[0].value.as_text(), Some(field_names::ALL_PRINCIPALS));
    }

    #[test]
    fn test_binary_values_are_neither_indexed_nor_stored() {
        let mapper = mapper();
        let ps = sample(&mapper).with_property(property(&mapper, "blob", Value::Binary(vec![0; 16])));
        let doc = mapper.to_document(&ps, &[]).unwrap();
        assert!(!doc.fields.iter().any(|f| f.name.contains("blob")));
    }

    #[test]
    fn test_json_expansion_and_malformed_json() {
        let mapper = mapper();
        let meta = PropertyKey::local("meta");
        let json = r#"{"author": "Ann", "keywords": ["a", "b"], "ignored": 1}"#;
        let ps = sample(&mapper).with_property(property(&mapper, "meta", Value::String(json.into())));
        let doc = mapper.to_document(&ps, &[]).unwrap();
        assert!(doc.has_term(&mapper.json_attribute_term(&meta, "author", "Ann").unwrap()));
        assert!(doc.has_term(&mapper.json_attribute_term(&meta, "keywords", "b").unwrap()));
        assert!(mapper.json_attribute_term(&meta, "ignored", "1").is_err());

        let broken = sample(&mapper).with_property(property(&mapper, "meta", Value::String("{oops".into())));
        let doc = mapper.to_document(&broken, &[]).unwrap();
        assert!(!doc.fields.iter().any(|f| f.name.starts_with("meta@")));
        let loaded = mapper.from_document(&doc).unwrap();
        assert_eq!(loaded.property(&meta).unwrap().value(), Some(&Value::String("{oops".into())));
    }

    #[test]
    fn test_single_valued_group_with_two_values_is_fatal() {
        let mapper = mapper();
        let mut doc = mapper.to_document(&sample(&mapper), &[]).unwrap();
        let stored_x = mapper.field_names().stored_field(&PropertyKey::local("x")).unwrap();
        let pos = doc.fields.iter().position(|f| f.name == stored_x).unwrap();
        let extra = doc.fields[pos].clone();
        doc.fields.insert(pos, extra);

        let err = mapper.from_document(&doc).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Mapping);
    }

    #[test]
    fn test_unknown_stored_field_falls_back_to_string() {
        let mapper = mapper();
        let mut doc = mapper.to_document(&sample(&mapper), &[]).unwrap();
        doc.add(Field::stored_bytes("b#old:prop", b"legacy".to_vec()));

        let loaded = mapper.from_document(&doc).unwrap();
        let legacy = loaded.property(&PropertyKey::new(Some("old"), "prop")).unwrap();
        assert_eq!(legacy.value(), Some(&Value::String("legacy".into())));
    }

    #[test]
    fn test_selector_keeps_system_fields() {
        let mapper = mapper();
        let doc = mapper.to_document(&sample(&mapper), &[]).unwrap();
        let selector = mapper.field_selector(&PropertySelector::only([PropertyKey::local("x")]));
        let partial = Document {
            fields: doc.fields.into_iter().filter(|f| f.stored && selector.accept(&f.name)).collect(),
        };

        let loaded = mapper.from_document(&partial).unwrap();
        assert_eq!(loaded.id, 7);
        assert_eq!(loaded.properties.len(), 1);
        assert_eq!(loaded.properties[0].value(), Some(&Value::Int(42)));
        assert!(matches!(partial.get(field_names::PATH), Some(FieldValue::Text(_))));
    }
}
