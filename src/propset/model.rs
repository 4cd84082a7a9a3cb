use std::sync::Arc;
use chrono::{DateTime, Utc};
use crate::core::error::{Error, Result};
use crate::propset::path::Path;
use crate::schema::types::{PropertyKey, PropertyTypeDefinition, ValueType};

/// Acl back-reference meaning "defines its own ACL"
pub const NO_ACL_INHERITANCE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Boolean(bool),
    Int(i32),
    Long(i64),
    Date(DateTime<Utc>),
    Timestamp(DateTime<Utc>),
    String(String),   // Also Html, Json, Principal and ImageRef
    Binary(Vec<u8>),
}

impl Value {
    /// Whether this value can be held by a property of the given type
    pub fn fits(&self, value_type: ValueType) -> bool {
        match self {
            Value::Boolean(_) => value_type == ValueType::Boolean,
            Value::Int(_) => value_type == ValueType::Int,
            Value::Long(_) => value_type == ValueType::Long,
            Value::Date(_) => value_type == ValueType::Date,
            Value::Timestamp(_) => value_type == ValueType::Timestamp,
            Value::String(_) => value_type.is_string(),
            Value::Binary(_) => value_type == ValueType::Binary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Single(Value),
    Multiple(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub definition: Arc<PropertyTypeDefinition>,
    pub value: PropertyValue,
}

impl Property {
    pub fn single(definition: Arc<PropertyTypeDefinition>, value: Value) -> Result<Self> {
        if definition.multiple {
            return Err(Error::invalid_argument(format!("{} is multi-valued", definition.key)));
        }
        Self::check_type(&definition, &value)?;
        Ok(Property {
            definition,
            value: PropertyValue::Single(value),
        })
    }

    pub fn multiple(definition: Arc<PropertyTypeDefinition>, values: Vec<Value>) -> Result<Self> {
        if !definition.multiple {
            return Err(Error::invalid_argument(format!("{} is single-valued", definition.key)));
        }
        for value in &values {
            Self::check_type(&definition, value)?;
        }
        Ok(Property {
            definition,
            value: PropertyValue::Multiple(values),
        })
    }

    fn check_type(definition: &PropertyTypeDefinition, value: &Value) -> Result<()> {
        if !value.fits(definition.value_type) {
            return Err(Error::invalid_argument(format!(
                "{:?} does not fit {} of type {:?}",
                value, definition.key, definition.value_type
            )));
        }
        Ok(())
    }

    pub fn key(&self) -> &PropertyKey {
        &self.definition.key
    }

    /// All values in order; one for single-valued properties
    pub fn values(&self) -> &[Value] {
        match &self.value {
            PropertyValue::Single(value) => std::slice::from_ref(value),
            PropertyValue::Multiple(values) => values,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.value {
            PropertyValue::Single(value) => Some(value),
            PropertyValue::Multiple(_) => None,
        }
    }
}

/// The unit of indexing
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySet {
    pub path: Path,
    pub type_name: String,
    pub id: i32,
    pub acl_inherited_from: i32,   // <= 0 when the set defines its own ACL
    pub properties: Vec<Property>,
    /// Filled in when loaded from the index
    pub acl_read_principals: Option<Vec<String>>,
}

impl PropertySet {
    pub fn new(path: Path, type_name: &str, id: i32) -> Self {
        PropertySet {
            path,
            type_name: type_name.to_string(),
            id,
            acl_inherited_from: NO_ACL_INHERITANCE,
            properties: Vec::new(),
            acl_read_principals: None,
        }
    }

    pub fn with_acl_inherited_from(mut self, id: i32) -> Self {
        self.acl_inherited_from = id;
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn add_property(&mut self, property: Property) {
        self.properties.push(property);
    }

    pub fn property(&self, key: &PropertyKey) -> Option<&Property> {
        self.properties.iter().find(|p| p.key() == key)
    }

    pub fn is_inherited_acl(&self) -> bool {
        self.acl_inherited_from > 0
    }
}
