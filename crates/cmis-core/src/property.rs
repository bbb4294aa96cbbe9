//! Property values

use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::object_type::ObjectType;
use crate::property_type::{PropertyKind, PropertyType};
use crate::xml::{parse_bool, Element, Namespaces};

/// Properties of an object keyed by property definition id
pub type PropertyMap = BTreeMap<String, Property>;

/// A property value list with its definition.
///
/// Raw strings are kept exactly as received; the typed list matching the
/// definition's kind holds the values that could be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    property_type: Rc<PropertyType>,
    str_values: Vec<String>,
    long_values: Vec<i64>,
    double_values: Vec<f64>,
    bool_values: Vec<bool>,
    date_time_values: Vec<DateTime<Utc>>,
}

impl Property {
    pub fn new(property_type: Rc<PropertyType>, values: Vec<String>) -> Self {
        let mut prop = Self {
            property_type,
            str_values: Vec::new(),
            long_values: Vec::new(),
            double_values: Vec::new(),
            bool_values: Vec::new(),
            date_time_values: Vec::new(),
        };
        prop.set_values(values);
        prop
    }

    /// Build a property with a fresh standalone definition
    pub fn with_kind<S: Into<String>>(id: S, kind: PropertyKind, values: Vec<String>) -> Self {
        let multi = values.len() > 1;
        Self::new(
            Rc::new(PropertyType::new(id, kind).multi_valued(multi)),
            values,
        )
    }

    /// Single-valued string property
    pub fn string<S: Into<String>, V: Into<String>>(id: S, value: V) -> Self {
        Self::with_kind(id, PropertyKind::String, vec![value.into()])
    }

    /// Id-typed property (a string on the wire, `propertyId` in XML)
    pub fn id<S: Into<String>>(id: S, values: Vec<String>) -> Self {
        let ty = PropertyType::new(id, PropertyKind::String)
            .with_xml_type("id")
            .multi_valued(values.len() > 1);
        Self::new(Rc::new(ty), values)
    }

    /// Replace all values, re-deriving the typed list from `values`.
    ///
    /// Values that do not parse for the definition's kind are kept in the
    /// raw list only.
    pub fn set_values(&mut self, values: Vec<String>) {
        self.long_values.clear();
        self.double_values.clear();
        self.bool_values.clear();
        self.date_time_values.clear();

        for value in &values {
            match self.property_type.kind() {
                PropertyKind::Integer => {
                    if let Ok(v) = value.trim().parse::<i64>() {
                        self.long_values.push(v);
                    }
                }
                PropertyKind::Decimal => {
                    if let Ok(v) = value.trim().parse::<f64>() {
                        self.double_values.push(v);
                    }
                }
                PropertyKind::Bool => {
                    if let Some(v) = parse_bool(value) {
                        self.bool_values.push(v);
                    }
                }
                PropertyKind::DateTime => {
                    if let Some(v) = parse_date_time(value) {
                        self.date_time_values.push(v);
                    }
                }
                PropertyKind::String => {}
            }
        }
        self.str_values = values;
    }

    pub fn property_type(&self) -> &Rc<PropertyType> {
        &self.property_type
    }

    /// Swap the definition and re-derive typed values against it
    pub fn set_property_type(&mut self, property_type: Rc<PropertyType>) {
        self.property_type = property_type;
        let values = std::mem::take(&mut self.str_values);
        self.set_values(values);
    }

    /// Reconcile a temporary definition against `types`.
    ///
    /// Returns whether the definition changed.
    pub fn reconcile(&mut self, types: &[Rc<ObjectType>]) -> bool {
        if !self.property_type.is_temporary() {
            return false;
        }
        let changed = Rc::make_mut(&mut self.property_type).update(types);
        if changed {
            let values = std::mem::take(&mut self.str_values);
            self.set_values(values);
        }
        changed
    }

    pub fn str_values(&self) -> &[String] {
        &self.str_values
    }

    pub fn long_values(&self) -> &[i64] {
        &self.long_values
    }

    pub fn double_values(&self) -> &[f64] {
        &self.double_values
    }

    pub fn bool_values(&self) -> &[bool] {
        &self.bool_values
    }

    pub fn date_time_values(&self) -> &[DateTime<Utc>] {
        &self.date_time_values
    }

    /// First raw value, or an empty string
    pub fn first_str(&self) -> &str {
        self.str_values.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.str_values.is_empty()
    }

    /// `cmis:property<Type>` element with one `cmis:value` per raw value
    pub fn to_element(&self, ns: &Namespaces) -> Element {
        let ty = &self.property_type;
        let mut el = ns
            .element(&format!("cmis:property{}", ty.xml_type()))
            .with_attr("propertyDefinitionId", ty.id());
        for (name, value) in [
            ("localName", ty.local_name()),
            ("displayName", ty.display_name()),
            ("queryName", ty.query_name()),
        ] {
            if !value.is_empty() {
                el.set_attr(name, value);
            }
        }
        for value in &self.str_values {
            el.push_child(ns.element("cmis:value").with_text(value.clone()));
        }
        el
    }

    /// JSON view used by the REST dialects: typed scalars for single values,
    /// arrays for multi-valued definitions.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        let mut values: Vec<Value> = match self.property_type.kind() {
            PropertyKind::Integer => self.long_values.iter().map(|v| Value::from(*v)).collect(),
            PropertyKind::Decimal => self.double_values.iter().map(|v| Value::from(*v)).collect(),
            PropertyKind::Bool => self.bool_values.iter().map(|v| Value::from(*v)).collect(),
            PropertyKind::DateTime => self
                .date_time_values
                .iter()
                .map(|v| Value::from(format_date_time(v)))
                .collect(),
            PropertyKind::String => self.str_values.iter().map(|v| Value::from(v.as_str())).collect(),
        };

        if self.property_type.is_multi_valued() {
            Value::Array(values)
        } else if values.is_empty() {
            Value::Null
        } else {
            values.swap_remove(0)
        }
    }
}

/// Parse a property node against the owning type's definitions.
///
/// Returns `None` when the node carries no `propertyDefinitionId`, which is
/// the case for anything that is not a property node.
pub fn parse_property(node: &Element, owner: Option<&ObjectType>) -> Option<Property> {
    let id = node.attr("propertyDefinitionId").filter(|id| !id.is_empty())?;

    let property_type = match owner.and_then(|t| t.property_type(id)) {
        Some(ty) => Rc::clone(ty),
        None => Rc::new(PropertyType::from_property_node(node)),
    };

    let values = node
        .elements()
        .filter(|e| e.local_name() == "value")
        .map(Element::text)
        .collect();

    Some(Property::new(property_type, values))
}

/// Parse every child of a `cmis:properties` node into a map.
/// Later duplicates replace earlier ones.
pub fn parse_properties(node: &Element, owner: Option<&ObjectType>) -> PropertyMap {
    let mut map = PropertyMap::new();
    for child in node.elements() {
        if let Some(prop) = parse_property(child, owner) {
            map.insert(prop.property_type.id().to_string(), prop);
        }
    }
    map
}

/// `cmis:properties` element for a property map
pub fn properties_element(ns: &Namespaces, properties: &PropertyMap) -> Element {
    let mut el = ns.element("cmis:properties");
    for prop in properties.values() {
        el.push_child(prop.to_element(ns));
    }
    el
}

/// Parse a CMIS date-time, tolerating a missing offset (taken as UTC) and
/// plain dates.
pub fn parse_date_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Format a date-time the way CMIS servers expect it
pub fn format_date_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
