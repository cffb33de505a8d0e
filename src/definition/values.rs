//! Configured values for constructor arguments and properties.
//!
//! A [`Value`] is what a definition holds before resolution turns it into a
//! live instance: literals, strings with `${...}` placeholders, references to
//! other beans, inner definitions, and collections of those.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::definition::BeanDefinition;
use crate::key::{instance_type_id, BeanArc, TypeKey};

/// A value configured on a bean definition, resolved at creation time.
#[derive(Clone)]
pub enum Value {
    /// Explicit null. Skipped for properties, mapped to a `None` slot for
    /// optional constructor parameters.
    Null,
    /// String literal. Embedded `${...}` placeholders are resolved and the
    /// result converted to the target type on apply.
    Str(String),
    /// An already-typed value, stored as a type-erased handle.
    Literal(BeanArc),
    /// Runtime reference to another bean by name.
    Ref(String),
    /// Nested definition, instantiated fresh for each referencing bean.
    Inner(Box<BeanDefinition>),
    /// Ordered list, each element resolved and shaped to the declared
    /// element type.
    List(Vec<Value>),
    /// String-keyed entries, values resolved like list elements.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Wraps a typed value as a [`Value::Literal`].
    pub fn of<T: Send + Sync + 'static>(value: T) -> Self {
        Value::Literal(Arc::new(value))
    }

    /// A runtime reference to the named bean.
    pub fn reference(name: impl Into<String>) -> Self {
        Value::Ref(name.into())
    }

    /// A string literal, placeholder-resolved on apply.
    pub fn string(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Literal(_) => f.write_str("Literal(..)"),
            Value::Ref(name) => f.debug_tuple("Ref").field(name).finish(),
            Value::Inner(def) => f.debug_tuple("Inner").field(&def.type_name()).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Literal(a), Value::Literal(b)) => Arc::ptr_eq(a, b),
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Inner definitions are never considered equal.
            _ => false,
        }
    }
}

/// A named value destined for a settable property.
#[derive(Clone, Debug)]
pub struct PropertyValue {
    /// The property name, matched against the definition's property specs.
    pub name: String,
    /// The configured value.
    pub value: Value,
    /// When set, the entry is silently dropped if the target declares no
    /// matching property.
    pub optional: bool,
}

impl PropertyValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        PropertyValue {
            name: name.into(),
            value,
            optional: false,
        }
    }

    /// Marks the entry as ignorable when the target has no such property.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Ordered collection of property values with by-name replacement.
#[derive(Clone, Debug, Default)]
pub struct PropertyValues {
    values: Vec<PropertyValue>,
}

impl PropertyValues {
    pub fn new() -> Self {
        PropertyValues::default()
    }

    /// Adds an entry, replacing any existing entry with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.add_value(PropertyValue::new(name, value));
        self
    }

    /// Adds a prepared entry, replacing any same-named entry in place.
    pub fn add_value(&mut self, pv: PropertyValue) {
        if let Some(existing) = self.values.iter_mut().find(|v| v.name == pv.name) {
            *existing = pv;
        } else {
            self.values.push(pv);
        }
    }

    /// Copies every entry from `other` into this collection. Same-named
    /// entries are replaced, which makes child definitions win over the
    /// parent they were merged onto.
    pub fn merge_from(&mut self, other: &PropertyValues) {
        for pv in &other.values {
            self.add_value(pv.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.iter().find(|v| v.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyValue> {
        self.values.iter()
    }
}

/// A constructor argument value, optionally pinned to a parameter type or
/// name.
#[derive(Clone, Debug)]
pub struct ValueHolder {
    /// The configured value.
    pub value: Value,
    /// When set, the holder only matches a parameter of exactly this type.
    pub required_type: Option<TypeKey>,
    /// When set, the holder only matches a parameter declared with this name.
    pub name: Option<String>,
}

impl ValueHolder {
    pub fn new(value: Value) -> Self {
        ValueHolder {
            value,
            required_type: None,
            name: None,
        }
    }

    /// Pins the holder to parameters of the given type.
    pub fn with_type(mut self, key: TypeKey) -> Self {
        self.required_type = Some(key);
        self
    }

    /// Pins the holder to a parameter name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn matches(&self, required_type: Option<TypeKey>, required_name: Option<&str>) -> bool {
        if let Some(holder_name) = &self.name {
            match required_name {
                Some(n) if n == holder_name => {}
                _ => return false,
            }
        }
        if let Some(holder_type) = self.required_type {
            match required_type {
                Some(t) if t == holder_type => {}
                _ => return false,
            }
        }
        // An unpinned literal still has a concrete runtime type to check.
        if self.name.is_none() && self.required_type.is_none() {
            if let (Some(t), Value::Literal(v)) = (required_type, &self.value) {
                if instance_type_id(v) != t.id {
                    return false;
                }
            }
        }
        true
    }
}

impl PartialEq for ValueHolder {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.required_type == other.required_type
            && self.name == other.name
    }
}

/// Constructor argument values, indexed by position or held generically for
/// type- and name-based matching.
#[derive(Clone, Debug, Default)]
pub struct ConstructorArgumentValues {
    indexed: BTreeMap<usize, ValueHolder>,
    generic: Vec<ValueHolder>,
}

impl ConstructorArgumentValues {
    pub fn new() -> Self {
        ConstructorArgumentValues::default()
    }

    /// Registers a value for the parameter at `index`, replacing any
    /// previous value at that position.
    pub fn add_indexed(&mut self, index: usize, holder: ValueHolder) -> &mut Self {
        self.indexed.insert(index, holder);
        self
    }

    /// Registers a value matched to a parameter by type or name during
    /// resolution.
    pub fn add_generic(&mut self, holder: ValueHolder) -> &mut Self {
        self.generic.push(holder);
        self
    }

    /// Copies every argument from `other`. Indexed entries replace entries
    /// at the same position; generic entries are appended unless an equal
    /// holder is already present.
    pub fn merge_from(&mut self, other: &ConstructorArgumentValues) {
        for (index, holder) in &other.indexed {
            self.indexed.insert(*index, holder.clone());
        }
        for holder in &other.generic {
            if !self.generic.contains(holder) {
                self.generic.push(holder.clone());
            }
        }
    }

    /// The indexed value at `index`, if present and compatible with the
    /// required type.
    pub fn indexed_argument_value(
        &self,
        index: usize,
        required_type: Option<TypeKey>,
    ) -> Option<&ValueHolder> {
        let holder = self.indexed.get(&index)?;
        match (holder.required_type, required_type) {
            (Some(h), Some(t)) if h != t => None,
            _ => Some(holder),
        }
    }

    /// The first unused generic value compatible with the parameter's type
    /// and name. Returns the holder and its position for used-set tracking.
    pub fn generic_argument_value(
        &self,
        required_type: Option<TypeKey>,
        required_name: Option<&str>,
        used: &HashSet<usize>,
    ) -> Option<(usize, &ValueHolder)> {
        self.generic
            .iter()
            .enumerate()
            .find(|(i, holder)| !used.contains(i) && holder.matches(required_type, required_name))
    }

    /// The minimum number of parameters any matching constructor must
    /// declare to consume every configured argument.
    pub fn min_arg_count(&self) -> usize {
        let highest_index = self
            .indexed
            .keys()
            .next_back()
            .map(|i| i + 1)
            .unwrap_or(0);
        highest_index.max(self.indexed.len() + self.generic.len())
    }

    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty() && self.generic.is_empty()
    }

    pub fn indexed_values(&self) -> impl Iterator<Item = (usize, &ValueHolder)> {
        self.indexed.iter().map(|(i, h)| (*i, h))
    }

    pub fn generic_values(&self) -> impl Iterator<Item = &ValueHolder> {
        self.generic.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_of;

    #[test]
    fn property_values_replace_by_name() {
        let mut pvs = PropertyValues::new();
        pvs.add("url", Value::string("first"));
        pvs.add("retries", Value::of(3i64));
        pvs.add("url", Value::string("second"));
        assert_eq!(pvs.len(), 2);
        match &pvs.get("url").unwrap().value {
            Value::Str(s) => assert_eq!(s, "second"),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn merge_from_child_wins() {
        let mut parent = PropertyValues::new();
        parent.add("host", Value::string("parent"));
        parent.add("port", Value::of(1i64));

        let mut child = PropertyValues::new();
        child.add("host", Value::string("child"));

        parent.merge_from(&child);
        assert_eq!(parent.len(), 2);
        match &parent.get("host").unwrap().value {
            Value::Str(s) => assert_eq!(s, "child"),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn indexed_lookup_honours_required_type() {
        let mut args = ConstructorArgumentValues::new();
        args.add_indexed(0, ValueHolder::new(Value::of(5i64)).with_type(key_of::<i64>()));

        assert!(args.indexed_argument_value(0, Some(key_of::<i64>())).is_some());
        assert!(args.indexed_argument_value(0, Some(key_of::<String>())).is_none());
        assert!(args.indexed_argument_value(0, None).is_some());
        assert!(args.indexed_argument_value(1, None).is_none());
    }

    #[test]
    fn generic_lookup_skips_used_holders() {
        let mut args = ConstructorArgumentValues::new();
        args.add_generic(ValueHolder::new(Value::string("a")));
        args.add_generic(ValueHolder::new(Value::string("b")));

        let mut used = HashSet::new();
        let (first, _) = args
            .generic_argument_value(Some(key_of::<String>()), None, &used)
            .unwrap();
        used.insert(first);
        let (second, holder) = args
            .generic_argument_value(Some(key_of::<String>()), None, &used)
            .unwrap();
        assert_ne!(first, second);
        match &holder.value {
            Value::Str(s) => assert_eq!(s, "b"),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn generic_lookup_matches_name_and_type() {
        let mut args = ConstructorArgumentValues::new();
        args.add_generic(ValueHolder::new(Value::of(10i64)).with_name("limit"));
        args.add_generic(ValueHolder::new(Value::of(true)).with_type(key_of::<bool>()));

        let used = HashSet::new();
        assert!(args
            .generic_argument_value(Some(key_of::<i64>()), Some("other"), &used)
            .is_none());
        let (_, by_name) = args
            .generic_argument_value(Some(key_of::<i64>()), Some("limit"), &used)
            .unwrap();
        assert!(by_name.name.as_deref() == Some("limit"));
        let (_, by_type) = args
            .generic_argument_value(Some(key_of::<bool>()), None, &used)
            .unwrap();
        assert_eq!(by_type.required_type, Some(key_of::<bool>()));
    }

    #[test]
    fn untyped_literal_must_match_runtime_type() {
        let mut args = ConstructorArgumentValues::new();
        args.add_generic(ValueHolder::new(Value::of(7i64)));

        let used = HashSet::new();
        assert!(args
            .generic_argument_value(Some(key_of::<String>()), None, &used)
            .is_none());
        assert!(args
            .generic_argument_value(Some(key_of::<i64>()), None, &used)
            .is_some());
    }

    #[test]
    fn min_arg_count_accounts_for_index_holes() {
        let mut args = ConstructorArgumentValues::new();
        args.add_indexed(3, ValueHolder::new(Value::string("x")));
        args.add_generic(ValueHolder::new(Value::string("y")));
        assert_eq!(args.min_arg_count(), 4);

        let mut dense = ConstructorArgumentValues::new();
        dense.add_indexed(0, ValueHolder::new(Value::string("a")));
        dense.add_generic(ValueHolder::new(Value::string("b")));
        assert_eq!(dense.min_arg_count(), 2);
    }
}
