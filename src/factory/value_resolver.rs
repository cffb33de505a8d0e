//! Resolution of configured [`Value`]s into runtime instances: literals,
//! placeholder strings, bean references, nested definitions, and shaped
//! collections.

use std::any::TypeId;
use std::sync::Arc;

use crate::definition::merged::MergedBeanDefinition;
use crate::definition::{BeanDefinition, ParamShape, Value};
use crate::error::{BeansError, BeansResult};
use crate::key::{
    instance_matches, instance_type_id, is_null_bean, is_simple_value_type, BeanArc, NullBean,
    TypeKey,
};

use super::BeanFactory;

/// A value shaped for one injection slot.
pub(crate) struct Resolved {
    pub(crate) value: BeanArc,
    /// Whether the value already had the declared type, with no conversion
    /// applied. Constructor scoring prefers exact argument lists.
    pub(crate) exact: bool,
}

impl Resolved {
    fn exact(value: BeanArc) -> Self {
        Resolved { value, exact: true }
    }

    fn converted(value: BeanArc) -> Self {
        Resolved {
            value,
            exact: false,
        }
    }
}

/// Resolves configured values in the context of one bean's creation, so
/// references and inner beans can record dependency edges against it.
pub(crate) struct ValueResolver<'a> {
    factory: &'a BeanFactory,
    bean_name: Option<&'a str>,
    merged: Option<&'a Arc<MergedBeanDefinition>>,
}

impl BeanFactory {
    pub(crate) fn value_resolver<'a>(
        &'a self,
        bean_name: Option<&'a str>,
        merged: Option<&'a Arc<MergedBeanDefinition>>,
    ) -> ValueResolver<'a> {
        ValueResolver {
            factory: self,
            bean_name,
            merged,
        }
    }
}

impl ValueResolver<'_> {
    /// Resolves one configured value against the slot's declared element
    /// type and shape.
    pub(crate) fn resolve_for_slot(
        &self,
        value: &Value,
        target: Option<&TypeKey>,
        shape: ParamShape,
    ) -> BeansResult<Resolved> {
        match value {
            Value::Null => Ok(Resolved::exact(Arc::new(NullBean))),
            Value::Str(text) => self.resolve_string(text, target),
            Value::Literal(stored) => self.resolve_literal(stored, target),
            Value::Ref(reference) => self.resolve_reference(reference, target),
            Value::Inner(definition) => self.resolve_inner(definition, target),
            Value::List(items) => self.resolve_list(items, target, shape),
            Value::Map(entries) => self.resolve_map(entries, target, shape),
        }
    }

    fn resolve_string(&self, text: &str, target: Option<&TypeKey>) -> BeansResult<Resolved> {
        let Some(expanded) = self.factory.resolve_embedded_value(text) else {
            return Ok(Resolved::exact(Arc::new(NullBean)));
        };
        let value: BeanArc = Arc::new(expanded);
        match target {
            None => Ok(Resolved::exact(value)),
            Some(key) if key.id == TypeId::of::<String>() => Ok(Resolved::exact(value)),
            Some(key) => {
                let converted = self.factory.converter().convert(value, key)?;
                Ok(Resolved::converted(converted))
            }
        }
    }

    fn resolve_literal(&self, stored: &BeanArc, target: Option<&TypeKey>) -> BeansResult<Resolved> {
        let Some(key) = target else {
            return Ok(Resolved::exact(stored.clone()));
        };
        if instance_matches(stored, key) || is_null_bean(stored) {
            return Ok(Resolved::exact(stored.clone()));
        }
        match self.factory.converter().convert(stored.clone(), key) {
            Ok(converted) => Ok(Resolved::converted(converted)),
            // Pre-shaped handles (trait objects, collections) cannot be
            // checked against the element key here; the applying closure
            // still downcasts before use.
            Err(_) if !is_simple_value_type(instance_type_id(stored)) => {
                Ok(Resolved::converted(stored.clone()))
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_reference(
        &self,
        reference: &str,
        target: Option<&TypeKey>,
    ) -> BeansResult<Resolved> {
        let bean = self.factory.get_bean(reference)?;
        if let Some(dependent) = self.bean_name {
            let canonical = self.factory.canonical_name(reference);
            self.factory
                .registry
                .register_dependent_bean(&canonical, dependent);
        }
        match target {
            None => Ok(Resolved::exact(bean)),
            Some(key) => {
                let (value, exact) = self.factory.adapt_bean_to_key(reference, bean, key)?;
                Ok(Resolved { value, exact })
            }
        }
    }

    fn resolve_inner(
        &self,
        definition: &BeanDefinition,
        target: Option<&TypeKey>,
    ) -> BeansResult<Resolved> {
        let containing = self.bean_name.unwrap_or("anonymous");
        let inner_name = self.factory.next_inner_bean_name(containing);

        let mut inner_merged = self.factory.merge_with_parents(&inner_name, definition)?;
        // An instance held by a shorter-lived bean cannot outlive it.
        if let Some(containing_merged) = self.merged {
            if !containing_merged.is_singleton() && inner_merged.is_singleton() {
                inner_merged.set_scope(containing_merged.scope().clone());
            }
        }
        let inner_merged = Arc::new(inner_merged);

        self.factory
            .registry
            .register_contained_bean(&inner_name, containing);
        for dep in inner_merged.depends_on() {
            let dep = self.factory.canonical_name(dep);
            self.factory
                .registry
                .register_dependent_bean(&dep, &inner_name);
            self.factory.get_bean(&dep)?;
        }

        let instance = self.factory.create_bean(&inner_name, &inner_merged, None)?;
        let product = if inner_merged.is_factory_bean() {
            self.factory
                .object_for_bean_instance_with(instance, &inner_name, false, Some(&inner_merged))?
        } else {
            instance
        };

        match target {
            None => Ok(Resolved::exact(product)),
            Some(key) => {
                let (value, exact) = self.factory.coerce_to_key(
                    &inner_name,
                    product,
                    key,
                    Some(&inner_merged),
                    true,
                )?;
                Ok(Resolved { value, exact })
            }
        }
    }

    fn resolve_list(
        &self,
        items: &[Value],
        target: Option<&TypeKey>,
        shape: ParamShape,
    ) -> BeansResult<Resolved> {
        if shape != ParamShape::Vec {
            return Err(BeansError::TypeMismatch {
                required: target.map_or("a single-valued slot", |key| key.name),
                message: "a list value was configured for a non-list slot".into(),
            });
        }
        let mut out: Vec<BeanArc> = Vec::with_capacity(items.len());
        for item in items {
            let element = self.resolve_for_slot(item, target, ParamShape::Single)?;
            if is_null_bean(&element.value) {
                continue;
            }
            out.push(element.value);
        }
        Ok(Resolved::exact(Arc::new(out)))
    }

    fn resolve_map(
        &self,
        entries: &[(String, Value)],
        target: Option<&TypeKey>,
        shape: ParamShape,
    ) -> BeansResult<Resolved> {
        if shape != ParamShape::Map {
            return Err(BeansError::TypeMismatch {
                required: target.map_or("a single-valued slot", |key| key.name),
                message: "a map value was configured for a non-map slot".into(),
            });
        }
        let mut out: Vec<(String, BeanArc)> = Vec::with_capacity(entries.len());
        for (entry_name, item) in entries {
            let element = self.resolve_for_slot(item, target, ParamShape::Single)?;
            if is_null_bean(&element.value) {
                continue;
            }
            out.push((entry_name.clone(), element.value));
        }
        Ok(Resolved::exact(Arc::new(out)))
    }
}
