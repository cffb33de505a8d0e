//! Conversion of configured values to declared target types.
//!
//! Configured string values become numbers, booleans, and other simple
//! targets at apply time; anything beyond that goes through converters
//! registered per source and target type pair.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BeansError, BeansResult};
use crate::key::{bean_as, instance_type_id, BeanArc, TypeKey};

type ConvertFn = dyn Fn(&BeanArc) -> BeansResult<BeanArc> + Send + Sync;

/// Converts type-erased values to required target types.
pub trait TypeConverter: Send + Sync {
    /// Converts `value` to the target type, returning it unchanged when it
    /// already is one.
    fn convert(&self, value: BeanArc, target: &TypeKey) -> BeansResult<BeanArc>;

    /// Whether a conversion from `source` to the target is known without
    /// attempting it.
    fn can_convert(&self, source: TypeId, target: &TypeKey) -> bool;
}

macro_rules! for_each_parse_target {
    ($mac:ident) => {
        $mac!(bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);
    };
}

/// Default converter: identity, string parsing into primitives, and any
/// custom conversions registered on top.
///
/// # Examples
///
/// ```rust
/// use beanforge::{key_of, SimpleTypeConverter, TypeConverter};
/// use std::sync::Arc;
///
/// let converter = SimpleTypeConverter::new();
/// let port = converter
///     .convert(Arc::new("8080".to_string()), &key_of::<u16>())
///     .unwrap();
/// assert_eq!(*port.downcast::<u16>().unwrap(), 8080);
/// ```
#[derive(Default)]
pub struct SimpleTypeConverter {
    custom: HashMap<(TypeId, TypeId), Arc<ConvertFn>>,
}

impl SimpleTypeConverter {
    pub fn new() -> Self {
        SimpleTypeConverter::default()
    }

    /// Registers a conversion from `S` to `T`, overriding any builtin for
    /// that pair.
    pub fn register<S, T, F>(&mut self, convert: F)
    where
        S: Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: Fn(&S) -> BeansResult<T> + Send + Sync + 'static,
    {
        let f: Arc<ConvertFn> = Arc::new(move |value| {
            let source = bean_as::<S>(value).ok_or_else(|| BeansError::IllegalState(
                "custom converter invoked with a mismatched source".into(),
            ))?;
            Ok(Arc::new(convert(&source)?) as BeanArc)
        });
        self.custom
            .insert((TypeId::of::<S>(), TypeId::of::<T>()), f);
    }

    fn as_text(value: &BeanArc) -> Option<String> {
        if let Some(s) = bean_as::<String>(value) {
            return Some((*s).clone());
        }
        bean_as::<&'static str>(value).map(|s| (*s).to_string())
    }

    fn parse_text(text: &str, target: &TypeKey) -> Option<BeansResult<BeanArc>> {
        macro_rules! try_parse {
            ($($ty:ty),* $(,)?) => {
                $(
                    if target.id == TypeId::of::<$ty>() {
                        return Some(
                            text.trim()
                                .parse::<$ty>()
                                .map(|v| Arc::new(v) as BeanArc)
                                .map_err(|e| BeansError::TypeMismatch {
                                    required: target.name,
                                    message: format!("cannot parse '{}': {}", text, e),
                                }),
                        );
                    }
                )*
            };
        }
        for_each_parse_target!(try_parse);
        if target.id == TypeId::of::<char>() {
            return Some(text.parse::<char>().map(|v| Arc::new(v) as BeanArc).map_err(
                |_| BeansError::TypeMismatch {
                    required: target.name,
                    message: format!("'{}' is not a single character", text),
                },
            ));
        }
        if target.id == TypeId::of::<String>() {
            return Some(Ok(Arc::new(text.to_string()) as BeanArc));
        }
        None
    }

    fn is_parse_target(target: &TypeKey) -> bool {
        macro_rules! check {
            ($($ty:ty),* $(,)?) => {
                $(
                    if target.id == TypeId::of::<$ty>() {
                        return true;
                    }
                )*
            };
        }
        for_each_parse_target!(check);
        target.id == TypeId::of::<char>() || target.id == TypeId::of::<String>()
    }

    fn is_text(source: TypeId) -> bool {
        source == TypeId::of::<String>() || source == TypeId::of::<&'static str>()
    }
}

impl TypeConverter for SimpleTypeConverter {
    fn convert(&self, value: BeanArc, target: &TypeKey) -> BeansResult<BeanArc> {
        let source = instance_type_id(&value);
        if source == target.id {
            return Ok(value);
        }
        if let Some(custom) = self.custom.get(&(source, target.id)) {
            return custom(&value);
        }
        if let Some(text) = Self::as_text(&value) {
            if let Some(parsed) = Self::parse_text(&text, target) {
                return parsed;
            }
        }
        Err(BeansError::TypeMismatch {
            required: target.name,
            message: "no converter registered for the value's type".into(),
        })
    }

    fn can_convert(&self, source: TypeId, target: &TypeKey) -> bool {
        source == target.id
            || self.custom.contains_key(&(source, target.id))
            || (Self::is_text(source) && Self::is_parse_target(target))
    }
}
