//! Error types for the bean container.

use thiserror::Error;

/// Errors raised by the bean container.
///
/// Every failure surfaces through this one taxonomy: definition problems at
/// registration time, lookup failures, creation failures (which wrap the
/// underlying cause with the bean's name and resource description), cycle
/// re-entrancy, and conversion failures.
///
/// # Examples
///
/// ```rust
/// use beanforge::{BeanFactory, BeansError};
///
/// let factory = BeanFactory::new();
/// match factory.get_bean("missing") {
///     Err(BeansError::NoSuchBean(name)) => assert_eq!(name, "missing"),
///     other => panic!("unexpected: {:?}", other.map(|_| ())),
/// }
/// ```
#[derive(Debug, Error)]
pub enum BeansError {
    /// No bean definition or singleton registered under the name.
    #[error("no bean named '{0}' is defined")]
    NoSuchBean(String),

    /// A by-type lookup matched nothing.
    #[error("no qualifying bean of type '{required}' available: {message}")]
    NoSuchBeanOfType {
        /// The requested type.
        required: &'static str,
        /// Detail on the injection point or required-ness.
        message: String,
    },

    /// A by-type lookup matched more than one candidate and no tie-break
    /// settled it.
    #[error("no qualifying bean of type '{required}' available: {}", self.not_unique_detail())]
    NoUniqueBean {
        /// The requested type.
        required: &'static str,
        /// The candidate bean names that tied.
        candidates: Vec<String>,
        /// Overriding detail for primary/priority conflicts.
        message: Option<String>,
    },

    /// The named bean exists but is not of the requested type.
    #[error("bean named '{name}' is expected to be of type '{required}' but was actually of type '{}'", actual.unwrap_or("<unknown>"))]
    BeanNotOfRequiredType {
        /// The bean name, canonical form.
        name: String,
        /// The requested type.
        required: &'static str,
        /// The actual type when it can be determined.
        actual: Option<&'static str>,
    },

    /// The bean was re-entered while already being created on this thread:
    /// an unresolvable cycle (constructor cycle, prototype cycle, or a
    /// singleton cycle with early references disabled).
    #[error("error creating bean with name '{0}': requested bean is currently in creation (unresolvable circular reference?)")]
    CurrentlyInCreation(String),

    /// Singleton creation was attempted while the registry is destroying its
    /// singletons (typically from inside a destroy callback).
    #[error("singleton bean creation of '{0}' not allowed while singletons of this factory are in destruction (do not request a bean from a destroy method implementation)")]
    CreationNotAllowed(String),

    /// Any failure inside the creation pipeline, wrapped once with bean name
    /// and resource description. Suppressed sibling errors collected while
    /// probing alternative candidates hang off `related`.
    #[error("error creating bean with name '{name}'{}: {message}", self.resource_suffix())]
    CreationFailure {
        /// The failing bean.
        name: String,
        /// Where the definition came from, when a description was configured.
        resource: Option<String>,
        /// What went wrong.
        message: String,
        /// The underlying cause, when distinct from the message.
        #[source]
        source: Option<Box<BeansError>>,
        /// Suppressed errors from abandoned resolution attempts.
        related: Vec<BeansError>,
    },

    /// A dependency could not be satisfied for an injection point.
    #[error("unsatisfied dependency expressed through {injection_point} of bean '{name}': {source}")]
    UnsatisfiedDependency {
        /// The bean whose injection point failed.
        name: String,
        /// Description of the parameter or property.
        injection_point: String,
        /// Why resolution failed.
        #[source]
        source: Box<BeansError>,
    },

    /// A definition could not be registered or referenced.
    #[error("error in bean definition '{name}': {message}")]
    DefinitionStore {
        /// The offending definition name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// A definition is self-contradictory or incomplete.
    #[error("invalid bean definition '{name}': {message}")]
    DefinitionValidation {
        /// The offending definition name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// A configured value could not be converted to the required type.
    #[error("cannot convert value to required type '{required}': {message}")]
    TypeMismatch {
        /// The conversion target.
        required: &'static str,
        /// Why the conversion failed.
        message: String,
    },

    /// A definition names a scope that is not registered.
    #[error("no scope named '{scope}' registered for bean '{name}'")]
    NoSuchScope {
        /// The unknown scope name.
        scope: String,
        /// The bean requesting it.
        name: String,
    },

    /// Registry bookkeeping was driven through an illegal transition, for
    /// example registering a singleton under an occupied name.
    #[error("illegal container state: {0}")]
    IllegalState(String),
}

impl BeansError {
    /// The bean name this error is about, when it carries one.
    pub fn bean_name(&self) -> Option<&str> {
        match self {
            BeansError::NoSuchBean(n)
            | BeansError::CurrentlyInCreation(n)
            | BeansError::CreationNotAllowed(n) => Some(n),
            BeansError::BeanNotOfRequiredType { name, .. }
            | BeansError::CreationFailure { name, .. }
            | BeansError::UnsatisfiedDependency { name, .. }
            | BeansError::DefinitionStore { name, .. }
            | BeansError::DefinitionValidation { name, .. }
            | BeansError::NoSuchScope { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Suppressed sibling errors accumulated while probing alternative
    /// candidates during creation.
    pub fn related(&self) -> &[BeansError] {
        match self {
            BeansError::CreationFailure { related, .. } => related,
            _ => &[],
        }
    }

    /// Whether this error already carries bean-creation context and must
    /// propagate unwrapped through the pipeline.
    pub(crate) fn has_creation_context(&self) -> bool {
        matches!(
            self,
            BeansError::CreationFailure { .. }
                | BeansError::CurrentlyInCreation(_)
                | BeansError::CreationNotAllowed(_)
        )
    }

    pub(crate) fn creation(
        name: impl Into<String>,
        resource: Option<&str>,
        message: impl Into<String>,
        source: Option<BeansError>,
    ) -> Self {
        BeansError::CreationFailure {
            name: name.into(),
            resource: resource.map(String::from),
            message: message.into(),
            source: source.map(Box::new),
            related: Vec::new(),
        }
    }

    pub(crate) fn push_related(&mut self, errors: impl IntoIterator<Item = BeansError>) {
        if let BeansError::CreationFailure { related, .. } = self {
            related.extend(errors);
        }
    }

    fn resource_suffix(&self) -> String {
        match self {
            BeansError::CreationFailure {
                resource: Some(r), ..
            } => format!(" defined in {}", r),
            _ => String::new(),
        }
    }

    fn not_unique_detail(&self) -> String {
        match self {
            BeansError::NoUniqueBean {
                candidates,
                message,
                ..
            } => match message {
                Some(m) => m.clone(),
                None => format!(
                    "expected single matching bean but found {}: {}",
                    candidates.len(),
                    candidates.join(", ")
                ),
            },
            _ => String::new(),
        }
    }
}

/// Result alias used throughout the container.
pub type BeansResult<T> = Result<T, BeansError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_failure_display_carries_resource() {
        let err = BeansError::creation(
            "orders",
            Some("module config"),
            "init method failed",
            None,
        );
        let text = err.to_string();
        assert!(text.contains("orders"));
        assert!(text.contains("defined in module config"));
        assert!(text.contains("init method failed"));
    }

    #[test]
    fn not_unique_lists_candidates() {
        let err = BeansError::NoUniqueBean {
            required: "dyn Plugin",
            candidates: vec!["a".into(), "b".into()],
            message: None,
        };
        let text = err.to_string();
        assert!(text.contains("found 2"));
        assert!(text.contains("a, b"));
    }

    #[test]
    fn related_accumulates() {
        let mut err = BeansError::creation("x", None, "boom", None);
        err.push_related(vec![BeansError::NoSuchBean("y".into())]);
        assert_eq!(err.related().len(), 1);
    }
}
