//! Destruction adapters: one object per disposable bean, bundling its
//! destroy hook, resolved destroy methods, and destruction-aware
//! processors into a single callback the registry can invoke.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::definition::merged::MergedBeanDefinition;
use crate::definition::{MethodFn, INFER_METHOD};
use crate::error::{BeansError, BeansResult};
use crate::key::{is_null_bean, BeanArc};
use crate::lifecycle::DESTROY;
use crate::processor::DestructionProcessor;

/// Method names probed, in order, when destroy-method inference is on.
const INFERRED_CANDIDATES: [&str; 2] = ["close", "shutdown"];

/// Resolves the definition's declared destroy-method names against its
/// pooled methods, expanding the inference marker. Cached per definition.
pub(crate) fn resolved_destroy_names(
    name: &str,
    merged: &MergedBeanDefinition,
) -> BeansResult<Arc<Vec<String>>> {
    merged
        .destroy_names
        .get_or_try_init(|| {
            let def = merged.raw();
            let mut resolved: Vec<String> = Vec::new();
            for declared in &def.destroy_method_names {
                if declared == INFER_METHOD {
                    // Inference yields to an explicit destroy hook.
                    if def.hooks.disposable.is_some() {
                        continue;
                    }
                    if let Some(found) = INFERRED_CANDIDATES
                        .iter()
                        .find(|candidate| def.method_named(candidate).is_some())
                    {
                        if !resolved.iter().any(|r| r == found) {
                            resolved.push((*found).to_string());
                        }
                    }
                } else if merged.is_externally_managed_destroy(declared) {
                    continue;
                } else if def.method_named(declared).is_some() {
                    if !resolved.iter().any(|r| r == declared) {
                        resolved.push(declared.clone());
                    }
                } else {
                    return Err(BeansError::DefinitionValidation {
                        name: name.to_string(),
                        message: format!("couldn't find a destroy method named '{}'", declared),
                    });
                }
            }
            Ok(Arc::new(resolved))
        })
        .cloned()
}

/// Whether the bean needs a destruction adapter at all.
pub(crate) fn requires_destruction(
    name: &str,
    bean: &BeanArc,
    merged: &MergedBeanDefinition,
    processors: &[Arc<dyn DestructionProcessor>],
) -> BeansResult<bool> {
    if is_null_bean(bean) {
        return Ok(false);
    }
    let def = merged.raw();
    if def.hooks.disposable.is_some() && !merged.is_externally_managed_destroy(DESTROY) {
        return Ok(true);
    }
    if !resolved_destroy_names(name, merged)?.is_empty() {
        return Ok(true);
    }
    Ok(processors.iter().any(|p| p.requires_destruction(bean)))
}

/// Snapshot of everything needed to tear one bean down later, detached
/// from the definition that produced it.
pub(crate) struct DisposableAdapter {
    name: String,
    bean: BeanArc,
    processors: Vec<Arc<dyn DestructionProcessor>>,
    hook: Option<Arc<MethodFn>>,
    methods: Vec<(String, Arc<MethodFn>)>,
}

impl DisposableAdapter {
    pub(crate) fn new(
        name: &str,
        bean: BeanArc,
        merged: &MergedBeanDefinition,
        snapshot: &[Arc<dyn DestructionProcessor>],
    ) -> BeansResult<Self> {
        let def = merged.raw();
        let hook = if merged.is_externally_managed_destroy(DESTROY) {
            None
        } else {
            def.hooks.disposable.clone()
        };
        let methods = resolved_destroy_names(name, merged)?
            .iter()
            .filter_map(|method_name| {
                def.method_named(method_name)
                    .map(|spec| (method_name.clone(), spec.invoke.clone()))
            })
            .collect();
        let processors = snapshot
            .iter()
            .filter(|p| p.requires_destruction(&bean))
            .cloned()
            .collect();
        Ok(DisposableAdapter {
            name: name.to_string(),
            bean,
            processors,
            hook,
            methods,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_callback(
        name: &str,
        bean: BeanArc,
        callback: impl Fn(&BeanArc) -> BeansResult<()> + Send + Sync + 'static,
    ) -> Self {
        DisposableAdapter {
            name: name.to_string(),
            bean,
            processors: Vec::new(),
            hook: Some(Arc::new(callback)),
            methods: Vec::new(),
        }
    }

    /// Runs every destruction step. Failures are logged and never cut the
    /// teardown short.
    pub(crate) fn destroy(&self) {
        for processor in &self.processors {
            self.guarded("destruction processor", || {
                processor.before_destruction(&self.bean, &self.name)
            });
        }
        if let Some(hook) = &self.hook {
            debug!(bean = %self.name, "invoking destroy hook");
            self.guarded("destroy hook", || hook(&self.bean));
        }
        for (method_name, invoke) in &self.methods {
            debug!(bean = %self.name, method = %method_name, "invoking destroy method");
            self.guarded("destroy method", || invoke(&self.bean));
        }
    }

    fn guarded(&self, step: &str, run: impl FnOnce() -> BeansResult<()>) {
        match catch_unwind(AssertUnwindSafe(run)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(bean = %self.name, error = %err, "{} failed", step),
            Err(_) => warn!(bean = %self.name, "{} panicked", step),
        }
    }
}
