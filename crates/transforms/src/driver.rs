//! Dispatch driver: runs registered transformers over raw classfile
//! bytes and reports whether anything changed.
//!
//! A class is only parsed once at least one transformer declares
//! interest, and only re-serialized when at least one transformer
//! reports a change; untouched classes pass through as `None` so the
//! host can keep its original byte array.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, trace};

use classweave_core::{parse_class, write_class};
use classweave_utils::errors::DriverError;

use crate::{ClassContext, Transformer};

/// Answers whether a class is present in the host environment.
///
/// Transformers that rewrite code to depend on a support class declare
/// it via [`Transformer::required_class`]; the driver skips them when
/// the resolver cannot see that class.
pub trait ClassResolver: Send + Sync {
    fn resolve(&self, class_name: &str) -> bool;
}

/// Resolver that assumes every class is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysResolves;

impl ClassResolver for AlwaysResolves {
    fn resolve(&self, _class_name: &str) -> bool {
        true
    }
}

/// What to do when a transformer fails on a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the whole class; the caller sees the error.
    #[default]
    Fatal,
    /// Log the failure, keep the output of earlier transformers, and
    /// continue with the remaining ones.
    Isolate,
}

pub struct DriverBuilder {
    transformers: Vec<Box<dyn Transformer>>,
    modules: HashMap<String, bool>,
    resolver: Arc<dyn ClassResolver>,
    policy: FailurePolicy,
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self {
            transformers: Vec::new(),
            modules: HashMap::new(),
            resolver: Arc::new(AlwaysResolves),
            policy: FailurePolicy::default(),
        }
    }
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, transformer: Box<dyn Transformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    /// Per-transformer enable switches keyed by [`Transformer::name`].
    /// Transformers absent from the map stay enabled.
    pub fn modules(mut self, modules: HashMap<String, bool>) -> Self {
        self.modules = modules;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ClassResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Driver {
        Driver {
            transformers: self.transformers.into(),
            modules: self.modules,
            resolver: self.resolver,
            policy: self.policy,
        }
    }
}

/// Owns the transformer pipeline. Cheap to share across threads; all
/// per-class state lives on the stack of [`Driver::transform_class`].
pub struct Driver {
    transformers: Arc<[Box<dyn Transformer>]>,
    modules: HashMap<String, bool>,
    resolver: Arc<dyn ClassResolver>,
    policy: FailurePolicy,
}

impl Driver {
    pub fn builder() -> DriverBuilder {
        DriverBuilder::new()
    }

    fn enabled(&self, transformer: &dyn Transformer) -> bool {
        self.modules.get(transformer.name()).copied().unwrap_or(true)
    }

    /// Runs every enabled, interested transformer over one class.
    ///
    /// `name` is the class's original internal name and
    /// `transformed_name` the name it is loaded under (they differ when
    /// the host remaps). Returns the rewritten bytes, or `None` when no
    /// transformer changed anything.
    pub fn transform_class(
        &self,
        name: &str,
        transformed_name: &str,
        bytes: &[u8],
    ) -> Result<Option<Vec<u8>>, DriverError> {
        let interested: Vec<&dyn Transformer> = self
            .transformers
            .iter()
            .map(|t| t.as_ref())
            .filter(|t| self.enabled(*t) && t.interested(name, transformed_name))
            .collect();
        if interested.is_empty() {
            trace!(class = %name, "no transformer interested");
            return Ok(None);
        }

        let mut class = parse_class(bytes).map_err(|source| DriverError::Read {
            name: name.to_owned(),
            source,
        })?;
        let ctx = ClassContext {
            name: name.to_owned(),
            transformed_name: transformed_name.to_owned(),
        };

        let mut changed = false;
        for transformer in interested {
            if let Some(required) = transformer.required_class() {
                if !self.resolver.resolve(required) {
                    debug!(
                        class = %name,
                        transformer = transformer.name(),
                        required,
                        "required class unresolvable, skipping"
                    );
                    continue;
                }
            }
            match transformer.transform_class(&ctx, &mut class) {
                Ok(true) => {
                    info!(class = %name, transformer = transformer.name(), "class changed");
                    changed = true;
                }
                Ok(false) => {}
                Err(source) => match self.policy {
                    FailurePolicy::Fatal => {
                        return Err(DriverError::Transform {
                            name: name.to_owned(),
                            transformer: transformer.name().to_owned(),
                            source,
                        });
                    }
                    FailurePolicy::Isolate => {
                        error!(
                            class = %name,
                            transformer = transformer.name(),
                            %source,
                            "transformer failed, continuing"
                        );
                    }
                },
            }
        }

        if !changed {
            return Ok(None);
        }
        let out = write_class(&class).map_err(|source| DriverError::Write {
            name: name.to_owned(),
            source,
        })?;
        Ok(Some(out))
    }
}
