//! Class transformers: the trait they implement, the transactional edit
//! batch they apply changes through, the dynamic-call-site generator they
//! target, the two shipped transformers, and the driver that dispatches a
//! registry of them over incoming classes.

pub mod batch;
pub mod callsite;
pub mod concat;
pub mod constant_fold;
pub mod driver;

pub use batch::ChangeBatch;
pub use callsite::{BootstrapSpec, ConcatRecipe};
pub use concat::ConcatFolding;
pub use constant_fold::{ChainedCall, FieldConstantFolding, FoldTarget};
pub use driver::{AlwaysResolves, ClassResolver, Driver, DriverBuilder, FailurePolicy};

use classweave_core::{ClassNode, MethodNode};
use classweave_utils::errors::TransformError;

/// Names of the class being transformed, as the host reports them. The
/// transformed name differs from the original when an external remapper is
/// active; interest predicates get both.
#[derive(Debug, Clone)]
pub struct ClassContext {
    pub name: String,
    pub transformed_name: String,
}

/// A single bytecode transformer.
///
/// Implementations must be idempotent: running over already-transformed
/// output finds nothing to do and reports unchanged.
pub trait Transformer: Send + Sync {
    /// Stable name, used for logging and module gating.
    fn name(&self) -> &'static str;

    /// Whether this transformer wants to see the class at all. Must be
    /// pure and cheap; the driver skips parsing entirely when no
    /// registered transformer is interested.
    fn interested(&self, name: &str, transformed_name: &str) -> bool;

    /// A class that must be resolvable in the host for this transformer's
    /// output to link. The driver skips the transformer when the resolver
    /// cannot find it.
    fn required_class(&self) -> Option<&str> {
        None
    }

    /// Transforms the class in place, returning whether anything changed.
    ///
    /// The default dispatches [`transform_method`](Self::transform_method)
    /// over every method carrying code and ORs the results.
    fn transform_class(
        &self,
        ctx: &ClassContext,
        class: &mut ClassNode,
    ) -> Result<bool, TransformError> {
        let mut changed = false;
        for method in &mut class.methods {
            if method.has_code() {
                changed |= self.transform_method(ctx, method)?;
            }
        }
        Ok(changed)
    }

    /// Transforms one method body in place.
    fn transform_method(
        &self,
        _ctx: &ClassContext,
        _method: &mut MethodNode,
    ) -> Result<bool, TransformError> {
        Ok(false)
    }
}
