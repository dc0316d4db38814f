//! Continuation resolvers: what runs after a context halts.
//!
//! Resolvers are consulted in the order they were added to the [`ResolverChain`]. The first one
//! that takes the halted context ends the search; later resolvers never see it.

use std::fmt;
use std::path::PathBuf;

use retroshade_emu::{
    EntryCapability, ExecutionContext, LoadRequest, ModuleLoader, StageInput, PRIMARY_STAGE,
};

use crate::output::OutputStore;

/// Result of offering a halted context to one resolver.
pub enum Resolution {
    /// The resolver took the halted context and produced the next stage's context.
    Continue(Box<dyn ExecutionContext>),
    /// The resolver took the halted context but nothing follows it.
    Consumed,
    /// Not applicable; the halted context is handed back untouched.
    Declined(Box<dyn ExecutionContext>),
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Continue(ctx) => f
                .debug_tuple("Continue")
                .field(&ctx.module().display())
                .finish(),
            Resolution::Consumed => f.write_str("Consumed"),
            Resolution::Declined(ctx) => f
                .debug_tuple("Declined")
                .field(&ctx.module().display())
                .finish(),
        }
    }
}

/// Vendor-specific continuation logic.
///
/// Implementations that accept a context own it from that point on; they must drop it before
/// loading the follow-on module so that at most one context is alive.
///
/// Returning [`Resolution::Consumed`] ends resolution: resolvers later in the chain are not
/// consulted and the pipeline finishes. Return [`Resolution::Declined`] to let them try.
pub trait ContinuationResolver {
    fn next_process(
        &mut self,
        halted: Box<dyn ExecutionContext>,
        outputs: &OutputStore,
        loader: &mut dyn ModuleLoader,
    ) -> Resolution;
}

/// Adapts a closure into a [`ContinuationResolver`].
pub struct FnResolver<F>(pub F);

impl<F> ContinuationResolver for FnResolver<F>
where
    F: FnMut(Box<dyn ExecutionContext>, &OutputStore, &mut dyn ModuleLoader) -> Resolution,
{
    fn next_process(
        &mut self,
        halted: Box<dyn ExecutionContext>,
        outputs: &OutputStore,
        loader: &mut dyn ModuleLoader,
    ) -> Resolution {
        (self.0)(halted, outputs, loader)
    }
}

/// Feeds a stage's output into another module once a context bound to a given module halts.
#[derive(Debug, Clone)]
pub struct HandoffResolver {
    from_module: String,
    from_capability: Option<EntryCapability>,
    input_stage: String,
    to_module: PathBuf,
    capability: EntryCapability,
}

impl HandoffResolver {
    /// Hand off from contexts bound to a module named `from_module` (file name, ASCII
    /// case-insensitive) to `to_module`, using the driver-execution capability and the primary
    /// output as input.
    pub fn new(from_module: impl Into<String>, to_module: impl Into<PathBuf>) -> Self {
        Self {
            from_module: from_module.into(),
            from_capability: None,
            input_stage: PRIMARY_STAGE.to_string(),
            to_module: to_module.into(),
            capability: EntryCapability::DriverExecution,
        }
    }

    /// Only accept halted contexts started through `capability`.
    pub fn when_capability(mut self, capability: EntryCapability) -> Self {
        self.from_capability = Some(capability);
        self
    }

    pub fn input_stage(mut self, stage: impl Into<String>) -> Self {
        self.input_stage = stage.into();
        self
    }

    pub fn capability(mut self, capability: EntryCapability) -> Self {
        self.capability = capability;
        self
    }

    fn matches(&self, halted: &dyn ExecutionContext) -> bool {
        let origin = halted.origin();
        let module_matches = origin
            .module_name()
            .is_some_and(|name| name.eq_ignore_ascii_case(&self.from_module));
        let capability_matches = self
            .from_capability
            .map_or(true, |cap| cap == origin.capability);
        module_matches && capability_matches
    }
}

impl ContinuationResolver for HandoffResolver {
    fn next_process(
        &mut self,
        halted: Box<dyn ExecutionContext>,
        outputs: &OutputStore,
        loader: &mut dyn ModuleLoader,
    ) -> Resolution {
        if !self.matches(halted.as_ref()) {
            return Resolution::Declined(halted);
        }

        let bytes = outputs.binary(&self.input_stage);
        if bytes.is_empty() {
            tracing::debug!(
                stage = %self.input_stage,
                module = %halted.module().display(),
                "handoff declined: no input bytes"
            );
            return Resolution::Declined(halted);
        }

        let request = LoadRequest::new(
            self.to_module.clone(),
            self.capability,
            StageInput::Binary {
                bytes: bytes.to_vec(),
                machine: halted.origin().input.machine().to_vec(),
            },
        );
        drop(halted);

        match loader.load(request) {
            Some(next) => Resolution::Continue(next),
            None => {
                tracing::warn!(
                    module = %self.to_module.display(),
                    "handoff target module unavailable"
                );
                Resolution::Consumed
            }
        }
    }
}

/// Outcome of running the whole chain against one halted context.
pub enum ChainOutcome {
    Next {
        resolver: String,
        context: Box<dyn ExecutionContext>,
    },
    Stopped {
        resolver: String,
    },
    /// No resolver applied; the halted context is returned for the caller to destroy.
    Exhausted(Box<dyn ExecutionContext>),
}

/// Resolvers in fixed priority order.
#[derive(Default)]
pub struct ResolverChain {
    entries: Vec<(String, Box<dyn ContinuationResolver>)>,
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `resolver` at the lowest priority so far.
    pub fn with(
        mut self,
        name: impl Into<String>,
        resolver: impl ContinuationResolver + 'static,
    ) -> Self {
        self.push(name, resolver);
        self
    }

    pub fn with_fn<F>(self, name: impl Into<String>, resolver: F) -> Self
    where
        F: FnMut(Box<dyn ExecutionContext>, &OutputStore, &mut dyn ModuleLoader) -> Resolution
            + 'static,
    {
        self.with(name, FnResolver(resolver))
    }

    pub fn push(&mut self, name: impl Into<String>, resolver: impl ContinuationResolver + 'static) {
        self.entries.push((name.into(), Box::new(resolver)));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(
        &mut self,
        halted: Box<dyn ExecutionContext>,
        outputs: &OutputStore,
        loader: &mut dyn ModuleLoader,
    ) -> ChainOutcome {
        let mut halted = halted;
        for (name, resolver) in &mut self.entries {
            match resolver.next_process(halted, outputs, &mut *loader) {
                Resolution::Continue(context) => {
                    return ChainOutcome::Next {
                        resolver: name.clone(),
                        context,
                    }
                }
                Resolution::Consumed => {
                    return ChainOutcome::Stopped {
                        resolver: name.clone(),
                    }
                }
                Resolution::Declined(ctx) => halted = ctx,
            }
        }
        ChainOutcome::Exhausted(halted)
    }
}
