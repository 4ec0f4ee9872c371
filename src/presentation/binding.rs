//! Binding of display targets to the locator they currently show.
//!
//! A target can be rebound while an earlier request for it is still in
//! flight. Completions are only applied when the target still shows the
//! locator that was requested.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::domain::entities::{Bounds, LoadedImage, TargetId};
use crate::domain::errors::{CacheError, CacheResult};
use crate::infrastructure::image::{ImageLoadedEvent, ImageLoader, Request};

/// What to do with a completion.
#[derive(Debug)]
pub enum Delivery {
    /// The target still wants this locator.
    Apply(TargetId, Result<LoadedImage, CacheError>),
    /// The target was rebound or released since the request.
    Stale,
}

/// Current locator of each bound target. Lives on the origin context.
#[derive(Debug, Default)]
pub struct TargetBindings {
    bound: HashMap<TargetId, String>,
}

impl TargetBindings {
    /// Creates an empty set of bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags `target` with `locator`, replacing any earlier tag.
    pub fn bind(&mut self, target: TargetId, locator: &str) {
        if let Some(previous) = self.bound.insert(target, locator.to_string())
            && previous != locator
        {
            trace!(target_id = %target, previous = %previous, "Target rebound");
        }
    }

    /// Returns the locator `target` currently shows.
    #[must_use]
    pub fn current(&self, target: TargetId) -> Option<&str> {
        self.bound.get(&target).map(String::as_str)
    }

    /// Releases `target`; pending completions for it become stale.
    pub fn unbind(&mut self, target: TargetId) -> Option<String> {
        self.bound.remove(&target)
    }

    /// Returns how many targets are bound.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    /// Returns true if no target is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Tags `target` with `locator` and asks the loader for it. A zero
    /// dimension requests the image at full size.
    ///
    /// # Errors
    /// Returns the loader's rejection. The tag is left in place so a later
    /// completion for an earlier request is still treated as stale.
    pub fn bind_target(
        &mut self,
        loader: &ImageLoader,
        locator: &str,
        target: TargetId,
        width: u32,
        height: u32,
    ) -> CacheResult<Request> {
        self.bind(target, locator);
        debug!(target_id = %target, locator, width, height, "Binding target");
        loader.request(target, locator, Bounds::new(width, height))
    }

    /// Decides whether a completion still applies to its target.
    #[must_use]
    pub fn deliver(&self, event: ImageLoadedEvent) -> Delivery {
        match self.current(event.target) {
            Some(current) if current == event.locator => Delivery::Apply(event.target, event.result),
            _ => {
                trace!(target_id = %event.target, locator = %event.locator, "Dropping stale completion");
                Delivery::Stale
            }
        }
    }
}
