//! Keyed pipeline storage.

use pandolabo_core::Result;
use pandolabo_gpu::{GpuContext, Pipeline};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Pipelines by name, built on first request.
///
/// Pipelines are plain handles; [`PipelineCache::destroy`] must run before
/// the context is dropped.
#[derive(Debug, Default)]
pub struct PipelineCache {
    pipelines: HashMap<String, Pipeline>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pipeline stored under `key`, calling `builder` only when absent.
    ///
    /// A failed build stores nothing.
    pub fn get_or_create<F>(
        &mut self,
        ctx: &GpuContext,
        key: &str,
        builder: F,
    ) -> Result<&Pipeline>
    where
        F: FnOnce(&GpuContext) -> Result<Pipeline>,
    {
        match self.pipelines.entry(key.to_owned()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let pipeline =
                    builder(ctx).map_err(|e| e.with_context("PipelineCache::getOrCreate"))?;
                tracing::debug!(key, "Cached pipeline");
                Ok(entry.insert(pipeline))
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Pipeline> {
        self.pipelines.get(key)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Destroy every cached pipeline and empty the cache.
    ///
    /// # Safety
    /// No cached pipeline may be referenced by a pending command buffer.
    pub unsafe fn destroy(&mut self, ctx: &GpuContext) {
        for (_, pipeline) in self.pipelines.drain() {
            unsafe { pipeline.destroy(ctx.device()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pandolabo_gpu::vk::{self, Handle};
    use pandolabo_gpu::PipelineBind;

    #[test]
    fn lookups_by_key() {
        let mut cache = PipelineCache::new();
        assert!(cache.is_empty());

        let pipeline = Pipeline::from_raw(
            vk::Pipeline::from_raw(7),
            vk::PipelineLayout::from_raw(8),
            PipelineBind::Compute,
        );
        cache.pipelines.insert("blur".to_owned(), pipeline);

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("blur").map(Pipeline::handle),
            Some(vk::Pipeline::from_raw(7))
        );
        assert!(cache.get("sharpen").is_none());
    }
}
