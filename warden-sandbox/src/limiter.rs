use tracing::debug;
use wasmtime::ResourceLimiter;

/// A resource limiter that enforces a memory ceiling and records the peak
/// size the guest asked for.
pub(crate) struct TrackingLimiter {
    max_memory: usize,
    peak_memory: usize,
    denied: bool,
    max_table_elements: usize,
    max_instances: usize,
    max_tables: usize,
    max_memories: usize,
}

impl TrackingLimiter {
    pub fn new(max_memory: usize) -> Self {
        Self {
            max_memory,
            peak_memory: 0,
            denied: false,
            max_table_elements: 20_000,
            max_instances: 1,
            max_tables: 10,
            max_memories: 1,
        }
    }

    pub fn peak_memory_bytes(&self) -> usize {
        self.peak_memory
    }

    /// Whether any growth request was refused.
    pub fn limit_hit(&self) -> bool {
        self.denied
    }
}

impl ResourceLimiter for TrackingLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        if desired <= self.max_memory {
            self.peak_memory = self.peak_memory.max(desired);
            Ok(true)
        } else {
            self.denied = true;
            debug!(
                current,
                desired,
                max = self.max_memory,
                "memory growth denied, would exceed limit"
            );
            Ok(false)
        }
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        Ok(desired <= self.max_table_elements)
    }

    fn instances(&self) -> usize {
        self.max_instances
    }

    fn tables(&self) -> usize {
        self.max_tables
    }

    fn memories(&self) -> usize {
        self.max_memories
    }
}
