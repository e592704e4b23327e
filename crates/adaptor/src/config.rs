/// Size of the chunks a streamed body is drained in
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 4 * 1024;

/// Body buffer capacity reserved for each response up front
pub const DEFAULT_INITIAL_BODY_CAPACITY: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptorConfig {
    stream_chunk_size: usize,
    initial_body_capacity: usize,
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        Self { stream_chunk_size: DEFAULT_STREAM_CHUNK_SIZE, initial_body_capacity: DEFAULT_INITIAL_BODY_CAPACITY }
    }
}

impl AdaptorConfig {
    pub fn builder() -> AdaptorConfigBuilder {
        AdaptorConfigBuilder { config: Self::default() }
    }

    pub fn stream_chunk_size(&self) -> usize {
        self.stream_chunk_size
    }

    pub fn initial_body_capacity(&self) -> usize {
        self.initial_body_capacity
    }
}

#[derive(Debug)]
pub struct AdaptorConfigBuilder {
    config: AdaptorConfig,
}

impl AdaptorConfigBuilder {
    /// Zero is raised to one byte.
    pub fn stream_chunk_size(mut self, stream_chunk_size: usize) -> Self {
        self.config.stream_chunk_size = stream_chunk_size.max(1);
        self
    }

    pub fn initial_body_capacity(mut self, initial_body_capacity: usize) -> Self {
        self.config.initial_body_capacity = initial_body_capacity;
        self
    }

    pub fn build(self) -> AdaptorConfig {
        self.config
    }
}
