//! Per-connection limits and buffer sizes.

/// Maximum number of headers accepted in one message head
pub const DEFAULT_MAX_HEADERS: usize = 64;

/// Maximum size in bytes of one message head
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;

/// Number of header fields handed to the parser events per batch
pub const DEFAULT_HEADER_BATCH_SIZE: usize = 32;

pub const DEFAULT_READ_HIGH_WATER_MARK: usize = 64 * 1024;
pub const DEFAULT_WRITE_HIGH_WATER_MARK: usize = 64 * 1024;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Configuration shared by the tokenizer, the inbound bodies and the tokio driver.
///
/// ```
/// use micro_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::default().with_max_headers(16).with_read_high_water_mark(4096);
/// assert_eq!(config.max_headers(), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    max_header_bytes: usize,
    max_headers: usize,
    header_batch_size: usize,
    read_high_water_mark: usize,
    write_high_water_mark: usize,
    read_buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_headers: DEFAULT_MAX_HEADERS,
            header_batch_size: DEFAULT_HEADER_BATCH_SIZE,
            read_high_water_mark: DEFAULT_READ_HIGH_WATER_MARK,
            write_high_water_mark: DEFAULT_WRITE_HIGH_WATER_MARK,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.max_header_bytes = max_header_bytes;
        self
    }

    #[must_use]
    pub fn with_max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = max_headers;
        self
    }

    /// Heads with more fields than this are delivered in several `on_headers` batches.
    #[must_use]
    pub fn with_header_batch_size(mut self, header_batch_size: usize) -> Self {
        self.header_batch_size = header_batch_size.max(1);
        self
    }

    /// Queued inbound body bytes at which reading from the transport pauses.
    #[must_use]
    pub fn with_read_high_water_mark(mut self, read_high_water_mark: usize) -> Self {
        self.read_high_water_mark = read_high_water_mark;
        self
    }

    /// Unflushed outbound bytes at which `write` starts reporting backpressure.
    #[must_use]
    pub fn with_write_high_water_mark(mut self, write_high_water_mark: usize) -> Self {
        self.write_high_water_mark = write_high_water_mark;
        self
    }

    #[must_use]
    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn max_headers(&self) -> usize {
        self.max_headers
    }

    pub fn header_batch_size(&self) -> usize {
        self.header_batch_size
    }

    pub fn read_high_water_mark(&self) -> usize {
        self.read_high_water_mark
    }

    pub fn write_high_water_mark(&self) -> usize {
        self.write_high_water_mark
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = PipelineConfig::new().with_max_header_bytes(1024).with_header_batch_size(0).with_read_buffer_size(512);

        assert_eq!(config.max_header_bytes(), 1024);
        assert_eq!(config.header_batch_size(), 1);
        assert_eq!(config.read_buffer_size(), 512);
        assert_eq!(config.max_headers(), DEFAULT_MAX_HEADERS);
        assert_eq!(config.write_high_water_mark(), DEFAULT_WRITE_HIGH_WATER_MARK);
    }
}
