//! Event interceptor configuration.

use thiserror::Error;

/// Configuration for an [`crate::EventInterceptor`].
///
/// The user callback and its opaque user data (`callback`,
/// `callback_user_data` in the spec's component-level description) are
/// registered separately via [`crate::EventInterceptor::with_callback`]
/// rather than carried in this struct, so `InterceptorConfig` stays
/// `Clone` and loadable from TOML like the engine's and coordinator's
/// configs.
#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// Whether the interceptor is active at all. When `false`,
    /// [`crate::EventInterceptor::start`] is a no-op.
    pub enabled: bool,
    /// Ring buffer capacity (spec: `event_buffer_size`).
    pub event_buffer_size: usize,
    /// Number of worker threads draining the ring buffer (spec:
    /// `callback_threads`).
    pub callback_threads: usize,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        InterceptorConfig {
            enabled: true,
            event_buffer_size: 65_536,
            callback_threads: 4,
        }
    }
}

impl InterceptorConfig {
    /// Set `event_buffer_size`.
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Set `callback_threads`.
    pub fn with_callback_threads(mut self, n: usize) -> Self {
        self.callback_threads = n;
        self
    }

    /// Set `enabled`.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate internal consistency.
    pub fn validate(&self) -> Result<(), InterceptorConfigError> {
        if self.event_buffer_size == 0 {
            return Err(InterceptorConfigError::InvalidBufferSize);
        }
        if self.callback_threads == 0 {
            return Err(InterceptorConfigError::InvalidWorkerCount);
        }
        Ok(())
    }
}

/// Errors from [`InterceptorConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterceptorConfigError {
    /// `event_buffer_size` was zero.
    #[error("event_buffer_size must be non-zero")]
    InvalidBufferSize,
    /// `callback_threads` was zero.
    #[error("callback_threads must be non-zero")]
    InvalidWorkerCount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(InterceptorConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_buffer_size_rejected() {
        let cfg = InterceptorConfig::default().with_event_buffer_size(0);
        assert_eq!(cfg.validate(), Err(InterceptorConfigError::InvalidBufferSize));
    }

    #[test]
    fn zero_workers_rejected() {
        let cfg = InterceptorConfig::default().with_callback_threads(0);
        assert_eq!(cfg.validate(), Err(InterceptorConfigError::InvalidWorkerCount));
    }
}
