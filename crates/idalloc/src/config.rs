use crate::{Error, Result};

/// Number of IDs fetched per store round trip when none is configured.
pub const DEFAULT_BLOCK_SIZE: i64 = 10;

/// Smallest ID handed out when none is configured.
pub const DEFAULT_MIN_ID: i64 = 1;

/// Construction parameters for an allocator.
///
/// Hosts usually embed this in their own configuration (enable the `serde`
/// feature) and pass it to [`IdAllocator::with_config`]. Missing fields fall
/// back to [`DEFAULT_MIN_ID`] and [`DEFAULT_BLOCK_SIZE`].
///
/// # Example
/// ```
/// use idalloc::IdAllocatorConfig;
///
/// let config = IdAllocatorConfig::default().with_min_id(2).with_block_size(100);
/// assert!(config.validate().is_ok());
/// assert!(config.with_block_size(0).validate().is_err());
/// ```
///
/// [`IdAllocator::with_config`]: crate::IdAllocator::with_config
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IdAllocatorConfig {
    /// Smallest value ever returned. Must be strictly positive.
    pub min_id: i64,
    /// Values requested per replenishment. Must be at least `1`.
    pub block_size: i64,
}

impl Default for IdAllocatorConfig {
    fn default() -> Self {
        Self {
            min_id: DEFAULT_MIN_ID,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl IdAllocatorConfig {
    /// Creates a config from explicit bounds. Nothing is checked until
    /// [`Self::validate`].
    pub const fn new(min_id: i64, block_size: i64) -> Self {
        Self { min_id, block_size }
    }

    /// Returns a copy with `min_id` replaced.
    #[must_use]
    pub const fn with_min_id(mut self, min_id: i64) -> Self {
        self.min_id = min_id;
        self
    }

    /// Returns a copy with `block_size` replaced.
    #[must_use]
    pub const fn with_block_size(mut self, block_size: i64) -> Self {
        self.block_size = block_size;
        self
    }

    /// Checks `min_id > 0` and `block_size >= 1`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.min_id <= 0 {
            return Err(Error::Configuration {
                field: "min_id",
                value: self.min_id,
                requirement: "must be greater than 0",
            });
        }
        if self.block_size < 1 {
            return Err(Error::Configuration {
                field: "block_size",
                value: self.block_size,
                requirement: "must be at least 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = IdAllocatorConfig::default();
        assert_eq!(config, IdAllocatorConfig::new(1, 10));
        config.validate().unwrap();
    }

    #[test]
    fn rejects_non_positive_min_id() {
        for min_id in [0, -1, i64::MIN] {
            let err = IdAllocatorConfig::new(min_id, 10).validate().unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }));
            assert!(err.to_string().starts_with("invalid min_id"));
        }
    }

    #[test]
    fn rejects_empty_blocks() {
        let err = IdAllocatorConfig::new(2, 0).validate().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(err.to_string(), "invalid block_size 0: must be at least 1");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_with_defaults() {
        let config: IdAllocatorConfig = serde_json::from_str(r#"{"min_id": 2}"#).unwrap();
        assert_eq!(config, IdAllocatorConfig::new(2, DEFAULT_BLOCK_SIZE));

        let json = serde_json::to_string(&IdAllocatorConfig::new(5, 64)).unwrap();
        assert_eq!(json, r#"{"min_id":5,"block_size":64}"#);
    }
}
