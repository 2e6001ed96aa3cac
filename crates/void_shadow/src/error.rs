//! Shadow system error types
//!
//! Only configuration and construction can fail. The per-frame path
//! degrades instead of erroring: lights that do not fit fall back to baked
//! shadowing through the negative-strength sentinel.

use thiserror::Error;

use crate::caster::CasterId;
use crate::clip::ClipError;

/// Shadow system errors
#[derive(Debug, Error)]
pub enum ShadowError {
    /// Atlas size is not a supported power of two
    #[error("Invalid {atlas} atlas size {size}: expected a power of two in 256..=8192")]
    InvalidAtlasSize { atlas: &'static str, size: u32 },

    /// Cascade count outside 1..=4
    #[error("Invalid cascade count {0}: expected 1..=4")]
    InvalidCascadeCount(u32),

    /// Cascade ratios must be strictly increasing inside (0, 1)
    #[error("Invalid cascade ratios {0:?}: expected strictly increasing values in (0, 1)")]
    InvalidCascadeRatios([f32; 3]),

    /// Fade factor outside (0, 1]
    #[error("Invalid {name} fade {value}: expected a value in (0, 1]")]
    InvalidFade { name: &'static str, value: f32 },

    /// Maximum shadow distance must be positive
    #[error("Invalid max shadow distance {0}")]
    InvalidDistance(f32),

    /// Settings could not be parsed
    #[error("Shadow configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Caster identity already held by a different caster
    #[error("{0} is already registered to a different caster")]
    CasterIdentityConflict(CasterId),

    /// Fixed-capacity clip scratch overflowed
    #[error(transparent)]
    Clip(#[from] ClipError),
}

/// Result type for shadow operations
pub type ShadowResult<T> = Result<T, ShadowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_error_converts() {
        fn overflow() -> ShadowResult<()> {
            let clipped: Result<(), ClipError> = Err(ClipError::CapacityExceeded { capacity: 16 });
            clipped?;
            Ok(())
        }

        let err = overflow().unwrap_err();
        assert!(matches!(err, ShadowError::Clip(ClipError::CapacityExceeded { capacity: 16 })));
        assert_eq!(err.to_string(), "Clip scratch capacity of 16 triangles exceeded");
    }

    #[test]
    fn test_messages() {
        let err = ShadowError::InvalidAtlasSize { atlas: "spot", size: 300 };
        assert!(err.to_string().contains("spot atlas size 300"));

        let err = ShadowError::CasterIdentityConflict(CasterId::from_raw(4));
        assert_eq!(err.to_string(), "caster#4 is already registered to a different caster");

        let err: ShadowError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.to_string().starts_with("Shadow configuration error"));
    }
}
