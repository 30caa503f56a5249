use thiserror::Error;

/// Failures synthesized by the group itself rather than returned by the work.
///
/// They travel inside the same [`SharedError`](crate::SharedError) as user
/// failures; use `err.downcast_ref::<FlightError>()` to tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlightError {
    /// The work panicked. Waiters get this instead of hanging; the executing
    /// caller sees the panic itself.
    #[error("singleflight: call for key {key:?} panicked: {message}")]
    Panicked { key: String, message: String },
    /// The executing caller went away before the work produced a result,
    /// e.g. its future was dropped.
    #[error("singleflight: call for key {key:?} was abandoned before completing")]
    Abandoned { key: String },
}

impl FlightError {
    pub fn key(&self) -> &str {
        match self {
            FlightError::Panicked { key, .. } | FlightError::Abandoned { key } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FlightError;

    #[test]
    fn test_display() {
        let err = FlightError::Panicked {
            key: "user:1".to_owned(),
            message: "boom".to_owned(),
        };
        assert_eq!(err.key(), "user:1");
        assert_eq!(
            err.to_string(),
            "singleflight: call for key \"user:1\" panicked: boom"
        );

        let err = FlightError::Abandoned {
            key: "user:2".to_owned(),
        };
        assert_eq!(err.key(), "user:2");
        assert!(err.to_string().ends_with("was abandoned before completing"));
    }
}
