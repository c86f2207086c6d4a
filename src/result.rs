use crate::core::{StoreError, StoreResult};
use serde::Serialize;

/// Uniform outcome of one store operation.
///
/// `error` is present exactly when `success` is false. Useful at API
/// boundaries that want a serializable status object instead of a `Result`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: &StoreError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn into_result(self) -> StoreResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(StoreError::backend("successful outcome carried no data")),
            (false, _) => Err(StoreError::BackendFailure(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

impl<T> From<StoreResult<T>> for Outcome<T> {
    fn from(result: StoreResult<T>) -> Self {
        match result {
            Ok(data) => Outcome::ok(data),
            Err(err) => Outcome::failed(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_and_error_are_exclusive() {
        let ok: Outcome<u32> = Ok(3).into();
        assert!(ok.is_success());
        assert_eq!(ok.data, Some(3));
        assert!(ok.error.is_none());

        let failed: Outcome<u32> = Err(StoreError::StoreNotFound("users".into())).into();
        assert!(!failed.is_success());
        assert!(failed.data.is_none());
        assert_eq!(failed.error.as_deref(), Some("Store 'users' not found"));
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let ok = Outcome::ok(json!({"id": 1}));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"success": true, "data": {"id": 1}, "error": null})
        );
    }

    #[test]
    fn test_into_result_roundtrip() {
        assert_eq!(Outcome::ok(5).into_result(), Ok(5));
        let failed: Outcome<()> = Outcome::failed(&StoreError::QueueClosed);
        assert!(failed.into_result().is_err());
    }
}
