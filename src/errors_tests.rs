// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for error types.

#[cfg(test)]
mod tests {
    use crate::errors::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(Box::new(kube::core::Status {
            status: Some(kube::core::response::StatusSummary::Failure),
            message: format!("{reason} message"),
            reason: reason.to_string(),
            code,
            ..Default::default()
        }))
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = GraphError::CycleDetected {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_client_error_from_not_found() {
        let err = ClientError::from(api_error(404, "NotFound"));
        assert_eq!(err, ClientError::NotFound("NotFound message".into()));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_client_error_distinguishes_already_exists_from_conflict() {
        let exists = ClientError::from(api_error(409, "AlreadyExists"));
        let conflict = ClientError::from(api_error(409, "Conflict"));

        assert!(matches!(exists, ClientError::AlreadyExists(_)));
        assert!(matches!(conflict, ClientError::Conflict(_)));
        assert!(exists.is_race());
        assert!(conflict.is_race());
    }

    #[test]
    fn test_client_error_retriability_follows_status_code() {
        assert!(ClientError::from(api_error(429, "TooManyRequests")).is_retriable());
        assert!(ClientError::from(api_error(503, "ServiceUnavailable")).is_retriable());
        assert!(!ClientError::from(api_error(400, "BadRequest")).is_retriable());
        assert!(!ClientError::from(api_error(422, "Invalid")).is_retriable());
    }

    #[test]
    fn test_bundle_error_retriability() {
        assert!(!BundleError::Invalid(ValidationError::DuplicateResource("a".into())).is_retriable());
        assert!(!BundleError::Client(ClientError::Conflict("x".into())).is_retriable());
        assert!(BundleError::Client(ClientError::Other {
            message: "timeout".into(),
            retriable: true
        })
        .is_retriable());
        assert!(BundleError::ResourcesFailed {
            failed: vec!["a".into()],
            retriable: true
        }
        .is_retriable());
        assert!(!BundleError::ResourcesFailed {
            failed: vec!["a".into()],
            retriable: false
        }
        .is_retriable());
    }

    #[test]
    fn test_validation_error_wraps_reference_error() {
        let err = ValidationError::Reference {
            resource: "app".into(),
            source: ReferenceError::WholeObjectNotAllowed {
                token: "{{db}}".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "resource 'app': reference '{{db}}' must select a field; whole-object references are not allowed"
        );
    }

    #[test]
    fn test_resources_failed_message() {
        let err = BundleError::ResourcesFailed {
            failed: vec!["a".into(), "b".into()],
            retriable: false,
        };
        assert_eq!(err.to_string(), "2 resource(s) failed: a, b");
    }
}
