//! Tests for the protocol module
//!
//! These tests pin the wire shape the platform relies on: PascalCase field
//! names, optional fields that disappear when empty, and the handler
//! reference grammar.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;

    #[test]
    fn test_request_decodes_platform_body() {
        let body = json!({
            "Handler": "isprime.handler",
            "HandlerDir": "/app",
            "Params": {"n": "17"},
            "ReturnOutput": true,
            "Command": ["python", "executor.py"],
            "IsInComposition": false
        });
        let req: InvocationRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.handler, "isprime.handler");
        assert_eq!(req.handler_dir, std::path::PathBuf::from("/app"));
        assert_eq!(req.params, json!({"n": "17"}));
        assert!(req.return_output);
        assert!(req.id.is_none());
    }

    #[test]
    fn test_request_defaults_when_fields_missing() {
        let req: InvocationRequest = serde_json::from_value(json!({"Handler": "m.f"})).unwrap();
        assert_eq!(req.params, json!({}));
        assert!(!req.return_output);
        assert_eq!(req.handler_dir, std::path::PathBuf::new());
    }

    #[test]
    fn test_request_null_params_become_empty_mapping() {
        let req: InvocationRequest =
            serde_json::from_value(json!({"Handler": "m.f", "Params": null})).unwrap();
        assert_eq!(req.params, json!({}));
    }

    #[test]
    fn test_request_without_handler_is_rejected() {
        let result = serde_json::from_value::<InvocationRequest>(json!({"Params": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_request_serializes_pascal_case() {
        let req = InvocationRequest::new("m.f", json!({"a": 1})).with_id("req-1");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["Handler"], "m.f");
        assert_eq!(value["Params"]["a"], 1);
        assert_eq!(value["ReturnOutput"], false);
        assert_eq!(value["Id"], "req-1");
    }

    #[test]
    fn test_reference_splits_at_last_dot() {
        let reference: HandlerReference = "pkg.sub.handler".parse().unwrap();
        assert_eq!(reference.module, "pkg.sub");
        assert_eq!(reference.function, "handler");
        assert_eq!(reference.to_string(), "pkg.sub.handler");
    }

    #[test]
    fn test_reference_without_separator_is_load_error() {
        let err = "handler".parse::<HandlerReference>().unwrap_err();
        assert!(matches!(err, FexecError::Load(_)));
    }

    #[test]
    fn test_reference_with_empty_function_is_load_error() {
        let err = "isprime.".parse::<HandlerReference>().unwrap_err();
        assert!(matches!(err, FexecError::Load(_)));
    }

    #[test]
    fn test_reference_with_empty_module_is_load_error() {
        let err = ".handler".parse::<HandlerReference>().unwrap_err();
        assert!(matches!(err, FexecError::Load(_)));
    }

    #[test]
    fn test_success_response_round_trips_result() {
        let returned = json!({"IsPrime": true, "factors": [1, 17]});
        let resp = InvocationResponse::success(Some("7".into()), &returned).unwrap();
        assert!(resp.success);
        assert_eq!(resp.result_value().unwrap(), Some(returned));
        assert_eq!(resp.id.as_deref(), Some("7"));
    }

    #[test]
    fn test_failure_response_omits_result_and_output() {
        let resp = InvocationResponse::failure(None);
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["Success"], false);
        assert!(value.get("Result").is_none());
        assert!(value.get("Output").is_none());
        assert!(value.get("Id").is_none());
        assert_eq!(resp.result_value().unwrap(), None);
    }

    #[test]
    fn test_response_output_is_kept_when_requested() {
        let resp = InvocationResponse::failure(None).with_output(Some(String::new()));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["Output"], "");
    }

    #[test]
    fn test_response_duration_in_seconds() {
        let resp = InvocationResponse::failure(None)
            .with_duration(std::time::Duration::from_millis(1500));
        assert!((resp.duration - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fallback_update_wire_shape() {
        let update: FallbackUpdate =
            serde_json::from_value(json!({"FallbackAddresses": ["10.0.0.1", "10.0.0.2:1400"]}))
                .unwrap();
        assert_eq!(update, FallbackUpdate::new(["10.0.0.1", "10.0.0.2:1400"]));
        assert_eq!(serde_json::to_value(FallbackUpdateAck::ok()).unwrap(), json!({"Success": true}));
    }

    #[test]
    fn test_error_display() {
        let err = FexecError::FallbackDelivery {
            address: "10.0.0.1".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Fallback delivery to 10.0.0.1 failed: connection refused"
        );
    }
}
