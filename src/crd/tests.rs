//! Unit tests for SspSpec validation

#[cfg(test)]
mod ssp_spec_validation {
    use crate::crd::{Ssp, SspSpec};
    use kube::{CustomResourceExt, Resource};

    fn valid_spec() -> SspSpec {
        SspSpec {
            common_templates_namespace: "kubevirt".to_string(),
            template_validator_replicas: Some(2),
        }
    }

    #[test]
    fn test_valid_spec_passes() {
        assert!(valid_spec().validate().is_ok());
    }

    #[test]
    fn test_replicas_may_be_omitted() {
        let spec = SspSpec {
            template_validator_replicas: None,
            ..valid_spec()
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let spec = SspSpec {
            common_templates_namespace: "  ".to_string(),
            template_validator_replicas: Some(-1),
        };

        let errors = spec.validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "spec.commonTemplatesNamespace",
                "spec.templateValidatorReplicas"
            ]
        );
    }

    #[test]
    fn test_spec_uses_camel_case() {
        let json = serde_json::to_value(valid_spec()).unwrap();
        assert_eq!(json["commonTemplatesNamespace"], "kubevirt");
        assert_eq!(json["templateValidatorReplicas"], 2);
    }

    #[test]
    fn test_crd_identity() {
        assert_eq!(Ssp::kind(&()), "SSP");
        assert_eq!(Ssp::group(&()), "ssp.kubevirt.io");
        assert_eq!(Ssp::version(&()), "v1beta1");

        let crd = Ssp::crd();
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}
