//! Property-based tests for the source scan.
//!
//! The dangerous-pattern gate must be deterministic: a literal `eval(`
//! anywhere in a source makes it unsafe, whatever surrounds it.

use proptest::prelude::*;
use warden_security::SecurityValidator;

proptest! {
    #[test]
    fn eval_call_is_always_unsafe(prefix in "[ -~\n]{0,200}", suffix in "[ -~\n]{0,200}") {
        let source = format!("{prefix}eval(payload){suffix}");
        let report = SecurityValidator::default().validate_code(&source, "plugin.js");
        prop_assert!(!report.safe);
        prop_assert!(report.risks.iter().any(|r| r.to_lowercase().contains("code evaluation")));
    }

    #[test]
    fn validation_is_deterministic(source in "[ -~\n]{0,300}", name in "[a-z]{1,8}\\.(js|ts|sh)") {
        let v = SecurityValidator::default();
        prop_assert_eq!(v.validate_code(&source, &name), v.validate_code(&source, &name));
    }
}
