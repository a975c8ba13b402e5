use praetor_policy::{ExecutionMode, PolicyRule};

use crate::error::DispatchError;

/// Checks that `rule` may run in `mode`.
///
/// Stateful rules over an evict-after-use mode are
/// [`StatefulNotSupported`](DispatchError::StatefulNotSupported); any other
/// mismatch is an invalid request.
pub(crate) fn ensure_mode(rule: &PolicyRule, mode: ExecutionMode) -> Result<(), DispatchError> {
    let execution_type = rule.execution_type;
    if execution_type.allows(mode) {
        return Ok(());
    }
    if execution_type.is_stateful() && mode.is_stateless() {
        return Err(DispatchError::StatefulNotSupported {
            uri: rule.uri().to_string(),
            mode,
            execution_type: execution_type.into(),
        });
    }
    Err(DispatchError::invalid(format!(
        "rule {} (type {}) cannot run in {mode} mode",
        rule.uri(),
        u8::from(execution_type)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use praetor_policy::ExecutionType;

    fn rule(execution_type: ExecutionType) -> PolicyRule {
        PolicyRule::new("geo", "1", "stable", "bundle://geo", execution_type).unwrap()
    }

    #[test]
    fn stateful_rules_reject_stateless_modes() {
        let err = ensure_mode(&rule(ExecutionType::Function), ExecutionMode::Remote).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatefulNotSupported);
        let err = ensure_mode(&rule(ExecutionType::Graph), ExecutionMode::Job).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatefulNotSupported);
    }

    #[test]
    fn stateless_rules_cannot_be_functions() {
        let err = ensure_mode(&rule(ExecutionType::Stateless), ExecutionMode::Function).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn local_is_always_allowed() {
        for execution_type in [ExecutionType::Local, ExecutionType::Job, ExecutionType::Graph] {
            assert!(ensure_mode(&rule(execution_type), ExecutionMode::Local).is_ok());
        }
    }
}
