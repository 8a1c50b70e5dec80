//! SAML 1.x validators

use super::{keys, ValidationContext, ValidationResult, Validator};
use crate::error::ValidationError;
use crate::saml::saml1::{
    AudienceRestrictionCondition, AuthorizationDecisionStatement, Saml1Assertion, Saml1Audience,
    Saml1Conditions,
};
use crate::saml::SamlVersion;
use crate::xml::kind::ElementTag;
use crate::xml::tree::{ObjectId, XmlTree};

/// `target` as a 1.x assertion's Conditions: either the Conditions object
/// itself or the Conditions child of an assertion
fn conditions_of(tree: &XmlTree, target: ObjectId) -> Result<Option<ObjectId>, ValidationError> {
    match tree.get(target)?.tag() {
        ElementTag::Saml1Conditions => Ok(Some(target)),
        _ => Ok(tree.payload::<Saml1Assertion>(target)?.conditions()),
    }
}

/// The version governing `conditions`, taken from the owning assertion
fn governing_version(tree: &XmlTree, conditions: ObjectId) -> Option<SamlVersion> {
    let assertion = tree.parent(conditions)?;
    tree.payload::<Saml1Assertion>(assertion).ok()?.version
}

/// Assertion version must be 1.0 or 1.1
#[derive(Debug, Default, Clone, Copy)]
pub struct Saml1VersionValidator;

impl Validator for Saml1VersionValidator {
    fn name(&self) -> &str {
        "version"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        match tree.payload::<Saml1Assertion>(target)?.version {
            Some(SamlVersion::V10 | SamlVersion::V11) => Ok(ValidationResult::Valid),
            Some(other) => Ok(ctx.fail(
                ValidationResult::Invalid,
                format!("assertion version {} is not a SAML 1.x version", other),
            )),
            None => Ok(ctx.fail(ValidationResult::Invalid, "assertion has no version")),
        }
    }
}

/// Schema-level rule: `DoNotCacheCondition` is not part of SAML 1.0.
///
/// Conditions outside an assertion, or inside an assertion of unknown
/// version, are held to the 1.0 rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionsSpecValidator;

impl Validator for ConditionsSpecValidator {
    fn name(&self) -> &str {
        "conditions schema"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let Some(conditions) = conditions_of(tree, target)? else {
            return Ok(ValidationResult::Valid);
        };
        if governing_version(tree, conditions) == Some(SamlVersion::V11) {
            return Ok(ValidationResult::Valid);
        }
        for &condition in tree.payload::<Saml1Conditions>(conditions)?.conditions() {
            if tree.get(condition)?.tag() == ElementTag::DoNotCacheCondition {
                return Ok(ctx.fail(
                    ValidationResult::Invalid,
                    "SAML1.0 does not support DoNotCacheCondition",
                ));
            }
        }
        Ok(ValidationResult::Valid)
    }
}

/// Time window and audience restrictions of 1.x Conditions
#[derive(Debug, Default, Clone, Copy)]
pub struct Saml1ConditionsValidator;

impl Saml1ConditionsValidator {
    fn audience(
        tree: &XmlTree,
        restriction: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let Some(valid) = ctx.strings(keys::VALID_AUDIENCES).map(<[String]>::to_vec) else {
            return Ok(ctx.fail(
                ValidationResult::Indeterminate,
                "AudienceRestrictionCondition present but no valid audiences are configured",
            ));
        };
        for &audience in tree.payload::<AudienceRestrictionCondition>(restriction)?.audiences() {
            if let Some(uri) = &tree.payload::<Saml1Audience>(audience)?.uri {
                if valid.contains(uri) {
                    return Ok(ValidationResult::Valid);
                }
            }
        }
        Ok(ctx.fail(ValidationResult::Invalid, "no audience in AudienceRestrictionCondition is valid"))
    }
}

impl Validator for Saml1ConditionsValidator {
    fn name(&self) -> &str {
        "conditions"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let Some(conditions_id) = conditions_of(tree, target)? else {
            return Ok(ValidationResult::Valid);
        };
        let conditions = tree.payload::<Saml1Conditions>(conditions_id)?;
        let window = ctx.check_window("Conditions", conditions.not_before, conditions.not_on_or_after);
        if window != ValidationResult::Valid {
            return Ok(window);
        }
        for &condition in conditions.conditions() {
            let result = match tree.get(condition)?.tag() {
                ElementTag::AudienceRestrictionCondition => Self::audience(tree, condition, ctx)?,
                ElementTag::DoNotCacheCondition => ValidationResult::Valid,
                _ => ctx.fail(ValidationResult::Indeterminate, "unknown condition"),
            };
            if result != ValidationResult::Valid {
                return Ok(result);
            }
        }
        Ok(ValidationResult::Valid)
    }
}

/// `Decision` and `Resource` are required
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthorizationDecisionStatementValidator;

impl Validator for AuthorizationDecisionStatementValidator {
    fn name(&self) -> &str {
        "authorization decision statement"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let statement = tree.payload::<AuthorizationDecisionStatement>(target)?;
        if statement.decision.is_none() {
            return Ok(ctx.fail(ValidationResult::Invalid, "Decision attribute is required"));
        }
        match statement.resource.as_deref() {
            Some(resource) if !resource.is_empty() => Ok(ValidationResult::Valid),
            _ => Ok(ctx.fail(ValidationResult::Invalid, "Resource attribute is required")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::saml1::{DecisionType, DoNotCacheCondition};
    use crate::validation::ParameterValue;
    use chrono::{Duration, Utc};

    fn assertion_with_do_not_cache(version: SamlVersion) -> (XmlTree, ObjectId, ObjectId) {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Saml1Assertion::new("_a1", version));
        let conditions = tree.add(Saml1Conditions::default());
        let do_not_cache = tree.add(DoNotCacheCondition);
        tree.attach(conditions, do_not_cache).unwrap();
        tree.attach(assertion, conditions).unwrap();
        (tree, assertion, conditions)
    }

    #[test]
    fn test_do_not_cache_rejected_in_saml10() {
        let (tree, assertion, conditions) = assertion_with_do_not_cache(SamlVersion::V10);
        let mut ctx = ValidationContext::new();
        assert_eq!(
            ConditionsSpecValidator.validate(&tree, conditions, &mut ctx).unwrap(),
            ValidationResult::Invalid
        );
        assert_eq!(ctx.failure_message(), Some("SAML1.0 does not support DoNotCacheCondition"));
        let mut ctx = ValidationContext::new();
        assert_eq!(
            ConditionsSpecValidator.validate(&tree, assertion, &mut ctx).unwrap(),
            ValidationResult::Invalid
        );
    }

    #[test]
    fn test_do_not_cache_allowed_in_saml11() {
        let (tree, _, conditions) = assertion_with_do_not_cache(SamlVersion::V11);
        let mut ctx = ValidationContext::new();
        assert_eq!(
            ConditionsSpecValidator.validate(&tree, conditions, &mut ctx).unwrap(),
            ValidationResult::Valid
        );
    }

    #[test]
    fn test_detached_conditions_follow_saml10_rules() {
        let mut tree = XmlTree::new();
        let conditions = tree.add(Saml1Conditions::default());
        let do_not_cache = tree.add(DoNotCacheCondition);
        tree.attach(conditions, do_not_cache).unwrap();
        let mut ctx = ValidationContext::new();
        assert_eq!(
            ConditionsSpecValidator.validate(&tree, conditions, &mut ctx).unwrap(),
            ValidationResult::Invalid
        );
    }

    #[test]
    fn test_conditions_window_and_audience() {
        let mut tree = XmlTree::new();
        let assertion = tree.add(Saml1Assertion::new("_a2", SamlVersion::V11));
        let now = Utc::now();
        let conditions = tree.add(Saml1Conditions {
            not_before: Some(now - Duration::minutes(1)),
            not_on_or_after: Some(now + Duration::minutes(10)),
            ..Saml1Conditions::default()
        });
        let restriction = tree.add(AudienceRestrictionCondition::default());
        let audience = tree.add(Saml1Audience::new("urn:sp"));
        tree.attach(restriction, audience).unwrap();
        tree.attach(conditions, restriction).unwrap();
        tree.attach(assertion, conditions).unwrap();

        let mut ctx = ValidationContext::new()
            .with_param(keys::NOW, ParameterValue::Instant(now))
            .with_strings(keys::VALID_AUDIENCES, ["urn:sp"]);
        assert_eq!(
            Saml1ConditionsValidator.validate(&tree, assertion, &mut ctx).unwrap(),
            ValidationResult::Valid
        );

        let mut later = ValidationContext::new()
            .with_param(keys::NOW, ParameterValue::Instant(now + Duration::hours(1)))
            .with_strings(keys::VALID_AUDIENCES, ["urn:sp"]);
        assert_eq!(
            Saml1ConditionsValidator.validate(&tree, assertion, &mut later).unwrap(),
            ValidationResult::Invalid
        );
    }

    #[test]
    fn test_authorization_decision_requires_resource() {
        let mut tree = XmlTree::new();
        let statement = tree.add(AuthorizationDecisionStatement {
            decision: Some(DecisionType::Permit),
            ..AuthorizationDecisionStatement::default()
        });
        let mut ctx = ValidationContext::new();
        assert_eq!(
            AuthorizationDecisionStatementValidator
                .validate(&tree, statement, &mut ctx)
                .unwrap(),
            ValidationResult::Invalid
        );
        assert_eq!(ctx.failure_message(), Some("Resource attribute is required"));
    }
}
