//! SAML 2.0 assertion and response validators

use super::{keys, ParameterValue, ValidationContext, ValidationResult, Validator, ValidatorChain};
use crate::error::ValidationError;
use crate::saml::saml2::{
    confirmation_method, status_code, Assertion, Audience, AudienceRestriction, AuthnStatement,
    Conditions, Issuer, Response, Status, StatusCode, StatusMessage, Subject, SubjectConfirmation,
    SubjectConfirmationData,
};
use crate::saml::SamlVersion;
use crate::xml::kind::ElementTag;
use crate::xml::tree::{ObjectId, XmlTree};
use crate::xmlsec::credential::Credential;
use crate::xmlsec::profile::SignatureProfileValidator;
use crate::xmlsec::validator::SignatureValidator;
use std::fmt;
use tracing::{debug, trace};

/// Assertion `Version` must be 2.0
#[derive(Debug, Default, Clone, Copy)]
pub struct Saml2VersionValidator;

impl Validator for Saml2VersionValidator {
    fn name(&self) -> &str {
        "version"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let assertion = tree.payload::<Assertion>(target)?;
        match assertion.version {
            Some(SamlVersion::V20) => Ok(ValidationResult::Valid),
            Some(other) => Ok(ctx.fail(
                ValidationResult::Invalid,
                format!("assertion version {} is not 2.0", other),
            )),
            None => Ok(ctx.fail(ValidationResult::Invalid, "assertion has no Version")),
        }
    }
}

/// An Issuer must be present and, when trusted issuers are configured,
/// be one of them
#[derive(Debug, Default, Clone, Copy)]
pub struct IssuerValidator;

impl Validator for IssuerValidator {
    fn name(&self) -> &str {
        "issuer"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let Some(issuer) = tree.payload::<Assertion>(target)?.issuer() else {
            return Ok(ctx.fail(ValidationResult::Invalid, "assertion has no Issuer"));
        };
        let Some(value) = tree.payload::<Issuer>(issuer)?.value.clone() else {
            return Ok(ctx.fail(ValidationResult::Invalid, "Issuer is empty"));
        };
        let trusted = ctx
            .strings(keys::VALID_ISSUERS)
            .map_or(true, |valid| valid.contains(&value));
        if trusted {
            Ok(ValidationResult::Valid)
        } else {
            Ok(ctx.fail(
                ValidationResult::Invalid,
                format!("issuer '{}' is not trusted", value),
            ))
        }
    }
}

/// Signature step: profile check then cryptographic verification.
///
/// An unsigned assertion passes only when [`keys::SIGNATURE_REQUIRED`] is
/// explicitly false. A signed assertion without a trusted credential is
/// indeterminate.
#[derive(Debug, Clone, Default)]
pub struct SignatureStepValidator {
    credential: Option<Credential>,
}

impl SignatureStepValidator {
    /// Verify with `credential`, if any
    pub fn new(credential: Option<Credential>) -> Self {
        Self { credential }
    }
}

impl Validator for SignatureStepValidator {
    fn name(&self) -> &str {
        "signature"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        if tree.signature_of(target).is_none() {
            let required = ctx.flag(keys::SIGNATURE_REQUIRED).unwrap_or(true);
            return Ok(if required {
                ctx.fail(ValidationResult::Invalid, "assertion is not signed but a signature is required")
            } else {
                ValidationResult::Valid
            });
        }
        let Some(credential) = &self.credential else {
            return Ok(ctx.fail(
                ValidationResult::Indeterminate,
                "assertion is signed but no trusted credential is available",
            ));
        };
        let profile = SignatureProfileValidator.validate(tree, target, ctx)?;
        if profile != ValidationResult::Valid {
            return Ok(profile);
        }
        SignatureValidator::new(credential.clone()).validate(tree, target, ctx)
    }
}

/// Validates one kind of condition
pub trait ConditionValidator: Send + Sync + fmt::Debug {
    /// The condition element handled
    fn handles(&self) -> ElementTag;

    /// Validate the condition object
    fn validate(
        &self,
        tree: &XmlTree,
        condition: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError>;
}

/// The assertion must name one of the configured audiences
#[derive(Debug, Default, Clone, Copy)]
pub struct AudienceRestrictionValidator;

impl ConditionValidator for AudienceRestrictionValidator {
    fn handles(&self) -> ElementTag {
        ElementTag::AudienceRestriction
    }

    fn validate(
        &self,
        tree: &XmlTree,
        condition: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let Some(valid) = ctx.strings(keys::VALID_AUDIENCES).map(<[String]>::to_vec) else {
            return Ok(ctx.fail(
                ValidationResult::Indeterminate,
                "AudienceRestriction present but no valid audiences are configured",
            ));
        };
        let restriction = tree.payload::<AudienceRestriction>(condition)?;
        let mut named = Vec::new();
        for &audience in restriction.audiences() {
            if let Some(uri) = &tree.payload::<Audience>(audience)?.uri {
                named.push(uri.clone());
            }
        }
        if named.iter().any(|a| valid.contains(a)) {
            Ok(ValidationResult::Valid)
        } else {
            Ok(ctx.fail(
                ValidationResult::Invalid,
                format!("none of the audiences {:?} is a valid audience", named),
            ))
        }
    }
}

/// Records the presence of `OneTimeUse`; replay detection belongs to the caller
#[derive(Debug, Default, Clone, Copy)]
pub struct OneTimeUseValidator;

impl ConditionValidator for OneTimeUseValidator {
    fn handles(&self) -> ElementTag {
        ElementTag::OneTimeUse
    }

    fn validate(
        &self,
        _tree: &XmlTree,
        _condition: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        ctx.set_dynamic(keys::ONE_TIME_USE, ParameterValue::Flag(true));
        Ok(ValidationResult::Valid)
    }
}

/// Time bounds of `Conditions` plus each contained condition
#[derive(Debug)]
pub struct ConditionsValidator {
    conditions: Vec<Box<dyn ConditionValidator>>,
}

impl Default for ConditionsValidator {
    fn default() -> Self {
        Self::new(vec![
            Box::new(AudienceRestrictionValidator),
            Box::new(OneTimeUseValidator),
        ])
    }
}

impl ConditionsValidator {
    /// Use the given condition validators
    pub fn new(conditions: Vec<Box<dyn ConditionValidator>>) -> Self {
        Self { conditions }
    }
}

impl Validator for ConditionsValidator {
    fn name(&self) -> &str {
        "conditions"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let Some(conditions_id) = tree.payload::<Assertion>(target)?.conditions() else {
            return Ok(ValidationResult::Valid);
        };
        let conditions = tree.payload::<Conditions>(conditions_id)?;
        let window = ctx.check_window("Conditions", conditions.not_before, conditions.not_on_or_after);
        if window != ValidationResult::Valid {
            return Ok(window);
        }

        for &condition in conditions.conditions() {
            let tag = tree.get(condition)?.tag();
            let Some(validator) = self.conditions.iter().find(|v| v.handles() == tag) else {
                let name = tree.get(condition)?.element_name().to_string();
                return Ok(ctx.fail(
                    ValidationResult::Indeterminate,
                    format!("unknown condition {}", name),
                ));
            };
            let result = validator.validate(tree, condition, ctx)?;
            if result != ValidationResult::Valid {
                return Ok(result);
            }
            trace!(condition = ?tag, "condition satisfied");
        }
        Ok(ValidationResult::Valid)
    }
}

/// Confirms one SubjectConfirmation method
pub trait SubjectConfirmationMethodValidator: Send + Sync + fmt::Debug {
    /// Method URI handled
    fn method(&self) -> &str;

    /// Validate the SubjectConfirmation object
    fn validate(
        &self,
        tree: &XmlTree,
        confirmation: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError>;
}

fn check_membership(
    ctx: &mut ValidationContext,
    key: &str,
    what: &str,
    value: &Option<String>,
) -> ValidationResult {
    let Some(value) = value else {
        return ValidationResult::Valid;
    };
    match ctx.strings(key).map(|valid| valid.contains(value)) {
        Some(true) => ValidationResult::Valid,
        Some(false) => ctx.fail(ValidationResult::Invalid, format!("{} '{}' is not acceptable", what, value)),
        None => ctx.fail(
            ValidationResult::Indeterminate,
            format!("{} '{}' present but no valid values are configured", what, value),
        ),
    }
}

/// Bearer confirmation: SubjectConfirmationData with a NotOnOrAfter, within
/// its window, addressed to a configured recipient
#[derive(Debug, Default, Clone, Copy)]
pub struct BearerConfirmationValidator;

impl SubjectConfirmationMethodValidator for BearerConfirmationValidator {
    fn method(&self) -> &str {
        confirmation_method::BEARER
    }

    fn validate(
        &self,
        tree: &XmlTree,
        confirmation: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let Some(data_id) = tree.payload::<SubjectConfirmation>(confirmation)?.data() else {
            return Ok(ctx.fail(
                ValidationResult::Invalid,
                "bearer SubjectConfirmation has no SubjectConfirmationData",
            ));
        };
        let data = tree.payload::<SubjectConfirmationData>(data_id)?;
        if data.not_on_or_after.is_none() {
            return Ok(ctx.fail(
                ValidationResult::Invalid,
                "bearer SubjectConfirmationData has no NotOnOrAfter",
            ));
        }
        let checks = [
            ctx.check_window("SubjectConfirmationData", data.not_before, data.not_on_or_after),
            check_membership(ctx, keys::VALID_RECIPIENTS, "Recipient", &data.recipient),
            check_membership(ctx, keys::VALID_ADDRESSES, "Address", &data.address),
            check_membership(ctx, keys::VALID_IN_RESPONSE_TO, "InResponseTo", &data.in_response_to),
        ];
        Ok(checks
            .into_iter()
            .find(|r| *r != ValidationResult::Valid)
            .unwrap_or(ValidationResult::Valid))
    }
}

/// Sender-vouches: the attesting entity is trusted by the transport layer
#[derive(Debug, Default, Clone, Copy)]
pub struct SenderVouchesConfirmationValidator;

impl SubjectConfirmationMethodValidator for SenderVouchesConfirmationValidator {
    fn method(&self) -> &str {
        confirmation_method::SENDER_VOUCHES
    }

    fn validate(
        &self,
        _tree: &XmlTree,
        _confirmation: ObjectId,
        _ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        Ok(ValidationResult::Valid)
    }
}

/// Subject confirmation: the first confirmation that validates is recorded
/// under [`keys::CONFIRMED_SUBJECT_CONFIRMATION`]
#[derive(Debug)]
pub struct SubjectConfirmationValidator {
    methods: Vec<Box<dyn SubjectConfirmationMethodValidator>>,
}

impl Default for SubjectConfirmationValidator {
    fn default() -> Self {
        Self::new(vec![
            Box::new(BearerConfirmationValidator),
            Box::new(SenderVouchesConfirmationValidator),
        ])
    }
}

impl SubjectConfirmationValidator {
    /// Use the given method validators
    pub fn new(methods: Vec<Box<dyn SubjectConfirmationMethodValidator>>) -> Self {
        Self { methods }
    }
}

impl Validator for SubjectConfirmationValidator {
    fn name(&self) -> &str {
        "subject confirmation"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let Some(subject) = tree.payload::<Assertion>(target)?.subject() else {
            return Ok(ctx.fail(ValidationResult::Invalid, "assertion has no Subject"));
        };
        let confirmations = tree.payload::<Subject>(subject)?.confirmations().to_vec();
        let mut outcomes = Vec::new();
        for confirmation in confirmations {
            let method = tree
                .payload::<SubjectConfirmation>(confirmation)?
                .method
                .clone()
                .unwrap_or_default();
            let Some(validator) = self.methods.iter().find(|m| m.method() == method) else {
                trace!(method = %method, "no validator for confirmation method");
                outcomes.push(ValidationResult::Indeterminate);
                continue;
            };
            // each attempt runs against a scratch context so a failed
            // confirmation does not claim the failure message
            let mut attempt = ctx.clone();
            let result = validator.validate(tree, confirmation, &mut attempt)?;
            if result == ValidationResult::Valid {
                ctx.set_dynamic(keys::CONFIRMED_SUBJECT_CONFIRMATION, ParameterValue::Object(confirmation));
                debug!(method = %method, "subject confirmed");
                return Ok(ValidationResult::Valid);
            }
            outcomes.push(result);
        }
        if !outcomes.is_empty() && outcomes.iter().all(|r| *r == ValidationResult::Indeterminate) {
            return Ok(ctx.fail(
                ValidationResult::Indeterminate,
                "no SubjectConfirmation could be evaluated",
            ));
        }
        Ok(ctx.fail(ValidationResult::Invalid, "no SubjectConfirmation was confirmed"))
    }
}

/// AuthnInstant not in the future, session not expired
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthnStatementValidator;

impl Validator for AuthnStatementValidator {
    fn name(&self) -> &str {
        "authn statement"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        for &statement in tree.payload::<Assertion>(target)?.statements() {
            if tree.get(statement)?.tag() != ElementTag::AuthnStatement {
                continue;
            }
            let authn = tree.payload::<AuthnStatement>(statement)?;
            let Some(instant) = authn.authn_instant else {
                return Ok(ctx.fail(ValidationResult::Invalid, "AuthnStatement has no AuthnInstant"));
            };
            if instant > ctx.now() + ctx.clock_skew() {
                return Ok(ctx.fail(ValidationResult::Invalid, "AuthnInstant is in the future"));
            }
            let window = ctx.check_window("authentication session", None, authn.session_not_on_or_after);
            if window != ValidationResult::Valid {
                return Ok(window);
            }
        }
        Ok(ValidationResult::Valid)
    }
}

/// Response version, status, InResponseTo and Destination
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseValidator;

impl Validator for ResponseValidator {
    fn name(&self) -> &str {
        "response"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let response = tree.payload::<Response>(target)?;
        if response.version != Some(SamlVersion::V20) {
            return Ok(ctx.fail(ValidationResult::Invalid, "response version is not 2.0"));
        }

        let Some(status) = response.status() else {
            return Ok(ctx.fail(ValidationResult::Invalid, "response has no Status"));
        };
        let status = tree.payload::<Status>(status)?;
        let code = match status.code() {
            Some(code) => tree.payload::<StatusCode>(code)?.value.clone(),
            None => None,
        };
        if code.as_deref() != Some(status_code::SUCCESS) {
            let message = match status.message() {
                Some(message) => tree.payload::<StatusMessage>(message)?.message.clone(),
                None => None,
            };
            return Ok(ctx.fail(
                ValidationResult::Invalid,
                format!(
                    "response status is {}{}",
                    code.as_deref().unwrap_or("missing"),
                    message.map(|m| format!(": {}", m)).unwrap_or_default()
                ),
            ));
        }

        let checks = [
            check_membership(ctx, keys::VALID_IN_RESPONSE_TO, "InResponseTo", &response.in_response_to),
            check_membership(ctx, keys::VALID_DESTINATIONS, "Destination", &response.destination),
        ];
        Ok(checks
            .into_iter()
            .find(|r| *r != ValidationResult::Valid)
            .unwrap_or(ValidationResult::Valid))
    }
}

/// version → issuer → signature → conditions → subject confirmation →
/// authn statements
pub fn standard_saml2_assertion_chain(credential: Option<Credential>) -> ValidatorChain {
    ValidatorChain::new()
        .with(Saml2VersionValidator)
        .with(IssuerValidator)
        .with(SignatureStepValidator::new(credential))
        .with(ConditionsValidator::default())
        .with(SubjectConfirmationValidator::default())
        .with(AuthnStatementValidator)
}
