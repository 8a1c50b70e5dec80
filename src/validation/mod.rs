//! Assertion and message validation
//!
//! A [`ValidatorChain`] runs [`Validator`]s in caller-supplied order against
//! one object of an [`XmlTree`] and stops at the first result that is not
//! [`ValidationResult::Valid`]. Validators are stateless; everything a run
//! needs or produces lives in the per-call [`ValidationContext`].
//!
//! Returning `Invalid` means the data failed a policy check. Returning an
//! `Err` means the data could not be interpreted at all.

pub mod saml1;
pub mod saml2;
pub mod wssecurity;

use crate::error::ValidationError;
use crate::xml::tree::{ObjectId, XmlTree};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Outcome of a validation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationResult {
    /// The check passed
    Valid,
    /// The check failed
    Invalid,
    /// Not enough information to decide
    Indeterminate,
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::Invalid => write!(f, "INVALID"),
            Self::Indeterminate => write!(f, "INDETERMINATE"),
        }
    }
}

/// Parameter keys understood by the built-in validators
pub mod keys {
    /// Allowed clock skew ([`super::ParameterValue::Duration`])
    pub const CLOCK_SKEW: &str = "samlkit.ClockSkew";
    /// Evaluation instant overriding the system clock ([`super::ParameterValue::Instant`])
    pub const NOW: &str = "samlkit.Now";
    /// Audiences this relying party answers to
    pub const VALID_AUDIENCES: &str = "samlkit.ValidAudiences";
    /// Acceptable SubjectConfirmationData Recipient values
    pub const VALID_RECIPIENTS: &str = "samlkit.ValidRecipients";
    /// Acceptable presenter addresses
    pub const VALID_ADDRESSES: &str = "samlkit.ValidAddresses";
    /// Acceptable InResponseTo values
    pub const VALID_IN_RESPONSE_TO: &str = "samlkit.ValidInResponseTo";
    /// Trusted issuer entity IDs
    pub const VALID_ISSUERS: &str = "samlkit.ValidIssuers";
    /// Acceptable Response Destination values
    pub const VALID_DESTINATIONS: &str = "samlkit.ValidDestinations";
    /// Whether an unsigned object is rejected ([`super::ParameterValue::Flag`], default true)
    pub const SIGNATURE_REQUIRED: &str = "samlkit.SignatureRequired";

    /// Dynamic: the SubjectConfirmation that was confirmed
    pub const CONFIRMED_SUBJECT_CONFIRMATION: &str = "samlkit.ConfirmedSubjectConfirmation";
    /// Dynamic: a OneTimeUse condition was present
    pub const ONE_TIME_USE: &str = "samlkit.OneTimeUse";
}

/// A context parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// Boolean switch
    Flag(bool),
    /// Time span
    Duration(Duration),
    /// Point in time
    Instant(DateTime<Utc>),
    /// Set of strings
    Strings(Vec<String>),
    /// An object of the tree under validation
    Object(ObjectId),
}

/// Per-call validation state
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    static_params: HashMap<String, ParameterValue>,
    dynamic_params: HashMap<String, ParameterValue>,
    failure_message: Option<String>,
}

impl ValidationContext {
    /// Default clock skew
    pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 300;

    /// An empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a static parameter
    pub fn with_param(mut self, key: impl Into<String>, value: ParameterValue) -> Self {
        self.static_params.insert(key.into(), value);
        self
    }

    /// Add a string-set parameter
    pub fn with_strings<I, S>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_param(key, ParameterValue::Strings(values.into_iter().map(Into::into).collect()))
    }

    /// Static parameter
    pub fn static_param(&self, key: &str) -> Option<&ParameterValue> {
        self.static_params.get(key)
    }

    /// Dynamic parameter written by an earlier validator
    pub fn dynamic_param(&self, key: &str) -> Option<&ParameterValue> {
        self.dynamic_params.get(key)
    }

    /// Record a dynamic parameter
    pub fn set_dynamic(&mut self, key: impl Into<String>, value: ParameterValue) {
        self.dynamic_params.insert(key.into(), value);
    }

    /// String-set static parameter
    pub fn strings(&self, key: &str) -> Option<&[String]> {
        match self.static_params.get(key) {
            Some(ParameterValue::Strings(values)) => Some(values),
            _ => None,
        }
    }

    /// Boolean static parameter
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.static_params.get(key) {
            Some(ParameterValue::Flag(value)) => Some(*value),
            _ => None,
        }
    }

    /// Allowed clock skew
    pub fn clock_skew(&self) -> Duration {
        match self.static_params.get(keys::CLOCK_SKEW) {
            Some(ParameterValue::Duration(skew)) => *skew,
            _ => Duration::seconds(Self::DEFAULT_CLOCK_SKEW_SECONDS),
        }
    }

    /// The evaluation instant
    pub fn now(&self) -> DateTime<Utc> {
        match self.static_params.get(keys::NOW) {
            Some(ParameterValue::Instant(now)) => *now,
            _ => Utc::now(),
        }
    }

    /// The first failure message recorded in this run
    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    /// Record a failure message; later messages are ignored
    pub fn set_failure_message(&mut self, message: impl Into<String>) {
        if self.failure_message.is_none() {
            self.failure_message = Some(message.into());
        }
    }

    /// Record `message` and return `result`
    pub fn fail(&mut self, result: ValidationResult, message: impl Into<String>) -> ValidationResult {
        self.set_failure_message(message);
        result
    }

    /// Check an instant window against the evaluation instant, allowing
    /// for clock skew. `what` names the checked element in the message.
    pub fn check_window(
        &mut self,
        what: &str,
        not_before: Option<DateTime<Utc>>,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> ValidationResult {
        let now = self.now();
        let skew = self.clock_skew();
        if let Some(not_before) = not_before {
            if now + skew < not_before {
                return self.fail(
                    ValidationResult::Invalid,
                    format!("{} is not yet valid (NotBefore {})", what, not_before.to_rfc3339()),
                );
            }
        }
        if let Some(not_on_or_after) = not_on_or_after {
            if now - skew >= not_on_or_after {
                return self.fail(
                    ValidationResult::Invalid,
                    format!("{} has expired (NotOnOrAfter {})", what, not_on_or_after.to_rfc3339()),
                );
            }
        }
        ValidationResult::Valid
    }
}

/// One validation step
pub trait Validator: Send + Sync + fmt::Debug {
    /// Name used in default failure messages
    fn name(&self) -> &str;

    /// Validate `target`
    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError>;
}

/// Ordered, short-circuiting sequence of validators
#[derive(Debug, Default)]
pub struct ValidatorChain {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorChain {
    /// An empty chain (always valid)
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator
    pub fn push(&mut self, validator: impl Validator + 'static) {
        self.validators.push(Box::new(validator));
    }

    /// Builder form of [`ValidatorChain::push`]
    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.push(validator);
        self
    }

    /// Names of the validators in order
    pub fn names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Run the chain
    pub fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        for validator in &self.validators {
            let result = validator.validate(tree, target, ctx)?;
            if result != ValidationResult::Valid {
                ctx.set_failure_message(format!("{} validation returned {}", validator.name(), result));
                warn!(
                    validator = validator.name(),
                    %result,
                    message = ctx.failure_message().unwrap_or_default(),
                    "validation failed"
                );
                return Ok(result);
            }
            debug!(validator = validator.name(), "validation step passed");
        }
        Ok(ValidationResult::Valid)
    }
}

pub use saml1::{
    AuthorizationDecisionStatementValidator, ConditionsSpecValidator, Saml1ConditionsValidator,
    Saml1VersionValidator,
};
pub use saml2::{
    standard_saml2_assertion_chain, AudienceRestrictionValidator, AuthnStatementValidator,
    BearerConfirmationValidator, ConditionValidator, ConditionsValidator, IssuerValidator,
    OneTimeUseValidator, ResponseValidator, Saml2VersionValidator, SignatureStepValidator,
    SubjectConfirmationMethodValidator, SubjectConfirmationValidator,
};
pub use wssecurity::TimestampValidator;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::saml2::Assertion;

    #[derive(Debug)]
    struct Fixed(&'static str, ValidationResult, Option<&'static str>);

    impl Validator for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn validate(
            &self,
            _tree: &XmlTree,
            _target: ObjectId,
            ctx: &mut ValidationContext,
        ) -> Result<ValidationResult, ValidationError> {
            if let Some(message) = self.2 {
                ctx.set_failure_message(message);
            }
            ctx.set_dynamic(self.0, ParameterValue::Flag(true));
            Ok(self.1)
        }
    }

    #[test]
    fn test_chain_stops_at_first_failure() {
        let mut tree = XmlTree::new();
        let target = tree.add(Assertion::new("a"));
        let chain = ValidatorChain::new()
            .with(Fixed("first", ValidationResult::Valid, None))
            .with(Fixed("second", ValidationResult::Invalid, Some("second said no")))
            .with(Fixed("third", ValidationResult::Invalid, Some("third said no")));
        let mut ctx = ValidationContext::new();

        assert_eq!(chain.validate(&tree, target, &mut ctx).unwrap(), ValidationResult::Invalid);
        assert_eq!(ctx.failure_message(), Some("second said no"));
        assert!(ctx.dynamic_param("first").is_some());
        assert!(ctx.dynamic_param("third").is_none());
    }

    #[test]
    fn test_chain_supplies_default_message() {
        let mut tree = XmlTree::new();
        let target = tree.add(Assertion::new("a"));
        let chain = ValidatorChain::new().with(Fixed("quiet", ValidationResult::Indeterminate, None));
        let mut ctx = ValidationContext::new();
        assert_eq!(chain.validate(&tree, target, &mut ctx).unwrap(), ValidationResult::Indeterminate);
        assert_eq!(ctx.failure_message(), Some("quiet validation returned INDETERMINATE"));
    }

    #[test]
    fn test_window_honours_skew() {
        let now = Utc::now();
        let mut ctx = ValidationContext::new()
            .with_param(keys::NOW, ParameterValue::Instant(now))
            .with_param(keys::CLOCK_SKEW, ParameterValue::Duration(Duration::seconds(60)));
        let soon = now + Duration::seconds(30);
        assert_eq!(ctx.check_window("x", Some(soon), None), ValidationResult::Valid);
        assert_eq!(ctx.check_window("x", None, Some(now - Duration::seconds(30))), ValidationResult::Valid);
        assert_eq!(
            ctx.check_window("Conditions", None, Some(now - Duration::seconds(60))),
            ValidationResult::Invalid
        );
        assert!(ctx.failure_message().unwrap().contains("Conditions has expired"));
    }
}
