//! WS-Security validators

use super::{ValidationContext, ValidationResult, Validator};
use crate::error::ValidationError;
use crate::saml::wssecurity::{Created, Expires, Timestamp};
use crate::xml::tree::{ObjectId, XmlTree};

/// `wsu:Timestamp` freshness: Created not in the future, Expires not passed
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampValidator;

impl Validator for TimestampValidator {
    fn name(&self) -> &str {
        "timestamp"
    }

    fn validate(
        &self,
        tree: &XmlTree,
        target: ObjectId,
        ctx: &mut ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let timestamp = tree.payload::<Timestamp>(target)?;
        let created = match timestamp.created() {
            Some(id) => tree.payload::<Created>(id)?.value,
            None => None,
        };
        let expires = match timestamp.expires() {
            Some(id) => tree.payload::<Expires>(id)?.value,
            None => None,
        };
        if let (Some(created), Some(expires)) = (created, expires) {
            if expires < created {
                return Ok(ctx.fail(ValidationResult::Invalid, "Timestamp expires before it was created"));
            }
        }
        Ok(ctx.check_window("Timestamp", created, expires))
    }
}
