//! Validator chain integration tests

use chrono::{Duration, SecondsFormat, Utc};
use samlkit::dom::parser::ParserPool;
use samlkit::namespaces::ns;
use samlkit::saml::saml2::{
    confirmation_method, Assertion, Audience, AudienceRestriction, AuthnStatement, Conditions, Issuer,
    Subject, SubjectConfirmation, SubjectConfirmationData,
};
use samlkit::validation::saml2::standard_saml2_assertion_chain;
use samlkit::validation::{
    keys, ConditionsSpecValidator, ParameterValue, Saml1VersionValidator, Saml2VersionValidator,
    TimestampValidator, ValidationContext, ValidationResult, Validator, ValidatorChain,
};
use samlkit::xml::{marshall_to_string, unmarshall_from_bytes, ObjectId, ProviderRegistry, XmlTree};
use samlkit::xmlsec::{marshall_and_sign, ContentReference, Credential, HashFunction, Signature, SignatureAlgorithm};

const SP: &str = "https://sp.example.org";
const ACS: &str = "https://sp.example.org/Shibboleth.sso/SAML2/POST";

fn credential() -> Credential {
    Credential::hmac(b"federation secret".to_vec())
}

/// A signed, serialized bearer assertion issued now
fn signed_assertion_xml() -> String {
    let now = Utc::now();
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();

    let assertion = tree.add(Assertion::new("_3c39bc0fe7b13769cab2f6f45eba801b").with_issue_instant(now));
    let issuer = tree.add(Issuer::new("https://idp.example.org/shibboleth"));
    let subject = tree.add(Subject::default());
    let confirmation = tree.add(SubjectConfirmation::new(confirmation_method::BEARER));
    let data = tree.add(SubjectConfirmationData {
        not_on_or_after: Some(now + Duration::minutes(5)),
        recipient: Some(ACS.to_string()),
        ..SubjectConfirmationData::default()
    });
    let conditions = tree.add(Conditions::between(now - Duration::minutes(1), now + Duration::minutes(5)));
    let restriction = tree.add(AudienceRestriction::default());
    let audience = tree.add(Audience::new(SP));
    let authn = tree.add(AuthnStatement {
        authn_instant: Some(now - Duration::seconds(30)),
        session_index: Some("_session1".to_string()),
        ..AuthnStatement::default()
    });

    tree.attach(confirmation, data).unwrap();
    tree.attach(subject, confirmation).unwrap();
    tree.attach(restriction, audience).unwrap();
    tree.attach(conditions, restriction).unwrap();
    for child in [issuer, subject, conditions, authn] {
        tree.attach(assertion, child).unwrap();
    }
    let signature = tree.add(
        Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256))
            .with_reference(ContentReference::enveloped(assertion)),
    );
    tree.attach(assertion, signature).unwrap();

    marshall_and_sign(&mut tree, &registry, signature, &credential()).unwrap();
    marshall_to_string(&mut tree, &registry, assertion).unwrap()
}

fn parse(xml: &str) -> (XmlTree, ObjectId) {
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let mut tree = XmlTree::new();
    let root = unmarshall_from_bytes(&mut tree, &registry, &pool, xml.as_bytes()).unwrap();
    (tree, root)
}

fn sp_context() -> ValidationContext {
    ValidationContext::new()
        .with_strings(keys::VALID_AUDIENCES, [SP])
        .with_strings(keys::VALID_RECIPIENTS, [ACS])
        .with_strings(keys::VALID_ISSUERS, ["https://idp.example.org/shibboleth"])
}

#[test]
fn test_standard_chain_accepts_fresh_signed_assertion() {
    let (tree, assertion) = parse(&signed_assertion_xml());
    let chain = standard_saml2_assertion_chain(Some(credential()));
    assert_eq!(
        chain.names(),
        vec!["version", "issuer", "signature", "conditions", "subject confirmation", "authn statement"]
    );

    let mut ctx = sp_context();
    let result = chain.validate(&tree, assertion, &mut ctx).unwrap();
    assert_eq!(result, ValidationResult::Valid, "{:?}", ctx.failure_message());
    assert!(ctx.failure_message().is_none());
    assert!(matches!(
        ctx.dynamic_param(keys::CONFIRMED_SUBJECT_CONFIRMATION),
        Some(ParameterValue::Object(_))
    ));
}

#[test]
fn test_standard_chain_rejects_expired_assertion() {
    let (tree, assertion) = parse(&signed_assertion_xml());
    let chain = standard_saml2_assertion_chain(Some(credential()));
    let mut ctx = sp_context().with_param(keys::NOW, ParameterValue::Instant(Utc::now() + Duration::hours(1)));

    let result = chain.validate(&tree, assertion, &mut ctx).unwrap();
    assert_eq!(result, ValidationResult::Invalid);
    let message = ctx.failure_message().unwrap();
    assert!(message.contains("Conditions has expired"), "{}", message);
    assert!(ctx.dynamic_param(keys::CONFIRMED_SUBJECT_CONFIRMATION).is_none());
}

#[test]
fn test_standard_chain_fails_closed_on_tampering() {
    let xml = signed_assertion_xml().replace("_session1", "_session2");
    let (tree, assertion) = parse(&xml);
    let chain = standard_saml2_assertion_chain(Some(credential()));
    let mut ctx = sp_context();

    let result = chain.validate(&tree, assertion, &mut ctx).unwrap();
    assert_eq!(result, ValidationResult::Invalid);
    assert!(ctx.failure_message().unwrap().contains("signature"));
}

#[test]
fn test_standard_chain_without_credential_is_indeterminate() {
    let (tree, assertion) = parse(&signed_assertion_xml());
    let mut ctx = sp_context();
    let result = standard_saml2_assertion_chain(None).validate(&tree, assertion, &mut ctx).unwrap();
    assert_eq!(result, ValidationResult::Indeterminate);
}

#[test]
fn test_wrong_audience_is_rejected() {
    let (tree, assertion) = parse(&signed_assertion_xml());
    let mut ctx = ValidationContext::new()
        .with_strings(keys::VALID_AUDIENCES, ["https://other-sp.example.org"])
        .with_strings(keys::VALID_RECIPIENTS, [ACS]);
    let result = standard_saml2_assertion_chain(Some(credential()))
        .validate(&tree, assertion, &mut ctx)
        .unwrap();
    assert_eq!(result, ValidationResult::Invalid);
    assert!(ctx.failure_message().unwrap().contains("audience"));
}

fn saml1_conditions_xml(minor: u32) -> String {
    let instant = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    format!(
        r#"<saml:Assertion xmlns:saml="{}" MajorVersion="1" MinorVersion="{}" AssertionID="_a1" Issuer="urn:idp" IssueInstant="{}"><saml:Conditions><saml:DoNotCacheCondition/></saml:Conditions></saml:Assertion>"#,
        ns::SAML1,
        minor,
        instant
    )
}

#[test]
fn test_do_not_cache_is_gated_on_saml11() {
    let chain = ValidatorChain::new()
        .with(Saml1VersionValidator)
        .with(ConditionsSpecValidator);

    let (tree, assertion) = parse(&saml1_conditions_xml(0));
    let mut ctx = ValidationContext::new();
    assert_eq!(chain.validate(&tree, assertion, &mut ctx).unwrap(), ValidationResult::Invalid);
    assert_eq!(ctx.failure_message(), Some("SAML1.0 does not support DoNotCacheCondition"));

    let (tree, assertion) = parse(&saml1_conditions_xml(1));
    let mut ctx = ValidationContext::new();
    assert_eq!(chain.validate(&tree, assertion, &mut ctx).unwrap(), ValidationResult::Valid);
}

#[test]
fn test_unsupported_saml1_major_version_fails_unmarshalling() {
    let xml = saml1_conditions_xml(1).replace(r#"MajorVersion="1""#, r#"MajorVersion="2""#);
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let mut tree = XmlTree::new();
    assert!(unmarshall_from_bytes(&mut tree, &registry, &pool, xml.as_bytes()).is_err());
}

#[test]
fn test_uninterpretable_target_raises_instead_of_rejecting() {
    let (tree, assertion) = parse(&saml1_conditions_xml(1));
    let mut ctx = ValidationContext::new();
    assert!(Saml2VersionValidator.validate(&tree, assertion, &mut ctx).is_err());
    assert!(ctx.failure_message().is_none());
}

#[test]
fn test_parsed_timestamp_freshness() {
    let now = Utc::now();
    let xml = format!(
        r#"<wsu:Timestamp xmlns:wsu="{}" wsu:Id="ts-1"><wsu:Created>{}</wsu:Created><wsu:Expires>{}</wsu:Expires></wsu:Timestamp>"#,
        ns::WSU,
        (now - Duration::seconds(5)).to_rfc3339_opts(SecondsFormat::Secs, true),
        (now + Duration::minutes(5)).to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let (tree, timestamp) = parse(&xml);
    assert_eq!(tree.xml_id(timestamp), Some("ts-1"));

    let mut ctx = ValidationContext::new();
    assert_eq!(TimestampValidator.validate(&tree, timestamp, &mut ctx).unwrap(), ValidationResult::Valid);

    let mut later = ValidationContext::new().with_param(keys::NOW, ParameterValue::Instant(now + Duration::hours(1)));
    assert_eq!(TimestampValidator.validate(&tree, timestamp, &mut later).unwrap(), ValidationResult::Invalid);
}
