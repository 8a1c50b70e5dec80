//! XML signature integration tests
//!
//! Sign in memory, serialize, parse the bytes back and verify against the
//! parsed DOM, as a relying party would.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rsa::RsaPrivateKey;
use samlkit::dom::parser::ParserPool;
use samlkit::error::SignatureError;
use samlkit::namespaces::ns;
use samlkit::saml::saml2::{Assertion, Issuer, Response};
use samlkit::validation::{ValidationContext, ValidationResult, Validator};
use samlkit::xml::{marshall_to_string, unmarshall_from_bytes, ObjectId, ProviderRegistry, XmlTree};
use samlkit::xmlsec::{
    marshall_and_sign, C14nMethod, ContentReference, Credential, DigestAlgorithm, HashFunction, KeyInfo,
    rsa_public_key, KeyInfoGenerator, KeyName, Signature, SignatureAlgorithm, SignatureProfileValidator,
    SignatureValidator,
};

const ISSUER: &str = "https://idp.example.org/shibboleth";

fn build_signed(signature: Signature, credential: &Credential) -> String {
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = tree.add(
        Assertion::new("_d71a3a8e9fcc45c9e9d248ef7049393fc8f04e5f75")
            .with_issue_instant(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
    );
    let issuer = tree.add(Issuer::new(ISSUER));
    tree.attach(assertion, issuer).unwrap();
    let signature = tree.add(signature.with_reference(ContentReference::enveloped(assertion)));
    tree.attach(assertion, signature).unwrap();

    marshall_and_sign(&mut tree, &registry, signature, credential).unwrap();
    marshall_to_string(&mut tree, &registry, assertion).unwrap()
}

fn parse(xml: &str) -> (XmlTree, ObjectId) {
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let mut tree = XmlTree::new();
    let root = unmarshall_from_bytes(&mut tree, &registry, &pool, xml.as_bytes()).unwrap();
    (tree, root)
}

fn verify(xml: &str, credential: Credential) -> Result<(), SignatureError> {
    let (tree, assertion) = parse(xml);
    let signature = tree.signature_of(assertion).unwrap();
    SignatureProfileValidator.check(&tree, signature)?;
    SignatureValidator::new(credential).verify(&tree, signature)
}

#[test]
fn test_rsa_signature_verifies_after_parse() {
    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
    let public = key.to_public_key();
    let xml = build_signed(
        Signature::new(SignatureAlgorithm::Rsa(HashFunction::Sha256)),
        &Credential::rsa_private(key),
    );
    assert!(xml.contains("SignatureValue"));

    verify(&xml, Credential::rsa_public(public)).unwrap();

    let other = RsaPrivateKey::new(&mut rng, 1024).unwrap();
    let err = verify(&xml, Credential::rsa_public(other.to_public_key())).unwrap_err();
    assert!(matches!(err, SignatureError::SignatureInvalid(_) | SignatureError::Crypto(_)));
}

#[test]
fn test_hmac_algorithms_and_digests() {
    for hash in [HashFunction::Sha1, HashFunction::Sha256, HashFunction::Sha384, HashFunction::Sha512] {
        let credential = Credential::hmac(b"correct horse battery staple".to_vec());
        let mut signature = Signature::new(SignatureAlgorithm::Hmac(hash));
        signature.canonicalization = C14nMethod::Inclusive;
        let registry = ProviderRegistry::with_defaults();
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::new("h1"));
        let signature = tree.add(
            signature.with_reference(ContentReference::enveloped(assertion).with_digest(DigestAlgorithm(hash))),
        );
        tree.attach(assertion, signature).unwrap();
        marshall_and_sign(&mut tree, &registry, signature, &credential).unwrap();
        let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();

        verify(&xml, credential).unwrap();
    }
}

#[test]
fn test_tampered_issuer_fails_digest() {
    let credential = Credential::hmac(b"secret".to_vec());
    let xml = build_signed(Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256)), &credential);
    let tampered = xml.replace(ISSUER, "https://evil.example.org/shibboleth");
    assert_ne!(tampered, xml);

    let err = verify(&tampered, credential.clone()).unwrap_err();
    assert!(matches!(err, SignatureError::DigestMismatch(_)));

    let (tree, assertion) = parse(&tampered);
    let mut ctx = ValidationContext::new();
    let result = SignatureValidator::new(credential).validate(&tree, assertion, &mut ctx).unwrap();
    assert_eq!(result, ValidationResult::Invalid);
}

#[test]
fn test_rsa_key_value_verifies_with_published_key() {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let credential = Credential::rsa_private(key.clone()).with_key_name("idp-rsa");
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = tree.add(Assertion::new("_kv1"));
    let signature = tree.add(
        Signature::new(SignatureAlgorithm::Rsa(HashFunction::Sha256))
            .with_reference(ContentReference::enveloped(assertion)),
    );
    let key_info = KeyInfoGenerator::default().generate(&mut tree, &credential).unwrap().unwrap();
    tree.attach(signature, key_info).unwrap();
    tree.attach(assertion, signature).unwrap();
    marshall_and_sign(&mut tree, &registry, signature, &credential).unwrap();
    let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();
    assert!(xml.contains("<ds:KeyName>idp-rsa</ds:KeyName>"));
    assert!(xml.contains("ds:RSAKeyValue"));

    let (parsed, copy) = parse(&xml);
    let signature = parsed.signature_of(copy).unwrap();
    let key_info = parsed.payload::<Signature>(signature).unwrap().key_info().unwrap();
    let published = rsa_public_key(&parsed, key_info).unwrap().unwrap();
    assert_eq!(published, key.to_public_key());
    verify(&xml, Credential::rsa_public(published)).unwrap();
}

#[test]
fn test_key_info_round_trips() {
    let credential = Credential::hmac(b"secret".to_vec()).with_key_name("idp-2024");
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = tree.add(Assertion::new("k1"));
    let signature = tree.add(
        Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256))
            .with_reference(ContentReference::enveloped(assertion)),
    );
    let key_info = tree.add(KeyInfo::default());
    let key_name = tree.add(KeyName::new("idp-2024"));
    tree.attach(key_info, key_name).unwrap();
    tree.attach(signature, key_info).unwrap();
    tree.attach(assertion, signature).unwrap();
    marshall_and_sign(&mut tree, &registry, signature, &credential).unwrap();
    let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();

    let (parsed, copy) = parse(&xml);
    let signature = parsed.signature_of(copy).unwrap();
    let key_info = parsed.payload::<Signature>(signature).unwrap().key_info().unwrap();
    let names: Vec<_> = parsed
        .payload::<KeyInfo>(key_info)
        .unwrap()
        .children()
        .iter()
        .map(|&c| parsed.payload::<KeyName>(c).unwrap().value.clone())
        .collect();
    assert_eq!(names, vec![Some("idp-2024".to_string())]);
    SignatureValidator::new(credential).verify(&parsed, signature).unwrap();
}

#[test]
fn test_resigning_after_mutation() {
    let credential = Credential::hmac(b"secret".to_vec());
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = tree.add(Assertion::new("m1"));
    let issuer = tree.add(Issuer::new(ISSUER));
    tree.attach(assertion, issuer).unwrap();
    let signature = tree.add(
        Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256))
            .with_reference(ContentReference::enveloped(assertion)),
    );
    tree.attach(assertion, signature).unwrap();
    marshall_and_sign(&mut tree, &registry, signature, &credential).unwrap();

    tree.modify::<Issuer, _>(issuer, |i| i.value = Some("https://idp2.example.org".to_string()))
        .unwrap();
    assert!(tree.dom(assertion).is_none());

    marshall_and_sign(&mut tree, &registry, signature, &credential).unwrap();
    let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();
    assert!(xml.contains("https://idp2.example.org"));
    verify(&xml, credential).unwrap();
}

#[test]
fn test_resigning_after_id_change() {
    let credential = Credential::hmac(b"secret".to_vec());
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = tree.add(Assertion::new("m1"));
    let signature = tree.add(
        Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256))
            .with_reference(ContentReference::enveloped(assertion)),
    );
    tree.attach(assertion, signature).unwrap();
    marshall_and_sign(&mut tree, &registry, signature, &credential).unwrap();

    tree.set_xml_id(assertion, Some("m2".to_string())).unwrap();
    assert!(tree.dom(signature).is_none());

    marshall_and_sign(&mut tree, &registry, signature, &credential).unwrap();
    let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();
    assert!(xml.contains(r##"URI="#m2""##));
    assert!(!xml.contains(r##"URI="#m1""##));
    verify(&xml, credential).unwrap();
}

#[test]
fn test_resigning_parsed_assertion_after_id_change() {
    let credential = Credential::hmac(b"secret".to_vec());
    let signed = build_signed(Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256)), &credential);
    let registry = ProviderRegistry::with_defaults();
    let (mut tree, assertion) = parse(&signed);
    let signature = tree.signature_of(assertion).unwrap();

    tree.set_xml_id(assertion, Some("_renamed".to_string())).unwrap();
    marshall_and_sign(&mut tree, &registry, signature, &credential).unwrap();
    let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();
    assert!(xml.contains(r##"URI="#_renamed""##));
    verify(&xml, credential).unwrap();
}

#[test]
fn test_wrapped_duplicate_id_is_rejected_by_profile() {
    let credential = Credential::hmac(b"secret".to_vec());
    let signed = build_signed(Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256)), &credential);
    let evil = format!(
        r#"<saml:Assertion xmlns:saml="{}" ID="_d71a3a8e9fcc45c9e9d248ef7049393fc8f04e5f75" Version="2.0" IssueInstant="2024-05-01T12:00:00Z"><saml:Issuer>https://evil.example.org</saml:Issuer></saml:Assertion>"#,
        ns::SAML2
    );
    let wrapped = format!(
        r#"<samlp:Response xmlns:samlp="{}" ID="r1" Version="2.0" IssueInstant="2024-05-01T12:00:00Z">{}{}</samlp:Response>"#,
        ns::SAML2P,
        evil,
        signed
    );

    let (tree, response) = parse(&wrapped);
    let assertions = tree.payload::<Response>(response).unwrap().assertions().to_vec();
    assert_eq!(assertions.len(), 2);

    // the injected assertion carries no signature at all
    let mut ctx = ValidationContext::new();
    assert_eq!(
        SignatureProfileValidator.validate(&tree, assertions[0], &mut ctx).unwrap(),
        ValidationResult::Invalid
    );

    // the genuine signature no longer resolves to a unique element
    let signature = tree.signature_of(assertions[1]).unwrap();
    let err = SignatureProfileValidator.check(&tree, signature).unwrap_err();
    assert!(matches!(err, SignatureError::Reference(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_issuer_change_breaks_signature(index in 0usize..ISSUER.len()) {
        let credential = Credential::hmac(b"secret".to_vec());
        let xml = build_signed(Signature::new(SignatureAlgorithm::Hmac(HashFunction::Sha256)), &credential);

        let mut changed = ISSUER.as_bytes().to_vec();
        changed[index] = if changed[index] == b'x' { b'y' } else { b'x' };
        let changed = String::from_utf8(changed).unwrap();
        let tampered = xml.replace(ISSUER, &changed);

        prop_assert!(verify(&tampered, credential).is_err());
    }
}
