//! Marshalling engine integration tests
//!
//! Object tree to DOM and back, DOM cache reuse and invalidation, fragment
//! re-parenting and cloning.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use samlkit::dom::parser::ParserPool;
use samlkit::dom::{new_document, DomElement};
use samlkit::error::Error;
use samlkit::namespaces::{ns, QName};
use samlkit::saml::saml2::{
    confirmation_method, Assertion, Audience, AudienceRestriction, Conditions, Issuer, NameId, Subject,
    SubjectConfirmation,
};
use samlkit::saml::saml1::{Saml1Assertion, Saml1Response, Saml1Status, Saml1StatusCode};
use samlkit::saml::SamlVersion;
use samlkit::xml::{
    clone_object, marshall, marshall_into_parent, marshall_to_string, unmarshall_from_bytes,
    CloneOutputOption, ObjectId, ProviderRegistry, XmlTree,
};

fn sample_assertion(tree: &mut XmlTree) -> ObjectId {
    let assertion = tree.add(
        Assertion::new("_a75adf55-01d7-40cc-929f-dbd8372ebdfc")
            .with_issue_instant(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
    );
    let issuer = tree.add(Issuer::new("https://idp.example.org/shibboleth"));
    let subject = tree.add(Subject::default());
    let name_id = tree.add(NameId::new("jdoe").with_format("urn:oasis:names:tc:SAML:2.0:nameid-format:transient"));
    let confirmation = tree.add(SubjectConfirmation::new(confirmation_method::BEARER));
    let conditions = tree.add(Conditions::between(
        Utc.with_ymd_and_hms(2024, 5, 1, 11, 55, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap(),
    ));
    let restriction = tree.add(AudienceRestriction::default());
    let audience = tree.add(Audience::new("https://sp.example.org"));

    tree.attach(subject, name_id).unwrap();
    tree.attach(subject, confirmation).unwrap();
    tree.attach(restriction, audience).unwrap();
    tree.attach(conditions, restriction).unwrap();
    tree.attach(assertion, issuer).unwrap();
    tree.attach(assertion, subject).unwrap();
    tree.attach(assertion, conditions).unwrap();
    assertion
}

#[test]
fn test_firefly_id_is_flagged_and_invalidated() {
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = tree.add(Assertion::new("Firefly"));

    let element = marshall(&mut tree, &registry, assertion).unwrap();
    assert_eq!(element.attribute(&QName::local("ID")).as_deref(), Some("Firefly"));
    assert!(element.is_id_attribute(&QName::local("ID")));
    assert!(tree.dom(assertion).is_some());

    tree.set_xml_id(assertion, Some("Other".to_string())).unwrap();
    assert!(tree.dom(assertion).is_none());

    let element = marshall(&mut tree, &registry, assertion).unwrap();
    assert_eq!(element.attribute(&QName::local("ID")).as_deref(), Some("Other"));
}

#[test]
fn test_marshall_twice_returns_same_node() {
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = sample_assertion(&mut tree);

    let first = marshall(&mut tree, &registry, assertion).unwrap();
    let second = marshall(&mut tree, &registry, assertion).unwrap();
    assert!(first.is_same_node(&second));
}

#[test]
fn test_deep_mutation_invalidates_every_ancestor() {
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = sample_assertion(&mut tree);
    marshall(&mut tree, &registry, assertion).unwrap();

    let conditions = tree.payload::<Assertion>(assertion).unwrap().conditions().unwrap();
    let restriction = tree.children(conditions)[0];
    let audience = tree.children(restriction)[0];
    let issuer = tree.payload::<Assertion>(assertion).unwrap().issuer().unwrap();
    for id in [assertion, conditions, restriction, audience, issuer] {
        assert!(tree.dom(id).is_some());
    }

    tree.modify::<Audience, _>(audience, |a| a.uri = Some("https://other.example.org".to_string()))
        .unwrap();
    for id in [assertion, conditions, restriction, audience] {
        assert!(tree.dom(id).is_none(), "{} kept a stale DOM", id);
    }
    // siblings outside the mutated path keep their cache
    assert!(tree.dom(issuer).is_some());

    let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();
    assert!(xml.contains("https://other.example.org"));
    assert!(!xml.contains("https://sp.example.org"));
}

#[test]
fn test_adding_child_invalidates_parent() {
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = tree.add(Assertion::new("a1"));
    marshall(&mut tree, &registry, assertion).unwrap();

    let issuer = tree.add(Issuer::new("urn:idp"));
    tree.attach(assertion, issuer).unwrap();
    assert!(tree.dom(assertion).is_none());
}

#[test]
fn test_fragment_moved_to_new_parent_keeps_its_cache() {
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = sample_assertion(&mut tree);
    marshall(&mut tree, &registry, assertion).unwrap();
    let issuer = tree.payload::<Assertion>(assertion).unwrap().issuer().unwrap();

    let doc = new_document();
    let holder = doc.borrow_mut().create_element(QName::local("Holder"));
    doc.borrow_mut().set_document_element(holder).unwrap();
    let parent = DomElement::new(doc.clone(), holder);

    let moved = marshall_into_parent(&mut tree, &registry, issuer, &parent).unwrap();
    assert!(tree.dom(assertion).is_none());
    let cached = tree.dom(issuer).unwrap();
    assert!(cached.is_same_node(&moved));
    assert_eq!(cached.text_content(), "https://idp.example.org/shibboleth");
    assert_eq!(cached.parent_element().map(|p| p.node()), Some(holder));
}

#[test]
fn test_round_trip_through_bytes() {
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let mut tree = XmlTree::new();
    let assertion = sample_assertion(&mut tree);
    let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();

    let mut parsed = XmlTree::new();
    let copy = unmarshall_from_bytes(&mut parsed, &registry, &pool, xml.as_bytes()).unwrap();
    assert!(parsed.dom(copy).is_some());

    let original = tree.payload::<Assertion>(assertion).unwrap();
    let restored = parsed.payload::<Assertion>(copy).unwrap();
    assert_eq!(restored.id, original.id);
    assert_eq!(restored.version, Some(SamlVersion::V20));
    assert_eq!(restored.issue_instant, original.issue_instant);

    let issuer = parsed.payload::<Issuer>(restored.issuer().unwrap()).unwrap();
    assert_eq!(issuer, &Issuer::new("https://idp.example.org/shibboleth"));

    let subject = parsed.payload::<Subject>(restored.subject().unwrap()).unwrap();
    let name_id = parsed.payload::<NameId>(subject.name_id().unwrap()).unwrap();
    assert_eq!(name_id.value.as_deref(), Some("jdoe"));
    assert_eq!(subject.confirmations().len(), 1);

    // a second marshall of the unmarshalled tree reuses the parsed DOM
    let reserialized = marshall_to_string(&mut parsed, &registry, copy).unwrap();
    assert_eq!(reserialized, xml);
}

#[test]
fn test_clone_drops_dom_but_keeps_content() {
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = sample_assertion(&mut tree);
    let original_xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();

    let copy = clone_object(&mut tree, &registry, assertion, CloneOutputOption::DropDom).unwrap();
    assert_ne!(copy, assertion);
    assert!(tree.dom(copy).is_none());
    assert!(tree.descendants(copy).iter().all(|&id| tree.dom(id).is_none()));
    assert!(tree.parent(copy).is_none());
    assert!(tree.dom(assertion).is_some());

    let copy_xml = marshall_to_string(&mut tree, &registry, copy).unwrap();
    assert_eq!(copy_xml, original_xml);
}

#[test]
fn test_clone_into_new_document_root() {
    let registry = ProviderRegistry::with_defaults();
    let mut tree = XmlTree::new();
    let assertion = sample_assertion(&mut tree);

    let copy = clone_object(&mut tree, &registry, assertion, CloneOutputOption::RootDomInNewDocument).unwrap();
    let element = tree.dom(copy).unwrap();
    assert!(element.is_document_element());
    assert!(!element.same_document(tree.dom(assertion).unwrap().document()));
}

fn saml1_response(major: &str) -> String {
    format!(
        r#"<samlp:Response xmlns:samlp="{}" xmlns:saml="{}" MajorVersion="{}" MinorVersion="1" ResponseID="_r1" InResponseTo="_q1" IssueInstant="2024-05-01T12:00:00Z" Recipient="https://sp.example.org/acs"><samlp:Status><samlp:StatusCode Value="samlp:Success"/></samlp:Status><saml:Assertion MajorVersion="1" MinorVersion="1" AssertionID="_a1" Issuer="https://idp.example.org" IssueInstant="2024-05-01T12:00:00Z"/></samlp:Response>"#,
        ns::SAML1P,
        ns::SAML1,
        major
    )
}

#[test]
fn test_saml1_response_round_trip() {
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let xml = saml1_response("1");
    let mut tree = XmlTree::new();
    let response = unmarshall_from_bytes(&mut tree, &registry, &pool, xml.as_bytes()).unwrap();

    let payload = tree.payload::<Saml1Response>(response).unwrap();
    assert_eq!(payload.version, Some(SamlVersion::V11));
    assert_eq!(payload.in_response_to.as_deref(), Some("_q1"));
    assert_eq!(payload.recipient.as_deref(), Some("https://sp.example.org/acs"));
    assert_eq!(payload.issue_instant, Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
    assert_eq!(tree.xml_id(response), Some("_r1"));

    let status = tree.payload::<Saml1Status>(payload.status().unwrap()).unwrap();
    let code = tree.payload::<Saml1StatusCode>(status.code().unwrap()).unwrap();
    assert_eq!(code.value.as_deref(), Some("samlp:Success"));

    assert_eq!(payload.assertions().len(), 1);
    let assertion = tree.payload::<Saml1Assertion>(payload.assertions()[0]).unwrap();
    assert_eq!(assertion.id.as_deref(), Some("_a1"));

    let dom = tree.dom(response).unwrap();
    let doc = dom.document().borrow();
    assert_eq!(doc.elements_by_id(doc.root(), "_r1"), vec![dom.node()]);

    let mut built = XmlTree::new();
    let copy = built.add(Saml1Response::new("_r2", SamlVersion::V10));
    let out = marshall_to_string(&mut built, &registry, copy).unwrap();
    assert!(out.contains(r#"MajorVersion="1""#));
    assert!(out.contains(r#"MinorVersion="0""#));
    assert!(out.contains(r#"ResponseID="_r2""#));
}

#[test]
fn test_saml1_response_rejects_major_version() {
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let xml = saml1_response("2");
    let mut tree = XmlTree::new();
    let err = unmarshall_from_bytes(&mut tree, &registry, &pool, xml.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("major version 2"));
}

#[test]
fn test_unregistered_element_fails() {
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let mut tree = XmlTree::new();
    let err = unmarshall_from_bytes(
        &mut tree,
        &registry,
        &pool,
        br#"<foo:Unknown xmlns:foo="urn:example:unknown"/>"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("no unmarshaller registered"));
}

#[test]
fn test_malformed_attribute_fails_unmarshalling() {
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let input = format!(
        r#"<saml:Assertion xmlns:saml="{}" ID="a1" Version="two" IssueInstant="2024-05-01T12:00:00Z"/>"#,
        ns::SAML2
    );
    let mut tree = XmlTree::new();
    let err = unmarshall_from_bytes(&mut tree, &registry, &pool, input.as_bytes()).unwrap_err();
    assert!(err.has_source() || err.to_string().contains("Version"));
}

#[test]
fn test_unparsable_input_is_unmarshalling_error() {
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let mut tree = XmlTree::new();
    let err = unmarshall_from_bytes(&mut tree, &registry, &pool, b"<saml:Assertion").unwrap_err();
    assert!(err.has_source());
    let wrapped: Error = err.into();
    assert!(matches!(wrapped, Error::Unmarshalling(_)));
}

#[test]
fn test_doctype_is_rejected_by_default() {
    let registry = ProviderRegistry::with_defaults();
    let pool = ParserPool::new();
    let mut tree = XmlTree::new();
    let input = format!(
        r#"<!DOCTYPE lol [<!ENTITY lol "lol">]><saml:Issuer xmlns:saml="{}">&lol;</saml:Issuer>"#,
        ns::SAML2
    );
    assert!(unmarshall_from_bytes(&mut tree, &registry, &pool, input.as_bytes()).is_err());
}

proptest! {
    #[test]
    fn prop_issuer_and_id_survive_round_trip(
        id in "[A-Za-z_][A-Za-z0-9_.-]{0,16}",
        value in "[A-Za-z0-9:/._<>&]{1,32}",
    ) {
        let registry = ProviderRegistry::with_defaults();
        let pool = ParserPool::new();
        let mut tree = XmlTree::new();
        let assertion = tree.add(Assertion::new(id.clone()));
        let issuer = tree.add(Issuer::new(value.clone()));
        tree.attach(assertion, issuer).unwrap();
        let xml = marshall_to_string(&mut tree, &registry, assertion).unwrap();

        let mut parsed = XmlTree::new();
        let copy = unmarshall_from_bytes(&mut parsed, &registry, &pool, xml.as_bytes()).unwrap();
        let restored = parsed.payload::<Assertion>(copy).unwrap();
        prop_assert_eq!(restored.id.as_deref(), Some(id.as_str()));
        let restored_issuer = parsed.payload::<Issuer>(restored.issuer().unwrap()).unwrap();
        prop_assert_eq!(restored_issuer.value.as_deref(), Some(value.as_str()));
    }
}
