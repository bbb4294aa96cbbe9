use std::rc::Rc;

use cmis_atompub::AtomPubSession;
use cmis_core::transport::mock::MockTransport;
use cmis_core::{
    creation_properties, Action, BindingKind, ContentStream, ErrorKind, HttpResponse,
    HttpTransport, Method, NavigationService, ObjectService, RepositoryService, Session,
    SessionParameters,
};
use pretty_assertions::assert_eq;

const SERVICE_URL: &str = "http://h/cmis/atom";

const SERVICE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<app:service xmlns:app="http://www.w3.org/2007/app" xmlns:atom="http://www.w3.org/2005/Atom"
        xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/"
        xmlns:cmisra="http://docs.oasis-open.org/ns/cmis/restatom/200908/">
    <app:workspace>
        <atom:title>Main</atom:title>
        <cmisra:repositoryInfo>
            <cmis:repositoryId>A1</cmis:repositoryId>
            <cmis:repositoryName>Main</cmis:repositoryName>
            <cmis:rootFolderId>100</cmis:rootFolderId>
            <cmis:cmisVersionSupported>1.1</cmis:cmisVersionSupported>
        </cmisra:repositoryInfo>
        <app:collection href="http://h/cmis/atom/A1/types">
            <cmisra:collectionType>types</cmisra:collectionType>
        </app:collection>
        <cmisra:uritemplate>
            <cmisra:template>http://h/cmis/atom/A1/id?id={id}&amp;includeAllowableActions={includeAllowableActions}</cmisra:template>
            <cmisra:type>objectbyid</cmisra:type>
        </cmisra:uritemplate>
        <cmisra:uritemplate>
            <cmisra:template>http://h/cmis/atom/A1/path?path={path}</cmisra:template>
            <cmisra:type>objectbypath</cmisra:type>
        </cmisra:uritemplate>
        <cmisra:uritemplate>
            <cmisra:template>http://h/cmis/atom/A1/type?id={id}</cmisra:template>
            <cmisra:type>typebyid</cmisra:type>
        </cmisra:uritemplate>
    </app:workspace>
    <app:workspace>
        <cmisra:repositoryInfo><cmis:repositoryId>B2</cmis:repositoryId></cmisra:repositoryInfo>
    </app:workspace>
</app:service>"#;

fn folder_type() -> String {
    r#"<atom:entry xmlns:atom="http://www.w3.org/2005/Atom"
        xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/"
        xmlns:cmisra="http://docs.oasis-open.org/ns/cmis/restatom/200908/">
    <atom:link rel="down" type="application/atom+xml;type=feed" href="http://h/cmis/atom/A1/typechildren?id=cmis:folder"/>
    <cmisra:type>
        <cmis:id>cmis:folder</cmis:id>
        <cmis:baseId>cmis:folder</cmis:baseId>
        <cmis:displayName>Folder</cmis:displayName>
        <cmis:creatable>true</cmis:creatable>
        <cmis:propertyStringDefinition>
            <cmis:id>cmis:path</cmis:id>
            <cmis:displayName>Path</cmis:displayName>
            <cmis:propertyType>string</cmis:propertyType>
        </cmis:propertyStringDefinition>
    </cmisra:type>
</atom:entry>"#
        .to_string()
}

fn document_type() -> String {
    r#"<atom:entry xmlns:atom="http://www.w3.org/2005/Atom"
        xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/"
        xmlns:cmisra="http://docs.oasis-open.org/ns/cmis/restatom/200908/">
    <cmisra:type>
        <cmis:id>cmis:document</cmis:id>
        <cmis:baseId>cmis:document</cmis:baseId>
        <cmis:propertyIntegerDefinition>
            <cmis:id>cmis:contentStreamLength</cmis:id>
            <cmis:displayName>Length</cmis:displayName>
            <cmis:propertyType>integer</cmis:propertyType>
        </cmis:propertyIntegerDefinition>
    </cmisra:type>
</atom:entry>"#
        .to_string()
}

fn entry(id: &str, type_id: &str, name: &str, extra_links: &str) -> String {
    format!(
        r#"<atom:entry xmlns:atom="http://www.w3.org/2005/Atom"
        xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/"
        xmlns:cmisra="http://docs.oasis-open.org/ns/cmis/restatom/200908/">
    <atom:title>{name}</atom:title>
    <atom:link rel="self" href="http://h/cmis/atom/A1/entry?id={id}"/>
    <atom:link rel="edit" href="http://h/cmis/atom/A1/entry?id={id}"/>
    {extra_links}
    <cmisra:object>
        <cmis:allowableActions><cmis:canGetChildren>true</cmis:canGetChildren></cmis:allowableActions>
        <cmis:properties>
            <cmis:propertyId propertyDefinitionId="cmis:objectId"><cmis:value>{id}</cmis:value></cmis:propertyId>
            <cmis:propertyId propertyDefinitionId="cmis:objectTypeId"><cmis:value>{type_id}</cmis:value></cmis:propertyId>
            <cmis:propertyId propertyDefinitionId="cmis:baseTypeId"><cmis:value>{type_id}</cmis:value></cmis:propertyId>
            <cmis:propertyString propertyDefinitionId="cmis:name"><cmis:value>{name}</cmis:value></cmis:propertyString>
        </cmis:properties>
    </cmisra:object>
</atom:entry>"#
    )
}

fn folder_entry(id: &str, name: &str) -> String {
    entry(
        id,
        "cmis:folder",
        name,
        &format!(
            r#"<atom:link rel="down" type="application/atom+xml;type=feed" href="http://h/cmis/atom/A1/children?id={id}"/>
            <atom:link rel="http://docs.oasis-open.org/ns/cmis/link/200908/foldertree" href="http://h/cmis/atom/A1/foldertree?id={id}"/>"#
        ),
    )
}

fn feed(entries: &[String], next: Option<&str>) -> String {
    let next = next
        .map(|n| format!(r#"<atom:link rel="next" href="{}"/>"#, n.replace('&', "&amp;")))
        .unwrap_or_default();
    let body: String = entries
        .iter()
        .map(|e| e.replace(r#"<?xml version="1.0" encoding="UTF-8"?>"#, ""))
        .collect();
    format!(
        r#"<atom:feed xmlns:atom="http://www.w3.org/2005/Atom"
        xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/"
        xmlns:cmisra="http://docs.oasis-open.org/ns/cmis/restatom/200908/">{next}{body}</atom:feed>"#
    )
}

fn params() -> SessionParameters {
    SessionParameters::new(SERVICE_URL).with_credentials("admin", "admin")
}

fn mock() -> Rc<MockTransport> {
    let mock = Rc::new(MockTransport::new());
    mock.require_basic("admin", "admin");
    mock
}

fn connect(mock: &Rc<MockTransport>) -> AtomPubSession {
    let transport: Rc<dyn HttpTransport> = mock.clone();
    AtomPubSession::connect(transport, &params()).unwrap().unwrap()
}

#[test]
fn test_connect_sends_one_request() {
    let mock = mock();
    mock.on(Method::Get, SERVICE_URL, HttpResponse::xml(SERVICE));

    let session = connect(&mock);
    assert_eq!(mock.request_count(), 1);
    assert_eq!(session.binding(), BindingKind::AtomPub);
    assert_eq!(session.repository().id(), "A1");
    assert_eq!(session.repository().root_id(), "100");
    assert_eq!(session.repositories().unwrap().len(), 2);
}

#[test]
fn test_wrong_credentials_are_permission_denied() {
    let mock = mock();
    mock.on(Method::Get, SERVICE_URL, HttpResponse::xml(SERVICE));
    let transport: Rc<dyn HttpTransport> = mock.clone();

    let params = SessionParameters::new(SERVICE_URL).with_credentials("admin", "wrong");
    let err = AtomPubSession::connect(transport, &params).err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::PermissionDenied));
}

#[test]
fn test_non_cmis_content_is_not_a_session() {
    let mock = mock();
    mock.on(
        Method::Get,
        SERVICE_URL,
        HttpResponse::new(200, "<html><body>It works!</body></html>"),
    );
    let transport: Rc<dyn HttpTransport> = mock.clone();

    assert!(AtomPubSession::connect(transport, &params()).unwrap().is_none());
}

#[test]
fn test_unknown_repository_is_not_a_session() {
    let mock = mock();
    mock.on(Method::Get, SERVICE_URL, HttpResponse::xml(SERVICE));
    let transport: Rc<dyn HttpTransport> = mock.clone();

    let params = params().with_repository("nope");
    assert!(AtomPubSession::connect(transport, &params).unwrap().is_none());
}

#[test]
fn test_get_object_resolves_type() {
    let mock = mock();
    mock.on(Method::Get, "/A1/id?id=100", HttpResponse::xml(folder_entry("100", "Root")))
        .on(Method::Get, "/A1/type?id=cmis%3Afolder", HttpResponse::xml(folder_type()))
        .on(Method::Get, SERVICE_URL, HttpResponse::xml(SERVICE));
    let session = connect(&mock);

    let root = session.root_folder().unwrap();
    assert_eq!(root.id(), "100");
    assert_eq!(root.name(), "Root");
    assert!(root.is_root(&session));
    assert!(root
        .allowable_actions()
        .unwrap()
        .is_allowed(Action::GetChildren));

    let ty = root.object_type(&session).unwrap();
    assert_eq!(ty.display_name(), "Folder");
    assert_eq!(ty.property_type("cmis:path").unwrap().display_name(), "Path");

    // the type is cached for the session
    let before = mock.request_count();
    session.get_object("100").unwrap();
    assert_eq!(mock.request_count(), before + 1);
}

#[test]
fn test_children_follow_next_links() {
    let mock = mock();
    let page1 = feed(
        &[entry("d1", "cmis:document", "a.txt", "")],
        Some("http://h/cmis/atom/A1/children?id=100&skip=1"),
    );
    let page2 = feed(&[entry("d2", "cmis:document", "b.txt", "")], None);
    mock.on(Method::Get, "/A1/children?id=100&skip=1", HttpResponse::xml(page2))
        .on(Method::Get, "/A1/children?id=100", HttpResponse::xml(page1))
        .on(Method::Get, "/A1/id?id=100", HttpResponse::xml(folder_entry("100", "Root")))
        .on(Method::Get, "/A1/type?id=cmis%3Afolder", HttpResponse::xml(folder_type()))
        .on(Method::Get, "/A1/type?id=cmis%3Adocument", HttpResponse::xml(document_type()))
        .on(Method::Get, SERVICE_URL, HttpResponse::xml(SERVICE));
    let session = connect(&mock);

    let root = session.root_folder().unwrap();
    let names: Vec<String> = root
        .children(&session)
        .unwrap()
        .iter()
        .map(|o| o.name().to_string())
        .collect();
    assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
}

#[test]
fn test_create_document_posts_entry() {
    let mock = mock();
    mock.on(
        Method::Post,
        "/A1/children?id=100",
        HttpResponse::new(201, entry("d9", "cmis:document", "note.txt", r#"<atom:content src="http://h/cmis/atom/A1/content?id=d9"/>"#))
            .with_header("Content-Type", "application/atom+xml;type=entry"),
    )
    .on(
        Method::Get,
        "/A1/content?id=d9",
        HttpResponse::new(200, "hello")
            .with_header("Content-Type", "text/plain")
            .with_header("Content-Disposition", "attachment; filename=\"note.txt\""),
    )
    .on(Method::Get, "/A1/id?id=100", HttpResponse::xml(folder_entry("100", "Root")))
    .on(Method::Get, "/A1/type?id=cmis%3Afolder", HttpResponse::xml(folder_type()))
    .on(Method::Get, "/A1/type?id=cmis%3Adocument", HttpResponse::xml(document_type()))
    .on(Method::Get, SERVICE_URL, HttpResponse::xml(SERVICE));
    let session = connect(&mock);

    let root = session.root_folder().unwrap();
    let content = ContentStream::new("text/plain", b"hello".to_vec());
    let doc = root
        .create_document(&session, &creation_properties("cmis:document", "note.txt"), Some(&content))
        .unwrap();
    assert_eq!(doc.id(), "d9");

    let post = mock
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Post)
        .unwrap();
    assert_eq!(post.header("content-type"), Some("application/atom+xml;type=entry"));
    let body = post.body_text();
    assert!(body.contains("<cmisra:base64>aGVsbG8=</cmisra:base64>"));
    assert!(body.contains(r#"propertyDefinitionId="cmis:objectTypeId""#));

    let stream = doc.content_stream(&session).unwrap();
    assert_eq!(stream.data, b"hello".to_vec());
    assert_eq!(stream.mime_type, "text/plain");
    assert_eq!(stream.filename.as_deref(), Some("note.txt"));
}

#[test]
fn test_delete_uses_entry_links() {
    let mock = mock();
    mock.on(Method::Delete, "/A1/entry?id=d1", HttpResponse::new(204, ""))
        .on(Method::Delete, "/A1/foldertree?id=100", HttpResponse::new(204, ""))
        .on(Method::Get, "/A1/id?id=d1", HttpResponse::xml(entry("d1", "cmis:document", "a.txt", "")))
        .on(Method::Get, "/A1/id?id=100", HttpResponse::xml(folder_entry("100", "Root")))
        .on(Method::Get, "/A1/type?id=", HttpResponse::new(404, "no types here"))
        .on(Method::Get, SERVICE_URL, HttpResponse::xml(SERVICE));
    let session = connect(&mock);

    session.delete_object("d1", true).unwrap();
    let delete = mock.last_request().unwrap();
    assert_eq!(delete.method, Method::Delete);
    assert!(delete.url.ends_with("entry?id=d1&allVersions=true"));

    let failed = session.delete_tree("100", false, true).unwrap();
    assert!(failed.is_empty());
    let delete = mock.last_request().unwrap();
    assert!(delete.url.contains("foldertree?id=100&allVersions=false&continueOnFailure=true"));
}

#[test]
fn test_missing_object_is_not_found() {
    let mock = mock();
    mock.on(Method::Get, "/A1/path?", HttpResponse::new(404, "not found"))
        .on(Method::Get, SERVICE_URL, HttpResponse::xml(SERVICE));
    let session = connect(&mock);

    let err = session.get_object_by_path("/missing").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ObjectNotFound));
    assert!(mock.last_request().unwrap().url.ends_with("path?path=%2Fmissing"));
}
