use std::rc::Rc;

use cmis_core::multipart::RelatedMultipart;
use cmis_core::transport::mock::MockTransport;
use cmis_core::{
    creation_properties, ids, Action, BindingKind, ContentStream, Credentials, ErrorKind,
    HttpResponse, HttpTransport, Method, NavigationService, OAuth2Data, ObjectService,
    RepositoryService, Session, SessionParameters,
};
use cmis_rest::{GdriveSession, OAuth2Handler, TokenSet};
use pretty_assertions::assert_eq;

const BASE: &str = "https://www.googleapis.com/drive/v3";

const ROOT: &str = r#"{"id":"root1","name":"My Drive","mimeType":"application/vnd.google-apps.folder",
    "capabilities":{"canAddChildren":true,"canListChildren":true}}"#;

const FOLDER: &str = r#"{"id":"f1","name":"Docs","mimeType":"application/vnd.google-apps.folder",
    "parents":["root1"],"createdTime":"2024-01-02T03:04:05.000Z",
    "capabilities":{"canAddChildren":true,"canListChildren":true,"canDelete":true}}"#;

const DOC: &str = r#"{"id":"d1","name":"a.txt","mimeType":"text/plain","parents":["f1"],
    "size":"12","version":"7","description":"notes",
    "thumbnailLink":"https://lh3.example.com/thumb/d1",
    "owners":[{"displayName":"Ann"}],"lastModifyingUser":{"displayName":"Bob"},
    "modifiedTime":"2024-02-03T04:05:06.000Z",
    "capabilities":{"canEdit":true,"canDownload":true,"canDelete":false}}"#;

const NATIVE: &str = r#"{"id":"g1","name":"Plan","mimeType":"application/vnd.google-apps.document",
    "parents":["f1"],"capabilities":{"canDownload":true}}"#;

fn drive(mock: &Rc<MockTransport>) -> GdriveSession {
    mock.on(Method::Get, "files/root?fields=id", HttpResponse::json(r#"{"id":"root1"}"#))
        .on(Method::Get, "files/root1?fields=", HttpResponse::json(ROOT))
        .on(Method::Get, "files/f1?fields=", HttpResponse::json(FOLDER))
        .on(Method::Get, "files/d1?fields=", HttpResponse::json(DOC))
        .on(Method::Get, "files/g1?fields=", HttpResponse::json(NATIVE));
    let transport: Rc<dyn HttpTransport> = mock.clone();
    let handler = OAuth2Handler::with_tokens(
        Rc::clone(&transport),
        OAuth2Data::default(),
        TokenSet::new("at1"),
    );
    GdriveSession::open(transport, BASE, handler).unwrap()
}

fn list(files: &[&str], next: Option<&str>) -> HttpResponse {
    let next = next.map_or(String::new(), |t| format!(r#","nextPageToken":"{t}""#));
    HttpResponse::json(format!(r#"{{"files":[{}]{next}}}"#, files.join(",")))
}

#[test]
fn test_open_reads_root_and_sends_bearer() {
    let mock = Rc::new(MockTransport::new());
    let session = drive(&mock);

    assert_eq!(session.binding(), BindingKind::GoogleDrive);
    let repo = session.repository();
    assert_eq!(repo.id(), "GoogleDrive");
    assert_eq!(repo.root_id(), "root1");

    let root = session.root_folder().unwrap();
    assert_eq!(root.name(), "My Drive");
    assert_eq!(root.path(), "/");
    assert!(root.is_root(&session));
    assert!(mock
        .requests()
        .iter()
        .all(|r| r.credentials == Some(Credentials::Bearer("at1".to_string()))));
}

#[test]
fn test_document_mapping() {
    let mock = Rc::new(MockTransport::new());
    let session = drive(&mock);

    let doc = session.get_document("d1").unwrap();
    assert_eq!(doc.name(), "a.txt");
    assert_eq!(doc.type_id(), "cmis:document");
    assert_eq!(doc.description(), "notes");
    assert_eq!(doc.created_by(), "Ann");
    assert_eq!(doc.last_modified_by(), "Bob");
    assert_eq!(doc.change_token(), Some("7"));
    assert_eq!(doc.content_stream_length(), Some(12));
    assert_eq!(doc.content_mime_type(), "text/plain");
    assert_eq!(doc.content_filename(), "a.txt");
    assert!(doc.last_modification_date().is_some());
    assert_eq!(doc.thumbnail_url(), Some("https://lh3.example.com/thumb/d1"));

    let actions = doc.allowable_actions().unwrap();
    assert!(actions.is_allowed(Action::GetContentStream));
    assert!(actions.is_allowed(Action::UpdateProperties));
    assert!(!actions.is_allowed(Action::DeleteObject));

    let folder = session.get_folder("f1").unwrap();
    assert_eq!(folder.parent_id(), Some("root1"));
    assert!(folder.creation_date().is_some());
    assert!(session.get_folder("d1").is_err());
}

#[test]
fn test_children_follow_page_tokens() {
    let mock = Rc::new(MockTransport::new());
    mock.on(Method::Get, "pageToken=p2", list(&[NATIVE], None)).on(
        Method::Get,
        "files?q=%27f1%27+in+parents+and+trashed",
        list(&[DOC], Some("p2")),
    );
    let session = drive(&mock);

    let children = session.get_children("f1").unwrap();
    let names: Vec<&str> = children.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["a.txt", "Plan"]);
    assert!(children.iter().all(|c| c.is_document()));
}

#[test]
fn test_object_by_path_walks_segments() {
    let mock = Rc::new(MockTransport::new());
    mock.on(
        Method::Get,
        "%27root1%27+in+parents+and+name+%3D+%27Docs%27",
        list(&[FOLDER], None),
    )
    .on(
        Method::Get,
        "%27f1%27+in+parents+and+name+%3D+%27a.txt%27",
        list(&[DOC], None),
    )
    .on(Method::Get, "name+%3D+%27missing%27", list(&[], None));
    let session = drive(&mock);

    assert_eq!(session.get_object_by_path("/Docs/a.txt").unwrap().id(), "d1");
    assert_eq!(session.get_object_by_path("/").unwrap().id(), "root1");
    let err = session.get_object_by_path("/Docs/missing").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ObjectNotFound));
}

#[test]
fn test_create_document_uploads_multipart() {
    let mock = Rc::new(MockTransport::new());
    mock.on(
        Method::Post,
        "upload/drive/v3/files?uploadType=multipart",
        HttpResponse::json(DOC),
    )
    .on(Method::Post, "drive/v3/files?fields=", HttpResponse::json(FOLDER));
    let session = drive(&mock);

    let content = ContentStream::new("text/plain", b"hello world!".to_vec());
    let doc = session
        .create_document("f1", &creation_properties("cmis:document", "a.txt"), Some(&content))
        .unwrap();
    assert_eq!(doc.id(), "d1");

    let upload = mock.last_request().unwrap();
    let ct = upload.header("content-type").unwrap().to_string();
    assert!(ct.starts_with("multipart/related"));
    let message = RelatedMultipart::parse(&ct, &upload.body).unwrap();
    let parts = message.parts();
    assert_eq!(parts.len(), 2);
    let meta: serde_json::Value = serde_json::from_slice(&parts[0].body).unwrap();
    assert_eq!(meta["name"], "a.txt");
    assert_eq!(meta["parents"], serde_json::json!(["f1"]));
    assert_eq!(parts[1].content_type, "text/plain");
    assert_eq!(parts[1].body, b"hello world!".to_vec());

    let folder = session
        .create_folder("root1", &creation_properties("cmis:folder", "Docs"))
        .unwrap();
    assert_eq!(folder.id(), "f1");
    let meta: serde_json::Value =
        serde_json::from_str(&mock.last_request().unwrap().body_text()).unwrap();
    assert_eq!(meta["mimeType"], "application/vnd.google-apps.folder");
    assert_eq!(meta["parents"], serde_json::json!(["root1"]));
}

#[test]
fn test_content_download_and_export() {
    let mock = Rc::new(MockTransport::new());
    mock.on(
        Method::Get,
        "files/d1?alt=media",
        HttpResponse::new(200, "hello world!").with_header("Content-Type", "text/plain"),
    )
    .on(
        Method::Get,
        "files/g1/export?mimeType=application%2Fpdf",
        HttpResponse::new(200, "%PDF-1.4"),
    );
    let session = drive(&mock);

    let content = session.get_content_stream("d1").unwrap();
    assert_eq!(content.mime_type, "text/plain");
    assert_eq!(content.filename.as_deref(), Some("a.txt"));
    assert_eq!(content.data, b"hello world!".to_vec());

    let pdf = session.get_content_stream("g1").unwrap();
    assert_eq!(pdf.mime_type, "application/pdf");
    assert_eq!(pdf.data, b"%PDF-1.4".to_vec());

    let err = session.get_content_stream("f1").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Constraint));
}

#[test]
fn test_update_and_delete() {
    let mock = Rc::new(MockTransport::new());
    mock.on(
        Method::Patch,
        "files/d1?fields=",
        HttpResponse::json(DOC.replace("\"a.txt\"", "\"b.txt\"")),
    )
    .on(Method::Delete, "files/f1", HttpResponse::new(204, ""));
    let session = drive(&mock);

    let mut props = creation_properties("cmis:document", "b.txt");
    props.remove(ids::OBJECT_TYPE_ID);
    let updated = session.update_properties("d1", &props, Some("7")).unwrap();
    assert_eq!(updated.name(), "b.txt");
    assert_eq!(mock.last_request().unwrap().body_text(), r#"{"name":"b.txt"}"#);

    assert_eq!(session.delete_tree("f1", true, false).unwrap(), Vec::<String>::new());
    let err = session.delete_object("d1", true).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ObjectNotFound));
}

#[test]
fn test_connect_needs_oauth2_and_drive_url() {
    let mock = Rc::new(MockTransport::new());
    let transport: Rc<dyn HttpTransport> = mock.clone();

    let params = SessionParameters::new(BASE).with_credentials("me", "pw");
    assert!(GdriveSession::connect(Rc::clone(&transport), &params).unwrap().is_none());

    let mut params = SessionParameters::new("http://h/cmis/atom");
    params.oauth2 = Some(OAuth2Data::default());
    assert!(GdriveSession::connect(transport, &params).unwrap().is_none());
    assert_eq!(mock.request_count(), 0);
}

#[test]
fn test_unauthorized_open_is_permission_denied() {
    let mock = Rc::new(MockTransport::new());
    mock.on(Method::Get, "files/root", HttpResponse::new(401, "expired"));
    let transport: Rc<dyn HttpTransport> = mock.clone();
    let handler = OAuth2Handler::with_tokens(
        Rc::clone(&transport),
        OAuth2Data::default(),
        TokenSet::new("stale"),
    );

    let err = GdriveSession::open(transport, BASE, handler).err().unwrap();
    assert!(err.is_permission_denied());
}
