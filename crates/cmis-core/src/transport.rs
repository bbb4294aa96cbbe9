//! HTTP transport abstraction
//!
//! Bindings build [`HttpRequest`]s and hand them to an [`HttpTransport`].
//! Sockets, TLS, redirects and timeouts are the transport's business; the
//! bindings only see status, headers and body bytes.

use std::fmt;

use crate::error::{Error, Result};

/// HTTP verbs used by the bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials attached to a request
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

/// An outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub credentials: Option<Credentials>,
    /// Whether the transport may follow 3xx answers on its own
    pub follow_redirects: bool,
}

impl HttpRequest {
    pub fn new<S: Into<String>>(method: Method, url: S) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            credentials: None,
            follow_redirects: true,
        }
    }

    pub fn get<S: Into<String>>(url: S) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post<S: Into<String>>(url: S) -> Self {
        Self::new(Method::Post, url)
    }

    #[must_use]
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body and its `Content-Type`
    #[must_use]
    pub fn with_body<S: Into<String>>(mut self, content_type: S, body: Vec<u8>) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
        self.headers.push(("Content-Type".to_string(), content_type.into()));
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Hand 3xx answers back to the caller instead of following them
    #[must_use]
    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// Header value, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Body as text, lossily decoded
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A received response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new<B: Into<Vec<u8>>>(status: u16, body: B) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// 200 response with an XML body
    pub fn xml<B: Into<Vec<u8>>>(body: B) -> Self {
        Self::new(200, body).with_header("Content-Type", "application/xml; charset=utf-8")
    }

    /// 200 response with a JSON body
    pub fn json<B: Into<Vec<u8>>>(body: B) -> Self {
        Self::new(200, body).with_header("Content-Type", "application/json")
    }

    #[must_use]
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turn a non-2xx response into the matching CMIS error
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let mut message = self.text();
        if message.len() > 512 {
            let mut cut = 512;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Err(Error::from_http_status(self.status, message))
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Executes HTTP exchanges for the bindings
pub trait HttpTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_transport::{ReqwestTransport, ReqwestTransportConfig};

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use std::time::Duration;

    use log::debug;
    use reqwest::blocking::Client;
    use reqwest::redirect::Policy;

    use super::{Credentials, HttpRequest, HttpResponse, HttpTransport, Method};
    use crate::error::{Error, Result};

    /// Options for [`ReqwestTransport`]
    #[derive(Debug, Clone)]
    pub struct ReqwestTransportConfig {
        /// Whole-request timeout
        pub timeout: Duration,
        pub connect_timeout: Duration,
        /// Accept self-signed or otherwise invalid certificates
        pub accept_invalid_certs: bool,
        pub user_agent: String,
        /// Follow 3xx answers. When off, every request gets the redirect
        /// response itself.
        pub follow_redirects: bool,
    }

    impl Default for ReqwestTransportConfig {
        fn default() -> Self {
            Self {
                timeout: Duration::from_secs(60),
                connect_timeout: Duration::from_secs(10),
                accept_invalid_certs: false,
                user_agent: concat!("cmis-rs/", env!("CARGO_PKG_VERSION")).to_string(),
                follow_redirects: true,
            }
        }
    }

    /// Blocking transport on a `reqwest` client.
    ///
    /// Requests built with [`HttpRequest::without_redirects`] go through a
    /// second client that never follows redirects.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: Client,
        direct: Client,
    }

    fn build_client(config: &ReqwestTransportConfig, policy: Policy) -> Result<Client> {
        Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(config.user_agent.clone())
            .redirect(policy)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    impl ReqwestTransport {
        pub fn new() -> Result<Self> {
            Self::with_config(&ReqwestTransportConfig::default())
        }

        pub fn with_config(config: &ReqwestTransportConfig) -> Result<Self> {
            let direct = build_client(config, Policy::none())?;
            let client = if config.follow_redirects {
                build_client(config, Policy::default())?
            } else {
                direct.clone()
            };
            Ok(Self { client, direct })
        }
    }

    impl HttpTransport for ReqwestTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Patch => reqwest::Method::PATCH,
                Method::Delete => reqwest::Method::DELETE,
            };
            debug!("{} {}", request.method, request.url);

            let client = if request.follow_redirects {
                &self.client
            } else {
                &self.direct
            };
            let mut builder = client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = match &request.credentials {
                Some(Credentials::Basic { username, password }) => {
                    builder.basic_auth(username, Some(password))
                }
                Some(Credentials::Bearer(token)) => builder.bearer_auth(token),
                None => builder,
            };
            if !request.body.is_empty() {
                builder = builder.body(request.body);
            }

            let response = builder
                .send()
                .map_err(|e| Error::Transport(e.to_string()))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| {
                    v.to_str()
                        .ok()
                        .map(|v| (k.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .bytes()
                .map_err(|e| Error::Transport(e.to_string()))?
                .to_vec();
            debug!("-> {status} ({} bytes)", body.len());

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::thread;

        use super::*;

        const FOUND: &str = "HTTP/1.1 302 Found\r\n\
            Location: http://127.0.0.1:9/callback?code=4/abc\r\n\
            Content-Length: 0\r\n\
            Connection: close\r\n\r\n";

        /// Serve one 302 per connection, `count` times
        fn redirect_server(count: usize) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            thread::spawn(move || {
                for stream in listener.incoming().take(count) {
                    let mut stream = stream.unwrap();
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf);
                    stream.write_all(FOUND.as_bytes()).unwrap();
                }
            });
            format!("http://{addr}/login")
        }

        #[test]
        fn test_config_without_redirects_returns_the_302() {
            let url = redirect_server(1);
            let config = ReqwestTransportConfig {
                follow_redirects: false,
                ..Default::default()
            };
            let transport = ReqwestTransport::with_config(&config).unwrap();

            let response = transport.execute(HttpRequest::get(url)).unwrap();
            assert_eq!(response.status, 302);
            assert_eq!(
                response.header("location"),
                Some("http://127.0.0.1:9/callback?code=4/abc")
            );
        }

        #[test]
        fn test_request_can_opt_out_of_redirects() {
            let url = redirect_server(1);
            let transport = ReqwestTransport::new().unwrap();

            let response = transport
                .execute(HttpRequest::post(url).without_redirects())
                .unwrap();
            assert_eq!(response.status, 302);
        }
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    //! Scripted in-memory transport

    use std::cell::RefCell;

    use super::{Credentials, HttpRequest, HttpResponse, HttpTransport, Method};
    use crate::error::Result;

    struct Route {
        method: Method,
        url_part: String,
        body_part: Option<String>,
        response: HttpResponse,
        once: bool,
    }

    /// Answers requests from a list of routes and records every request.
    ///
    /// A route matches on method and a URL substring, optionally also on a
    /// body substring; the first matching route in registration order wins.
    /// Routes added with [`MockTransport::once`] answer a single request and
    /// are then dropped. Unmatched requests get a 404. When basic credentials are required,
    /// requests carrying other credentials get a 401.
    #[derive(Default)]
    pub struct MockTransport {
        routes: RefCell<Vec<Route>>,
        required: RefCell<Option<Credentials>>,
        requests: RefCell<Vec<HttpRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(&self, method: Method, url_part: &str, response: HttpResponse) -> &Self {
            self.routes.borrow_mut().push(Route {
                method,
                url_part: url_part.to_string(),
                body_part: None,
                response,
                once: false,
            });
            self
        }

        /// Route that answers only the first matching request
        pub fn once(&self, method: Method, url_part: &str, response: HttpResponse) -> &Self {
            self.routes.borrow_mut().push(Route {
                method,
                url_part: url_part.to_string(),
                body_part: None,
                response,
                once: true,
            });
            self
        }

        /// Route that also requires `body_part` in the request body
        pub fn on_body(
            &self,
            method: Method,
            url_part: &str,
            body_part: &str,
            response: HttpResponse,
        ) -> &Self {
            self.routes.borrow_mut().push(Route {
                method,
                url_part: url_part.to_string(),
                body_part: Some(body_part.to_string()),
                response,
                once: false,
            });
            self
        }

        /// Reject requests whose credentials differ from these with a 401
        pub fn require_basic(&self, username: &str, password: &str) -> &Self {
            *self.required.borrow_mut() = Some(Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            });
            self
        }

        /// Requests received so far
        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.borrow().clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }

        pub fn last_request(&self) -> Option<HttpRequest> {
            self.requests.borrow().last().cloned()
        }
    }

    impl HttpTransport for MockTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.borrow_mut().push(request.clone());

            if let Some(required) = self.required.borrow().as_ref() {
                if request.credentials.as_ref() != Some(required) {
                    return Ok(HttpResponse::new(401, "Unauthorized"));
                }
            }

            let body = request.body_text();
            let mut routes = self.routes.borrow_mut();
            let found = routes.iter().position(|r| {
                r.method == request.method
                    && request.url.contains(&r.url_part)
                    && r.body_part.as_ref().map_or(true, |b| body.contains(b.as_str()))
            });
            Ok(match found {
                Some(i) if routes[i].once => routes.remove(i).response,
                Some(i) => routes[i].response.clone(),
                None => HttpResponse::new(404, format!("no route for {}", request.url)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_error_for_status() {
        let ok = HttpResponse::new(201, "created").error_for_status();
        assert!(ok.is_ok());

        let err = HttpResponse::new(404, "gone").error_for_status().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ObjectNotFound));

        let err = HttpResponse::new(403, "no").error_for_status().unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_headers_case_insensitive() {
        let req = HttpRequest::post("http://x").with_body("text/xml", b"<a/>".to_vec());
        assert_eq!(req.header("content-type"), Some("text/xml"));

        let req = req.with_body("application/json", b"{}".to_vec());
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_mock_routes_and_credentials() {
        let mock = MockTransport::new();
        mock.on(Method::Get, "/service", HttpResponse::xml("<service/>"))
            .require_basic("admin", "secret");

        let creds = Some(Credentials::Basic {
            username: "admin".into(),
            password: "secret".into(),
        });
        let resp = mock
            .execute(HttpRequest::get("http://h/service").with_credentials(creds.clone()))
            .unwrap();
        assert_eq!(resp.status, 200);

        let resp = mock
            .execute(HttpRequest::get("http://h/other").with_credentials(creds))
            .unwrap();
        assert_eq!(resp.status, 404);

        let resp = mock.execute(HttpRequest::get("http://h/service")).unwrap();
        assert_eq!(resp.status, 401);

        assert_eq!(mock.request_count(), 3);
    }

    #[test]
    fn test_once_routes_answer_a_single_request() {
        let mock = MockTransport::new();
        mock.once(Method::Get, "/x", HttpResponse::new(503, "busy"))
            .on(Method::Get, "/x", HttpResponse::new(200, "ok"));

        assert_eq!(mock.execute(HttpRequest::get("http://h/x")).unwrap().status, 503);
        assert_eq!(mock.execute(HttpRequest::get("http://h/x")).unwrap().status, 200);
        assert_eq!(mock.execute(HttpRequest::get("http://h/x")).unwrap().status, 200);
    }

    #[test]
    fn test_requests_follow_redirects_by_default() {
        assert!(HttpRequest::get("http://h/x").follow_redirects);
        assert!(!HttpRequest::get("http://h/x").without_redirects().follow_redirects);
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = Credentials::Basic {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
