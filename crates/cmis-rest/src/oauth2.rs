//! OAuth2 authorization-code flow
//!
//! The flow is a small state machine:
//!
//! ```text
//! NoToken → AwaitingLogin → AwaitingApproval → AwaitingToken → Authenticated
//! ```
//!
//! driven by one HTTP exchange per step: the authorization page, the login
//! form submission, the approval form submission and the token exchange. A
//! failed step moves the handler to `Failed`; a new attempt starts over from
//! [`OAuth2Handler::fetch_login_page`]. When the authorization code is
//! obtained elsewhere (a browser, a redirect listener) it can be injected
//! with [`OAuth2Handler::set_authorization_code`] instead.

use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use once_cell::sync::Lazy;
use quick_xml::escape::unescape;
use regex::Regex;
use serde::Deserialize;
use url::form_urlencoded;
use url::Url;

use cmis_core::{Credentials, Error, HttpRequest, HttpTransport, OAuth2Data, Result};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
/// Redirect hops followed after a form submission
const MAX_REDIRECTS: usize = 10;

/// Where the handler is in the authorization sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthState {
    NoToken,
    AwaitingLogin,
    AwaitingApproval,
    AwaitingToken,
    Authenticated,
    Failed,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::NoToken => "no token",
            AuthState::AwaitingLogin => "awaiting login",
            AuthState::AwaitingApproval => "awaiting approval",
            AuthState::AwaitingToken => "awaiting token",
            AuthState::Authenticated => "authenticated",
            AuthState::Failed => "failed",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens returned by the token endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    pub fn new<S: Into<String>>(access_token: S) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token<S: Into<String>>(mut self, refresh_token: S) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Whether the access token has expired, with a 60 second margin
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map_or(false, |at| Utc::now() >= at - Duration::seconds(60))
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"***")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// An HTML form scraped from a login or approval page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HtmlForm {
    /// Absolute submission URL
    pub action: String,
    /// `(name, type, value)` of every named input, in document order
    pub inputs: Vec<(String, String, String)>,
}

static FORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<form\b([^>]*)>(.*?)</form>").expect("valid regex"));
static INPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<input\b([^>]*)>").expect("valid regex"));
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("valid regex")
});
static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bcode=([^&"'<\s]+)"#).expect("valid regex"));

fn attributes(tag: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(tag)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map_or("", |m| m.as_str());
            (c[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// HTML attribute text with character references resolved; text with an
/// unknown entity is kept as is
fn decode_entities(s: &str) -> String {
    match unescape(s) {
        Ok(text) => text.into_owned(),
        Err(_) => s.to_string(),
    }
}

impl HtmlForm {
    /// First form of `html`, with its action resolved against `page_url`
    pub fn parse(html: &str, page_url: &str) -> Option<Self> {
        let form = FORM_RE.captures(html)?;
        let form_attrs = attributes(&form[1]);
        let action = attribute(&form_attrs, "action").unwrap_or("");
        let action = Url::parse(page_url)
            .and_then(|base| base.join(action))
            .map(String::from)
            .unwrap_or_else(|_| action.to_string());

        let inputs = INPUT_RE
            .captures_iter(&form[2])
            .filter_map(|input| {
                let attrs = attributes(&input[1]);
                let name = attribute(&attrs, "name")?.to_string();
                let kind = attribute(&attrs, "type").unwrap_or("text").to_ascii_lowercase();
                let value = attribute(&attrs, "value").unwrap_or("").to_string();
                Some((name, kind, value))
            })
            .collect();
        Some(Self { action, inputs })
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        match self.inputs.iter_mut().find(|(n, _, _)| n == name) {
            Some(input) => input.2 = value.to_string(),
            None => self
                .inputs
                .push((name.to_string(), "hidden".to_string(), value.to_string())),
        }
    }

    pub fn has_password_field(&self) -> bool {
        self.inputs.iter().any(|(_, kind, _)| kind == "password")
    }

    /// Fill the password input and the first text-like input with the
    /// user's credentials
    pub fn fill_login(&mut self, username: &str, password: &str) -> bool {
        let mut user_set = false;
        let mut password_set = false;
        for (_, kind, value) in &mut self.inputs {
            match kind.as_str() {
                "password" if !password_set => {
                    *value = password.to_string();
                    password_set = true;
                }
                "text" | "email" if !user_set => {
                    *value = username.to_string();
                    user_set = true;
                }
                _ => {}
            }
        }
        user_set && password_set
    }

    /// `application/x-www-form-urlencoded` body
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, _, value) in &self.inputs {
            serializer.append_pair(name, value);
        }
        serializer.finish()
    }
}

/// Authorization code in a redirect `Location`
fn code_in_location(location: &str) -> Option<String> {
    CODE_RE.captures(location).map(|c| c[1].to_string())
}

/// Authorization code carried by a redirect `Location` or by the page the
/// flow ends on (a `code=` in the title or URL, or a `code` input)
fn find_code(location: Option<&str>, html: &str) -> Option<String> {
    if let Some(code) = location.and_then(code_in_location) {
        return Some(code);
    }
    if let Some(form) = HtmlForm::parse(html, "http://localhost/") {
        if let Some(code) = form.value("code").filter(|c| !c.is_empty()) {
            return Some(code.to_string());
        }
    }
    CODE_RE.captures(html).map(|c| decode_entities(&c[1]))
}

/// Runs the authorization-code flow and holds the resulting tokens
pub struct OAuth2Handler {
    transport: Rc<dyn HttpTransport>,
    data: OAuth2Data,
    state: AuthState,
    form: Option<HtmlForm>,
    code: Option<String>,
    tokens: Option<TokenSet>,
}

impl OAuth2Handler {
    pub fn new(transport: Rc<dyn HttpTransport>, data: OAuth2Data) -> Self {
        Self {
            transport,
            data,
            state: AuthState::NoToken,
            form: None,
            code: None,
            tokens: None,
        }
    }

    /// A handler already holding tokens, e.g. from a previous run
    pub fn with_tokens(transport: Rc<dyn HttpTransport>, data: OAuth2Data, tokens: TokenSet) -> Self {
        Self {
            state: AuthState::Authenticated,
            tokens: Some(tokens),
            ..Self::new(transport, data)
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn data(&self) -> &OAuth2Data {
        &self.data
    }

    pub fn tokens(&self) -> Option<&TokenSet> {
        self.tokens.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    /// Bearer credentials for the current access token
    pub fn credentials(&self) -> Option<Credentials> {
        self.access_token().map(|t| Credentials::Bearer(t.to_string()))
    }

    /// The authorization URL a user would open in a browser
    pub fn auth_url(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("scope", &self.data.scope)
            .append_pair("redirect_uri", &self.data.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.data.client_id)
            .finish();
        let sep = if self.data.auth_url.contains('?') { '&' } else { '?' };
        format!("{}{sep}{query}", self.data.auth_url)
    }

    fn expect(&self, state: AuthState, step: &str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(Error::OAuth2(format!(
                "cannot {step} while {}, expected {state}",
                self.state
            )))
        }
    }

    fn fail<T>(&mut self, message: String) -> Result<T> {
        warn!("OAuth2 flow failed: {message}");
        self.state = AuthState::Failed;
        self.form = None;
        self.code = None;
        Err(Error::OAuth2(message))
    }

    /// Step 1: GET the authorization page and keep its login form
    pub fn fetch_login_page(&mut self) -> Result<()> {
        if !matches!(self.state, AuthState::NoToken | AuthState::Failed) {
            self.expect(AuthState::NoToken, "fetch the login page")?;
        }
        let url = self.auth_url();
        let response = match self.transport.execute(HttpRequest::get(url.as_str())) {
            Ok(response) => response,
            Err(e) => return self.fail(format!("authorization page: {e}")),
        };
        if !response.is_success() {
            return self.fail(format!("authorization page answered {}", response.status));
        }
        match HtmlForm::parse(&response.text(), &url) {
            Some(form) if form.has_password_field() => {
                debug!("OAuth2 login form posts to {}", form.action);
                self.form = Some(form);
                self.state = AuthState::AwaitingLogin;
                Ok(())
            }
            _ => self.fail("authorization page has no login form".to_string()),
        }
    }

    /// Post `form` and move on according to what comes back: a code, or
    /// another form to approve.
    ///
    /// Redirects are followed here rather than by the transport, since the
    /// code usually arrives in the `Location` of a redirect to a
    /// `redirect_uri` nobody serves.
    fn submit(&mut self, form: HtmlForm, step: &str) -> Result<()> {
        let request = HttpRequest::post(form.action.as_str())
            .with_body(FORM_URLENCODED, form.encode().into_bytes())
            .without_redirects();
        let mut page_url = form.action.clone();
        let mut response = match self.transport.execute(request) {
            Ok(response) => response,
            Err(e) => return self.fail(format!("{step}: {e}")),
        };
        let mut hops = 0;
        while (300..400).contains(&response.status) {
            let Some(location) = response.header("location").map(str::to_string) else {
                break;
            };
            if let Some(code) = code_in_location(&location) {
                self.got_code(code);
                return Ok(());
            }
            if hops == MAX_REDIRECTS {
                return self.fail(format!("{step} redirected more than {MAX_REDIRECTS} times"));
            }
            hops += 1;
            page_url = Url::parse(&page_url)
                .and_then(|base| base.join(&location))
                .map(String::from)
                .unwrap_or(location);
            debug!("OAuth2 {step} redirected to {page_url}");
            response = match self
                .transport
                .execute(HttpRequest::get(page_url.as_str()).without_redirects())
            {
                Ok(response) => response,
                Err(e) => return self.fail(format!("{step}: {e}")),
            };
        }
        if !response.is_success() {
            return self.fail(format!("{step} answered {}", response.status));
        }
        let html = response.text();
        if let Some(code) = find_code(None, &html) {
            self.got_code(code);
            return Ok(());
        }
        match HtmlForm::parse(&html, &page_url) {
            Some(next) if next.has_password_field() => {
                self.fail(format!("{step} rejected the credentials"))
            }
            Some(next) => {
                self.form = Some(next);
                self.state = AuthState::AwaitingApproval;
                Ok(())
            }
            None => self.fail(format!("{step} returned neither a code nor a form")),
        }
    }

    fn got_code(&mut self, code: String) {
        self.code = Some(code);
        self.form = None;
        self.state = AuthState::AwaitingToken;
    }

    /// Step 2: submit the login form with the user's credentials
    pub fn submit_login(&mut self, username: &str, password: &str) -> Result<()> {
        self.expect(AuthState::AwaitingLogin, "log in")?;
        let Some(mut form) = self.form.take() else {
            return self.fail("no login form".to_string());
        };
        if !form.fill_login(username, password) {
            return self.fail("login form has no username field".to_string());
        }
        self.submit(form, "login")
    }

    /// Step 3: submit the approval form granting access
    pub fn submit_approval(&mut self) -> Result<()> {
        self.expect(AuthState::AwaitingApproval, "approve")?;
        let Some(form) = self.form.take() else {
            return self.fail("no approval form".to_string());
        };
        self.submit(form, "approval")
    }

    /// Use an authorization code obtained outside the handler
    pub fn set_authorization_code<S: Into<String>>(&mut self, code: S) {
        self.code = Some(code.into());
        self.form = None;
        self.state = AuthState::AwaitingToken;
    }

    fn request_tokens(&self, params: &[(&str, &str)]) -> Result<TokenSet> {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in params {
            serializer.append_pair(k, v);
        }
        let request = HttpRequest::post(self.data.token_url.as_str())
            .with_header("Accept", "application/json")
            .with_body(FORM_URLENCODED, serializer.finish().into_bytes());
        let response = self.transport.execute(request)?;
        if !response.is_success() {
            let message = match serde_json::from_slice::<TokenError>(&response.body) {
                Ok(e) => format!("{}: {}", e.error, e.error_description.unwrap_or_default()),
                Err(_) => format!("token endpoint answered {}", response.status),
            };
            return Err(Error::OAuth2(message));
        }
        let token: TokenResponse = serde_json::from_slice(&response.body)?;
        Ok(TokenSet {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
        })
    }

    /// Step 4: exchange the authorization code for tokens
    pub fn exchange_code(&mut self) -> Result<()> {
        self.expect(AuthState::AwaitingToken, "exchange the code")?;
        let Some(code) = self.code.take() else {
            return self.fail("no authorization code".to_string());
        };
        let result = self.request_tokens(&[
            ("code", code.as_str()),
            ("client_id", self.data.client_id.as_str()),
            ("client_secret", self.data.client_secret.as_str()),
            ("redirect_uri", self.data.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ]);
        match result {
            Ok(tokens) => {
                self.tokens = Some(tokens);
                self.state = AuthState::Authenticated;
                Ok(())
            }
            Err(Error::OAuth2(message)) => self.fail(message),
            Err(e) => self.fail(e.to_string()),
        }
    }

    /// Run every step with the user's credentials
    pub fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        if self.state == AuthState::Authenticated {
            return Ok(());
        }
        if self.state != AuthState::AwaitingToken {
            self.fetch_login_page()?;
            self.submit_login(username, password)?;
            if self.state == AuthState::AwaitingApproval {
                self.submit_approval()?;
            }
        }
        self.exchange_code()
    }

    /// Get a new access token with the refresh token. Nothing calls this
    /// automatically; a session answering 401 needs an explicit refresh.
    pub fn refresh(&mut self) -> Result<()> {
        let Some(refresh_token) = self.tokens.as_ref().and_then(|t| t.refresh_token.clone()) else {
            return Err(Error::OAuth2("no refresh token".to_string()));
        };
        let mut tokens = self.request_tokens(&[
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.data.client_id.as_str()),
            ("client_secret", self.data.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])?;
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token);
        }
        self.tokens = Some(tokens);
        self.state = AuthState::Authenticated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LOGIN: &str = r#"<html><body>
        <form id="gaia_loginform" action="/ServiceLoginAuth" method="post">
            <input type="hidden" name="GALX" value="x&amp;y">
            <input type="email" name="Email" id="Email">
            <input type='password' name='Passwd'>
            <input type="submit" name="signIn" value="Sign in">
        </form></body></html>"#;

    #[test]
    fn test_form_scraping() {
        let mut form = HtmlForm::parse(LOGIN, "https://accounts.example.com/o/oauth2/auth?x=1").unwrap();
        assert_eq!(form.action, "https://accounts.example.com/ServiceLoginAuth");
        assert_eq!(form.inputs.len(), 4);
        assert_eq!(form.value("GALX"), Some("x&y"));
        assert!(form.has_password_field());

        assert!(form.fill_login("me@example.com", "pw"));
        assert_eq!(
            form.encode(),
            "GALX=x%26y&Email=me%40example.com&Passwd=pw&signIn=Sign+in"
        );
    }

    #[test]
    fn test_find_code() {
        assert_eq!(
            find_code(Some("http://localhost/cb?state=1&code=4/abc"), ""),
            Some("4/abc".to_string())
        );
        assert_eq!(
            find_code(None, "<html><head><title>Success code=4/xyz</title></head></html>"),
            Some("4/xyz".to_string())
        );
        assert_eq!(
            find_code(None, r#"<form action="/x"><input id="code" name="code" value="4/in"></form>"#),
            Some("4/in".to_string())
        );
        assert_eq!(find_code(None, "<p>authcode=nope</p>"), None);
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(decode_entities("a&amp;b&#39;c&quot;&#x41;"), "a&b'c\"A");
        assert_eq!(decode_entities("R&D &nbsp;"), "R&D &nbsp;");
    }

    #[test]
    fn test_token_expiry() {
        let mut tokens = TokenSet::new("a");
        assert!(!tokens.is_expired());
        tokens.expires_at = Some(Utc::now() + Duration::seconds(30));
        assert!(tokens.is_expired());
        assert!(!format!("{tokens:?}").contains("\"a\""));
    }
}
