//! HTTP client for the remote media service
//!
//! [`InstagramClient`] owns two `reqwest` clients: a session client with a
//! cookie store (used for login, listings and authenticated asset fetches) and
//! a plain anonymous client. Listings for users, hashtags and locations are
//! exposed as [`PageFetcher`](crate::source::PageFetcher) implementations in
//! [`feeds`].

mod feeds;


pub use feeds::{GraphFeed, GraphKind, UserFeed};

use crate::config::{Credentials, Endpoints, NetworkConfig};
use crate::error::{Error, Result};
use crate::types::{RawMediaRecord, RecordKind};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

/// User agent sent by the web session
const WEB_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";

/// The story feed only answers to the mobile app
const STORIES_USER_AGENT: &str = "Instagram 9.5.2 (iPhone7,2; iPhone OS 9_3_3; en_US; en-US; scale=2.00; 750x1334) AppleWebKit/420+";

/// Marker contained in the URL of the service's default profile picture
pub const DEFAULT_PROFILE_PIC_MARKER: &str = "11906329_960233084022564_1448528159";

const SHARED_DATA_START: &str = "window._sharedData = ";
const SHARED_DATA_END: &str = ";</script>";

/// Profile details needed for the profile picture and stories
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    /// Numeric user id (as a string)
    pub id: String,
    /// Full-size profile picture URL
    pub profile_pic_url_hd: Option<String>,
}

impl UserInfo {
    /// Profile picture URL, unless it is the service's default placeholder
    pub fn custom_profile_pic(&self) -> Option<&str> {
        self.profile_pic_url_hd
            .as_deref()
            .filter(|url| !url.contains(DEFAULT_PROFILE_PIC_MARKER))
    }
}

/// Cookies captured at login
#[derive(Clone, Debug, Default)]
struct Session {
    csrf_token: Option<String>,
    ds_user_id: Option<String>,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    authenticated: bool,
}

/// Client for the web and mobile endpoints
pub struct InstagramClient {
    http: reqwest::Client,
    anonymous: reqwest::Client,
    endpoints: Endpoints,
    session: Session,
    logged_in: AtomicBool,
}

impl InstagramClient {
    /// Build an anonymous client from the network settings
    ///
    /// # Errors
    /// Returns error if an HTTP client cannot be created
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(network.request_timeout)
            .user_agent(WEB_USER_AGENT)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        let anonymous = reqwest::Client::builder()
            .timeout(network.request_timeout)
            .user_agent(WEB_USER_AGENT)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            anonymous,
            endpoints: network.endpoints.clone(),
            session: Session::default(),
            logged_in: AtomicBool::new(false),
        })
    }

    /// Whether [`InstagramClient::login`] succeeded and no logout happened since
    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    /// The session client (cookie store, login cookies)
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// A client that sends no cookies
    pub(crate) fn anonymous(&self) -> &reqwest::Client {
        &self.anonymous
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.endpoints.base_url
    }

    pub(crate) fn csrf_token(&self) -> Option<&str> {
        self.session.csrf_token.as_deref()
    }

    /// Log in with the given credentials
    ///
    /// Fetches the landing page for a CSRF cookie, then posts the credentials.
    ///
    /// # Errors
    /// Returns [`Error::AuthenticationFailed`] unless the service answers with
    /// `{"authenticated": true}`.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        let base = self.endpoints.base_url.clone();
        let landing = self
            .http
            .get(&base)
            .header("Referer", &base)
            .send()
            .await
            .map_err(|e| Error::from_request(&base, e))?;
        let csrf = cookie_value(&landing, "csrftoken");

        let login_url = format!("{base}accounts/login/ajax/");
        let mut request = self
            .http
            .post(&login_url)
            .header("Referer", &base)
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ]);
        if let Some(token) = &csrf {
            request = request.header("X-CSRFToken", token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::from_request(&login_url, e))?;

        let status = response.status();
        let session = Session {
            csrf_token: cookie_value(&response, "csrftoken").or(csrf),
            ds_user_id: cookie_value(&response, "ds_user_id"),
            session_id: cookie_value(&response, "sessionid"),
        };
        let body: LoginResponse = response
            .json()
            .await
            .unwrap_or(LoginResponse { authenticated: false });

        if !status.is_success() || !body.authenticated {
            tracing::warn!(user = %credentials.username, status = %status, "Login rejected");
            return Err(Error::AuthenticationFailed(credentials.username.clone()));
        }

        self.session = session;
        self.logged_in.store(true, Ordering::SeqCst);
        tracing::info!(user = %credentials.username, "Logged in");
        Ok(())
    }

    /// Log out of the session; failures are logged, never returned
    pub async fn logout(&self) {
        if !self.logged_in.swap(false, Ordering::SeqCst) {
            return;
        }

        let url = format!("{}accounts/logout/", self.endpoints.base_url);
        let token = self.session.csrf_token.clone().unwrap_or_default();
        match self
            .http
            .post(&url)
            .form(&[("csrfmiddlewaretoken", token.as_str())])
            .send()
            .await
        {
            Ok(response) => {
                tracing::debug!(status = %response.status(), "Logged out");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Logout request failed");
            }
        }
    }

    /// Look up a user's id and profile picture from their profile page
    ///
    /// Returns `Ok(None)` when the page carries no usable profile payload.
    ///
    /// # Errors
    /// Returns [`Error::TargetNotFound`] on HTTP 404.
    pub async fn fetch_user(&self, username: &str) -> Result<Option<UserInfo>> {
        let url = format!("{}{}/", self.endpoints.base_url, username);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::from_request(&url, e))?;
        check_status(response.status(), &url, Some(username))?;

        let html = response.text().await?;
        Ok(parse_shared_data(&html))
    }

    /// Fetch a user's current stories; empty unless logged in
    pub async fn fetch_stories(&self, user_id: &str) -> Result<Vec<RawMediaRecord>> {
        let (Some(ds_user_id), Some(session_id)) =
            (&self.session.ds_user_id, &self.session.session_id)
        else {
            return Ok(Vec::new());
        };
        if !self.is_logged_in() {
            return Ok(Vec::new());
        }

        let url = format!("{}{}/reel_media/", self.endpoints.stories_base_url, user_id);
        // Cookies go in an explicit header, so the cookie store must not interfere
        let response = self
            .anonymous
            .get(&url)
            .header(reqwest::header::USER_AGENT, STORIES_USER_AGENT)
            .header(
                reqwest::header::COOKIE,
                format!("ds_user_id={ds_user_id}; sessionid={session_id};"),
            )
            .send()
            .await
            .map_err(|e| Error::from_request(&url, e))?;
        check_status(response.status(), &url, None)?;

        let body: Value = response.json().await?;
        Ok(parse_story_items(body))
    }

    /// Look up the video URL of a post by its shortcode
    ///
    /// # Errors
    /// Returns [`Error::InvalidResponse`] when the detail payload has no video URL.
    pub async fn video_url(&self, code: &str) -> Result<String> {
        let url = format!("{}p/{}/?__a=1", self.endpoints.base_url, code);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::from_request(&url, e))?;
        check_status(response.status(), &url, None)?;

        let body: Value = response.json().await?;
        ["/graphql/shortcode_media/video_url", "/media/video_url"]
            .iter()
            .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidResponse(format!("no video url for post {code}")))
    }
}

/// Map a non-success status to an error.
///
/// With a `target`, 404 means the target does not exist and 401/403 means it
/// cannot be viewed; otherwise every failure is [`Error::UnexpectedStatus`].
pub(crate) fn check_status(status: StatusCode, url: &str, target: Option<&str>) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    match (status, target) {
        (StatusCode::NOT_FOUND, Some(target)) => Err(Error::TargetNotFound(target.to_string())),
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, Some(target)) => {
            Err(Error::TargetPrivateOrEmpty(target.to_string()))
        }
        _ => Err(Error::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }),
    }
}

pub(crate) fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .cookies()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

/// Extract the profile from the `window._sharedData` blob of a profile page
pub(crate) fn parse_shared_data(html: &str) -> Option<UserInfo> {
    let start = html.find(SHARED_DATA_START)? + SHARED_DATA_START.len();
    let rest = &html[start..];
    let json = &rest[..rest.find(SHARED_DATA_END)?];

    let data: Value = match serde_json::from_str(json) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, "Profile page carried malformed shared data");
            return None;
        }
    };
    let user = data.pointer("/entry_data/ProfilePage/0/user")?;
    let id = match user.get("id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(UserInfo {
        id,
        profile_pic_url_hd: user
            .get("profile_pic_url_hd")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn parse_story_items(body: Value) -> Vec<RawMediaRecord> {
    match body {
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| RawMediaRecord::new(RecordKind::Story, item))
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
