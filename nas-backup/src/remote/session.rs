//! Authenticated HTTP session with the NAS.
//!
//! Lifecycle: `new` → `login` → requests → drop. The session id is not
//! refreshed; an expired id surfaces as an ordinary request failure.

use crate::utils::errors::RemoteError;
use base64::Engine;
use reqwest::{multipart::Form, Response, Url};
use serde::Deserialize;
use tracing::{debug, info};

const LOGIN_PATH: &str = "/cgi-bin/authLogin.cgi";

pub struct QnapSession {
    base_url: Url,
    http: reqwest::Client,
    sid: Option<String>,
}

impl QnapSession {
    pub fn new(url: &str, user_agent: &str) -> Result<Self, RemoteError> {
        let base_url = Url::parse(url).map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", url, e)))?;
        let http = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            base_url,
            http,
            sid: None,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.sid.is_some()
    }

    /// Log in and keep the issued session id for all later requests.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), RemoteError> {
        let url = self.url(LOGIN_PATH)?;
        let form = [
            ("user", user.replace('\\', "+")),
            ("pwd", encode_password(password)),
        ];
        let res = self.http.post(url).form(&form).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                path: LOGIN_PATH.to_string(),
                status: status.as_u16(),
            });
        }

        let body = res.text().await?;
        let sid = parse_login_response(&body)?;
        self.sid = Some(sid);
        info!(user = %user, "Logged in to NAS");
        Ok(())
    }

    /// POST a urlencoded form to `path` with the session id attached.
    pub async fn post_form(
        &self,
        path: &str,
        query: &[(&str, &str)],
        params: &[(&str, String)],
    ) -> Result<Response, RemoteError> {
        let url = self.url(path)?;
        let mut form: Vec<(&str, String)> = params.to_vec();
        if let Some(sid) = &self.sid {
            form.push(("sid", sid.clone()));
        }

        debug!(path = %path, "POST form");
        let res = self.http.post(url).query(query).form(&form).send().await?;
        check_status(path, res)
    }

    /// POST a multipart body to `path`. The session id travels in the query
    /// string because the body is streamed.
    pub async fn post_multipart(
        &self,
        path: &str,
        query: &[(&str, String)],
        form: Form,
    ) -> Result<Response, RemoteError> {
        let url = self.url(path)?;
        let mut query: Vec<(&str, String)> = query.to_vec();
        if let Some(sid) = &self.sid {
            query.push(("sid", sid.clone()));
        }

        debug!(path = %path, "POST multipart");
        let res = self.http.post(url).query(&query).multipart(form).send().await?;
        check_status(path, res)
    }

    fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", path, e)))
    }
}

fn check_status(path: &str, res: Response) -> Result<Response, RemoteError> {
    let status = res.status();
    if status.as_u16() != 200 {
        return Err(RemoteError::Status {
            path: path.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(res)
}

/// The login endpoint expects the password base64-encoded.
pub fn encode_password(password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(password.as_bytes())
}

/// Fields of the login reply; everything else in `QDocRoot` is ignored.
#[derive(Debug, Deserialize)]
struct QDocRoot {
    #[serde(rename = "authPassed")]
    auth_passed: Option<String>,

    #[serde(rename = "authSid")]
    auth_sid: Option<String>,
}

/// Extract the session id from the login XML reply.
pub fn parse_login_response(body: &str) -> Result<String, RemoteError> {
    let root: QDocRoot = quick_xml::de::from_str(body)
        .map_err(|e| RemoteError::Login(format!("malformed login reply: {}", e)))?;

    let passed = root
        .auth_passed
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok());
    if passed != Some(1) {
        return Err(RemoteError::Login("authentication not passed".to_string()));
    }

    root.auth_sid
        .map(|sid| sid.trim().to_string())
        .filter(|sid| !sid.is_empty())
        .ok_or_else(|| RemoteError::Login("reply carries no session id".to_string()))
}
