//! Rendered responses and cookies.

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// A `Set-Cookie` value.
#[derive(Clone, Debug, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub expires: Option<DateTime<Utc>>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Cookie {
            name: name.into(),
            value: value.into(),
            expires: None,
            path: Some("/".into()),
            domain: None,
            secure: false,
            http_only: true,
            same_site: None,
        }
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    /// Expire `minutes` from now.
    pub fn lasting(self, minutes: i64) -> Self {
        self.expires(Utc::now() + Duration::minutes(minutes))
    }

    /// A cookie that clears `name` in the client.
    pub fn forget(name: impl Into<String>) -> Self {
        Cookie::new(name, "").expires(DateTime::<Utc>::default())
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(at) = self.expires {
            write!(f, "; Expires={}", at.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={}", path)?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site {
            let v = match same_site {
                SameSite::Strict => "Strict",
                SameSite::Lax => "Lax",
                SameSite::None => "None",
            };
            write!(f, "; SameSite={}", v)?;
        }
        Ok(())
    }
}

/// A finalized response: status, headers, cookies, rendered body and the untransformed data.
#[derive(Clone, Debug, PartialEq)]
pub struct WireResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    body: Option<Value>,
    original: Value,
}

impl WireResponse {
    pub fn new(status: StatusCode, body: Option<Value>) -> Self {
        WireResponse {
            status,
            headers: Vec::new(),
            cookies: Vec::new(),
            body,
            original: Value::Null,
        }
    }

    pub fn json(status: StatusCode, body: Value) -> Self {
        WireResponse {
            original: body.clone(),
            ..WireResponse::new(status, Some(body))
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_original(mut self, original: Value) -> Self {
        self.original = original;
        self
    }

    pub fn attach_cookie(&mut self, cookie: Cookie) -> &mut Self {
        self.cookies.push(cookie);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Rendered body; `None` for bodiless responses.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Data as it was before transformation.
    pub fn original(&self) -> &Value {
        &self.original
    }

    pub fn into_original(self) -> Value {
        self.original
    }
}

impl IntoResponse for WireResponse {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            Some(body) if self.status != StatusCode::NO_CONTENT => (self.status, Json(body)).into_response(),
            _ => self.status.into_response(),
        };
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        for cookie in &self.cookies {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(_) => tracing::warn!(cookie = %cookie.name, "dropping invalid cookie"),
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cookie_renders_attributes() {
        let at = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        let cookie = Cookie::new("sid", "abc").expires(at).secure(true).same_site(SameSite::Lax);
        assert_eq!(
            cookie.to_string(),
            "sid=abc; Expires=Wed, 02 Jan 2030 03:04:05 GMT; Path=/; Secure; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn forget_expires_in_the_past() {
        assert!(Cookie::forget("sid").to_string().contains("Expires=Thu, 01 Jan 1970"));
    }

    #[test]
    fn into_response_sets_headers_and_cookies() {
        let mut wire = WireResponse::json(StatusCode::CREATED, serde_json::json!({"data": {}}))
            .with_header("Location", "/users/1");
        wire.attach_cookie(Cookie::new("a", "1"));
        let response = wire.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["location"], "/users/1");
        assert!(response.headers()[header::SET_COOKIE].to_str().unwrap().starts_with("a=1"));
    }
}
