//! reqwest-backed [`DavBackend`]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use davsync_core::config::{AuthType, WebdavConfig};
use davsync_core::{BlockRange, DavsyncError, DavsyncResult, Depth};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, RANGE, WWW_AUTHENTICATE};
use reqwest::{Client, Method, Response, StatusCode, Url};
use tracing::{debug, warn};

use crate::backend::{DavBackend, DavEntry};
use crate::digest::{DigestChallenge, DigestSession};
use crate::multistatus;

/// Characters escaped inside one path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}')
    .add(b'/');

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

struct Credentials {
    username: String,
    password: String,
    auth_type: AuthType,
}

pub struct HttpBackend {
    client: Client,
    /// Address without trailing slash, e.g. `https://host/remote.php/dav`
    base_url: String,
    /// Decoded path component of the address, e.g. `/remote.php/dav`
    root_prefix: String,
    credentials: Option<Credentials>,
    digest: Mutex<Option<DigestSession>>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}

fn method(name: &str) -> DavsyncResult<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| DavsyncError::Transport(format!("invalid HTTP method {name}: {e}")))
}

impl HttpBackend {
    /// Build a client for `cfg.address`. The address must be http(s).
    pub fn new(cfg: &WebdavConfig) -> DavsyncResult<Self> {
        cfg.validate()?;

        if cfg.address.starts_with("http://") && cfg.has_credentials() {
            warn!(
                address = %cfg.address,
                "WebDAV address uses plaintext HTTP; credentials are sent unencrypted"
            );
        }

        let url = Url::parse(&cfg.address)
            .map_err(|e| DavsyncError::Config(format!("invalid WebDAV address: {e}")))?;
        let root_prefix = percent_encoding::percent_decode_str(url.path())
            .decode_utf8_lossy()
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| DavsyncError::Config(format!("building HTTP client: {e}")))?;

        let credentials = cfg.has_credentials().then(|| Credentials {
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            auth_type: cfg.auth_type,
        });

        Ok(Self {
            client,
            base_url: cfg.address.trim_end_matches('/').to_string(),
            root_prefix,
            credentials,
            digest: Mutex::new(None),
        })
    }

    /// Percent-encoded request path (address path included).
    fn encoded_path(&self, path: &str) -> String {
        let mut encoded = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            encoded.push('/');
            encoded.extend(utf8_percent_encode(segment, SEGMENT));
        }
        if encoded.is_empty() || path.ends_with('/') {
            encoded.push('/');
        }
        encoded
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, self.encoded_path(path))
    }

    /// Request URI as it appears on the wire, for the Digest `uri` field.
    fn request_uri(&self, url: &str) -> String {
        Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string())
    }

    fn digest_header(&self, method: &Method, url: &str) -> Option<String> {
        let creds = self.credentials.as_ref()?;
        let mut guard = self.digest.lock().ok()?;
        let session = guard.as_mut()?;
        Some(session.next_header(
            &creds.username,
            &creds.password,
            method.as_str(),
            &self.request_uri(url),
        ))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        depth: Option<Depth>,
        range: Option<BlockRange>,
        body: Option<Bytes>,
    ) -> DavsyncResult<Response> {
        let url = self.url_for(path);

        let build = |authorization: Option<String>| {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .header(CACHE_CONTROL, "no-cache");
            if let Some(depth) = depth {
                req = req.header("Depth", depth.header_value());
            }
            if let Some(range) = range {
                req = req.header(RANGE, range.header_value());
            }
            if let Some(body) = body.clone() {
                if method.as_str() == "PROPFIND" {
                    req = req.header(CONTENT_TYPE, XML_CONTENT_TYPE);
                }
                req = req.body(body);
            }
            match &self.credentials {
                Some(c) if c.auth_type == AuthType::Basic => {
                    req = req.basic_auth(&c.username, Some(&c.password));
                }
                _ => {
                    if let Some(value) = authorization {
                        req = req.header(AUTHORIZATION, value);
                    }
                }
            }
            req
        };

        let resp = build(self.digest_header(&method, &url))
            .send()
            .await
            .map_err(|e| DavsyncError::Transport(format!("{method} {path}: {e}")))?;

        let digest_wanted = self
            .credentials
            .as_ref()
            .is_some_and(|c| c.auth_type == AuthType::Digest);
        if resp.status() != StatusCode::UNAUTHORIZED || !digest_wanted {
            return Ok(resp);
        }

        let challenge = resp
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(DigestChallenge::parse);
        let Some(challenge) = challenge else {
            return Ok(resp);
        };

        debug!(realm = %challenge.realm, "answering Digest challenge");
        if let Ok(mut guard) = self.digest.lock() {
            *guard = Some(DigestSession::new(challenge));
        }

        build(self.digest_header(&method, &url))
            .send()
            .await
            .map_err(|e| DavsyncError::Transport(format!("{method} {path}: {e}")))
    }
}

/// Map non-success statuses onto the error taxonomy.
fn check(resp: Response, path: &str) -> DavsyncResult<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else if status == StatusCode::NOT_FOUND {
        Err(DavsyncError::NotFound(path.to_string()))
    } else {
        Err(DavsyncError::Http {
            status: status.as_u16(),
            path: path.to_string(),
        })
    }
}

fn read_error(path: &str, e: reqwest::Error) -> DavsyncError {
    DavsyncError::Transport(format!("reading response for {path}: {e}"))
}

#[async_trait]
impl DavBackend for HttpBackend {
    async fn propfind(&self, path: &str, depth: Depth) -> DavsyncResult<Vec<DavEntry>> {
        let resp = self
            .send(
                method("PROPFIND")?,
                path,
                Some(depth),
                None,
                Some(Bytes::from_static(multistatus::PROPFIND_BODY.as_bytes())),
            )
            .await?;
        let resp = check(resp, path)?;
        let xml = resp.text().await.map_err(|e| read_error(path, e))?;
        multistatus::parse(&xml, &self.root_prefix)
    }

    async fn get_range(&self, path: &str, range: BlockRange) -> DavsyncResult<Bytes> {
        if range.is_empty() {
            return Ok(Bytes::new());
        }
        let resp = self
            .send(Method::GET, path, None, Some(range), None)
            .await?;
        if resp.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(Bytes::new());
        }
        let resp = check(resp, path)?;
        let partial = resp.status() == StatusCode::PARTIAL_CONTENT;
        let body = resp.bytes().await.map_err(|e| read_error(path, e))?;
        if partial {
            return Ok(body);
        }

        // Server ignored Range and sent the whole object.
        let len = body.len() as u64;
        let start = range.start.min(len) as usize;
        let end = range.end.min(len) as usize;
        Ok(body.slice(start..end))
    }

    async fn put(&self, path: &str, body: Bytes) -> DavsyncResult<()> {
        let resp = self
            .send(Method::PUT, path, None, None, Some(body))
            .await?;
        check(resp, path).map(|_| ())
    }

    async fn delete(&self, path: &str) -> DavsyncResult<()> {
        let resp = self.send(Method::DELETE, path, None, None, None).await?;
        check(resp, path).map(|_| ())
    }

    async fn mkcol(&self, path: &str) -> DavsyncResult<()> {
        let resp = self.send(method("MKCOL")?, path, None, None, None).await?;
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            debug!(path, "MKCOL on existing collection");
            return Ok(());
        }
        check(resp, path).map(|_| ())
    }
}
