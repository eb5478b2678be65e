use http::{HeaderMap, StatusCode, Version};

/// An HTTP request, as handed to [`Client::send`][crate::Client::send].
///
/// The request is opaque to the transfer machinery; it's only moved to whatever
/// transport performs the exchange.
pub type Request = http::Request<Vec<u8>>;

/// A received HTTP response.
///
/// Produced the same way by every backend. A non-2xx status is still a
/// `Response`, it's up to the caller to interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    /// Create a new HTTP/1.1 response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Response {
            status,
            version: Version::HTTP_11,
            headers,
            body: body.into(),
        }
    }

    /// Set the version the server answered with.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Tell if the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// HTTP version of the response.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Response headers, duplicates preserved in arrival order.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Entire response body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Take the body out of the response.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// Check that a request names somewhere to send it.
pub(crate) fn check_target(request: &Request) -> Result<(), crate::Error> {
    let uri = request.uri();

    if uri.host().map(|h| h.is_empty()).unwrap_or(true) {
        return Err(crate::Error::InvalidTransfer(format!(
            "request has no usable target: {:?}",
            uri.to_string()
        )));
    }

    match uri.scheme_str() {
        Some("http") | Some("https") => Ok(()),
        Some(v) => Err(crate::Error::InvalidTransfer(format!(
            "unrecognized scheme: {}",
            v
        ))),
        None => Err(crate::Error::InvalidTransfer("request uri has no scheme".into())),
    }
}
