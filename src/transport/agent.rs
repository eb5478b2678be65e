use std::fmt;
use std::io::Read;
use std::time::Duration;

use http::header;

use crate::tls::TlsConfig;
use crate::{Response, TransferError};

use super::{Exchange, Progress, Transport};

const READ_CHUNK: usize = 16 * 1024;

/// HTTP over a shared [`ureq::Agent`].
///
/// The agent pools connections, so one transport serves every transfer of a client.
/// An HTTP error status comes back as a [`Response`], never as an error.
///
/// Of the TLS parameters only peer verification is handed to the agent. The rest
/// is left to the agent's TLS provider defaults.
#[derive(Clone)]
pub struct AgentTransport {
    agent: ureq::Agent,
}

impl AgentTransport {
    /// Transport with the given TLS parameters, connect timeout and send/receive
    /// timeout.
    pub fn new(
        tls: &TlsConfig,
        connect_timeout: Option<Duration>,
        io_timeout: Option<Duration>,
    ) -> Self {
        let tls_config = ureq::tls::TlsConfig::builder()
            .disable_verification(!tls.verify_peer())
            .build();

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(tls_config)
            .timeout_connect(connect_timeout)
            .timeout_send_body(io_timeout)
            .timeout_recv_response(io_timeout)
            .timeout_recv_body(io_timeout)
            .build()
            .into();

        AgentTransport { agent }
    }

    /// Transport over an already configured agent.
    ///
    /// The agent should have `http_status_as_error` turned off, otherwise error
    /// statuses become [`TransferError`]s.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        AgentTransport { agent }
    }
}

impl Default for AgentTransport {
    fn default() -> Self {
        AgentTransport::new(
            &TlsConfig::default(),
            Some(Duration::from_secs(30)),
            Some(Duration::from_secs(60)),
        )
    }
}

impl Transport for AgentTransport {
    fn exchange(&self, exchange: Exchange<'_>) -> Result<Response, TransferError> {
        let body = exchange.body();

        let mut request = http::Request::new(body);
        *request.method_mut() = exchange.method().clone();
        *request.uri_mut() = exchange.uri().clone();
        *request.headers_mut() = exchange.headers().clone();

        debug!("{} {}", exchange.method(), exchange.uri());

        let response = self.agent.run(request)?;

        // The response head arrived, so the whole request went out.
        let total = body.len() as u64;
        if total > 0 {
            exchange.report(Progress::Upload { sent: total, total });
        }

        let (parts, mut body) = response.into_parts();

        debug!("Response head: {} {:?}", parts.status, parts.version);

        let total = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let mut reader = body.as_reader();
        let mut received = Vec::new();
        let mut chunk = vec![0_u8; READ_CHUNK];

        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..n]);
            exchange.report(Progress::Download {
                received: received.len() as u64,
                total,
            });
        }

        trace!("Response body: {} bytes", received.len());

        Ok(Response::new(parts.status, parts.headers, received).with_version(parts.version))
    }
}

impl fmt::Debug for AgentTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentTransport").finish()
    }
}
