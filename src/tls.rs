//! Transport security configuration
//!
//! A [`TlsConfig`] bundles every TLS parameter a transport might need so a
//! [`Client`][crate::Client] can take it whole instead of growing a huge signature.
//! It is validated once on construction, then shared read-only between all
//! transfers of a client.

use std::collections::BTreeMap;
use std::fmt;

use crate::Error;

/// Which TLS protocol versions to negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsProtocol {
    /// Whatever the transport considers secure.
    #[default]
    Default,
    /// TLS 1.2 only.
    Tls12,
    /// TLS 1.3 only.
    Tls13,
}

/// Named boolean options.
///
/// The disable-version options are inverted, i.e. `NoTls10 = true` means TLS 1.0
/// must not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum TlsOption {
    Compression,
    NoTls10,
    NoTls11,
    NoTls12,
    ServerCipherPreference,
    SingleDhUse,
    SingleEcdhUse,
}

impl TlsOption {
    const ALL: [TlsOption; 7] = [
        TlsOption::Compression,
        TlsOption::NoTls10,
        TlsOption::NoTls11,
        TlsOption::NoTls12,
        TlsOption::ServerCipherPreference,
        TlsOption::SingleDhUse,
        TlsOption::SingleEcdhUse,
    ];

    /// Look up an option by its configuration name.
    pub fn from_name(name: &str) -> Option<TlsOption> {
        TlsOption::ALL.into_iter().find(|o| o.name() == name)
    }

    /// Configuration name of the option.
    pub fn name(&self) -> &'static str {
        match self {
            TlsOption::Compression => "compression",
            TlsOption::NoTls10 => "no tls v1",
            TlsOption::NoTls11 => "no tls v1.1",
            TlsOption::NoTls12 => "no tls v1.2",
            TlsOption::ServerCipherPreference => "server cipher preference",
            TlsOption::SingleDhUse => "single dh use",
            TlsOption::SingleEcdhUse => "single ecdh use",
        }
    }
}

/// Client key material.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsKey {
    data: Vec<u8>,
    pass_phrase: Vec<u8>,
}

impl TlsKey {
    /// Key data, typically PEM.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        TlsKey {
            data: data.into(),
            pass_phrase: Vec::new(),
        }
    }

    /// Set the pass phrase protecting the key.
    pub fn with_pass_phrase(mut self, pass_phrase: impl Into<Vec<u8>>) -> Self {
        self.pass_phrase = pass_phrase.into();
        self
    }

    /// The key data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The pass phrase, empty if none.
    pub fn pass_phrase(&self) -> &[u8] {
        &self.pass_phrase
    }
}

impl fmt::Debug for TlsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log key material.
        f.debug_struct("TlsKey")
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

/// Validated TLS parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    protocol: TlsProtocol,
    key: Option<TlsKey>,
    options: BTreeMap<TlsOption, bool>,
    verify_peer: bool,
}

impl TlsConfig {
    /// Start building a configuration from the secure defaults.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder {
            protocol: TlsProtocol::Default,
            key: None,
            options: Vec::new(),
            verify_peer: true,
        }
    }

    /// Negotiated protocol.
    pub fn protocol(&self) -> TlsProtocol {
        self.protocol
    }

    /// Client key, if any.
    pub fn key(&self) -> Option<&TlsKey> {
        self.key.as_ref()
    }

    /// Value of an option, `None` if not set.
    pub fn option(&self, option: TlsOption) -> Option<bool> {
        self.options.get(&option).copied()
    }

    /// All set options.
    pub fn options(&self) -> impl Iterator<Item = (TlsOption, bool)> + '_ {
        self.options.iter().map(|(k, v)| (*k, *v))
    }

    /// Whether the peer certificate is verified.
    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        let mut options = BTreeMap::new();
        // CRIME
        options.insert(TlsOption::Compression, false);

        TlsConfig {
            protocol: TlsProtocol::Default,
            key: None,
            options,
            verify_peer: true,
        }
    }
}

/// Builder for [`TlsConfig`].
#[derive(Debug)]
pub struct TlsConfigBuilder {
    protocol: TlsProtocol,
    key: Option<TlsKey>,
    options: Vec<(String, bool)>,
    verify_peer: bool,
}

impl TlsConfigBuilder {
    /// Protocol to negotiate.
    pub fn protocol(mut self, protocol: TlsProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Client key.
    pub fn key(mut self, key: TlsKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Set a named option, e.g. `"no tls v1.1"`. Unknown names fail in `build()`.
    pub fn option(mut self, name: impl Into<String>, value: bool) -> Self {
        self.options.push((name.into(), value));
        self
    }

    /// Disable peer verification.
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<TlsConfig, Error> {
        let mut config = TlsConfig::default();
        config.protocol = self.protocol;
        config.verify_peer = self.verify_peer;

        for (name, value) in self.options {
            let Some(option) = TlsOption::from_name(&name) else {
                return Err(Error::InvalidTlsConfig(format!("unknown option: {:?}", name)));
            };
            config.options.insert(option, value);
        }

        if let Some(key) = self.key {
            if key.data().is_empty() {
                return Err(Error::InvalidTlsConfig("empty key data".into()));
            }
            config.key = Some(key);
        }

        let disables = |o: TlsOption| config.option(o).unwrap_or(false);
        let conflict = match config.protocol {
            TlsProtocol::Tls12 => disables(TlsOption::NoTls12),
            TlsProtocol::Tls13 | TlsProtocol::Default => false,
        };
        if conflict {
            return Err(Error::InvalidTlsConfig(format!(
                "protocol {:?} is disabled by options",
                config.protocol
            )));
        }

        Ok(config)
    }
}
