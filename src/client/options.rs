//! Options used to configure a [`Client`](crate::Client).

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
    time::Duration,
};

use typed_builder::TypedBuilder;

use crate::error::{Error, Result};

/// The address of a ZTeraDB server.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ServerAddress {
    /// The hostname or IP address of the server.
    pub host: String,

    /// The port the server listens on.
    pub port: u16,
}

impl ServerAddress {
    pub(crate) fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for ServerAddress {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port)
    }
}

/// The deployment environment a client addresses. The environment is attached
/// to every query payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Env {
    /// The development environment.
    Dev,
    /// The staging environment.
    Staging,
    /// The quality assurance environment.
    Qa,
    /// The production environment.
    Prod,
}

impl Env {
    /// The environment name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Env::Dev => "dev",
            Env::Staging => "staging",
            Env::Qa => "qa",
            Env::Prod => "prod",
        }
    }
}

impl Display for Env {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for Env {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" => Ok(Env::Dev),
            "staging" => Ok(Env::Staging),
            "qa" => Ok(Env::Qa),
            "prod" => Ok(Env::Prod),
            other => Err(Error::configuration(format!(
                "'{other}' is not a valid env (expected one of: dev, staging, qa, prod)"
            ))),
        }
    }
}

/// The format the server uses for response data. Only JSON is currently
/// supported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseDataType {
    /// JSON response payloads.
    #[default]
    Json,
}

impl ResponseDataType {
    /// The format name as configured.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseDataType::Json => "json",
        }
    }
}

impl FromStr for ResponseDataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ResponseDataType::Json),
            other => Err(Error::configuration(format!(
                "'{other}' is not a valid response_data_type (expected one of: json)"
            ))),
        }
    }
}

/// Options governing the client's connection pool.
#[derive(Clone, Debug, Default, TypedBuilder)]
#[non_exhaustive]
pub struct PoolOptions {
    /// The number of sessions the pool opens eagerly at construction. The
    /// prewarm runs concurrently; sessions join the pool as each handshake
    /// completes. Defaults to 0.
    #[builder(default)]
    pub min_pool_size: u32,

    /// The maximum number of live sessions, counting leased ones. When 0 (the
    /// default) the limit is not enforced and the pool grows on demand.
    #[builder(default)]
    pub max_pool_size: u32,

    /// How long an `acquire` may wait for a session to be returned when the
    /// pool is at `max_pool_size`. Defaults to 10 seconds.
    #[builder(default, setter(strip_option))]
    pub wait_queue_timeout: Option<Duration>,
}

/// The credentials and settings used to construct a [`Client`](crate::Client).
///
/// ```
/// use zteradb::{ClientOptions, Env};
///
/// let options = ClientOptions::builder()
///     .client_key("2AKOHVT0VO81B9KSUJP8Q5PIKW")
///     .access_key("4SVOHVT0VO81B9KSUJP8Q4PIFS")
///     .secret_key("7fbb52c011ecafaa9a1d1b8683dd661c")
///     .database_id("db-main")
///     .env(Env::Dev)
///     .build();
/// ```
#[derive(Clone, TypedBuilder)]
#[non_exhaustive]
pub struct ClientOptions {
    /// The key identifying this client to the server.
    #[builder(setter(into))]
    pub client_key: String,

    /// The account access key.
    #[builder(setter(into))]
    pub access_key: String,

    /// The shared secret the handshake proof is derived from. Never sent on
    /// the wire.
    #[builder(setter(into))]
    pub secret_key: String,

    /// The database queries are addressed to.
    #[builder(setter(into))]
    pub database_id: String,

    /// The deployment environment.
    pub env: Env,

    /// The response data format. Defaults to [`ResponseDataType::Json`].
    #[builder(default)]
    pub response_data_type: ResponseDataType,

    /// Bounds each handshake read when establishing a session. Unset means
    /// the handshake waits indefinitely.
    #[builder(default, setter(strip_option))]
    pub connect_timeout: Option<Duration>,

    /// Connection pool configuration.
    #[builder(default)]
    pub pool_options: PoolOptions,
}

impl fmt::Debug for ClientOptions {
    // The secret key never appears in logs or error output.
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        fmt.debug_struct("ClientOptions")
            .field("client_key", &self.client_key)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("database_id", &self.database_id)
            .field("env", &self.env)
            .field("response_data_type", &self.response_data_type)
            .field("connect_timeout", &self.connect_timeout)
            .field("pool_options", &self.pool_options)
            .finish()
    }
}

impl ClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.client_key.is_empty() {
            return Err(Error::configuration("client_key must be a non-empty string"));
        }

        if self.access_key.is_empty() {
            return Err(Error::configuration("access_key must be a non-empty string"));
        }

        if self.secret_key.is_empty() {
            return Err(Error::configuration("secret_key must be a non-empty string"));
        }

        if self.database_id.is_empty() {
            return Err(Error::configuration("database_id must be a non-empty string"));
        }

        if matches!(self.connect_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(Error::configuration(
                "connect_timeout must be a positive duration",
            ));
        }

        let pool = &self.pool_options;
        if matches!(pool.wait_queue_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(Error::configuration(
                "wait_queue_timeout must be a positive duration",
            ));
        }

        if pool.max_pool_size > 0 && pool.min_pool_size > pool.max_pool_size {
            return Err(Error::configuration(format!(
                "connection pool min size ({}) must not exceed max size ({})",
                pool.min_pool_size, pool.max_pool_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    fn options() -> ClientOptions {
        ClientOptions::builder()
            .client_key("ck")
            .access_key("ak")
            .secret_key("sk")
            .database_id("db")
            .env(Env::Dev)
            .build()
    }

    #[test]
    fn default_options_validate() {
        assert!(options().validate().is_ok());
    }

    #[test]
    fn empty_credential_fields_are_rejected_by_name() {
        let mut bad = options();
        bad.client_key = String::new();
        let err = bad.validate().unwrap_err();
        assert!(err.message().unwrap().contains("client_key"));

        let mut bad = options();
        bad.secret_key = String::new();
        let err = bad.validate().unwrap_err();
        assert!(err.message().unwrap().contains("secret_key"));

        let mut bad = options();
        bad.database_id = String::new();
        let err = bad.validate().unwrap_err();
        assert!(err.message().unwrap().contains("database_id"));
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let mut bad = options();
        bad.connect_timeout = Some(Duration::ZERO);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn pool_bounds_are_checked() {
        let mut bad = options();
        bad.pool_options = PoolOptions::builder().min_pool_size(5).max_pool_size(2).build();
        let err = bad.validate().unwrap_err();
        assert!(err.message().unwrap().contains("min size (5)"));

        // max == 0 means unenforced, so any min is fine.
        let mut ok = options();
        ok.pool_options = PoolOptions::builder().min_pool_size(5).build();
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn env_and_response_data_type_parse_from_strings() {
        assert_eq!("qa".parse::<Env>().unwrap(), Env::Qa);
        assert_eq!(Env::Prod.as_str(), "prod");
        let err = "production".parse::<Env>().unwrap_err();
        assert!(err.message().unwrap().contains("'production'"));

        assert_eq!(
            "json".parse::<ResponseDataType>().unwrap(),
            ResponseDataType::Json
        );
        assert!("xml".parse::<ResponseDataType>().is_err());
    }
}
