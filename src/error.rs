//! Typed error taxonomy for the heartbeat pipeline.
//!
//! Every variant maps to a process exit code. Some failures are expected
//! operating conditions (backoff, timeout) and are logged at debug level
//! rather than as errors.

use thiserror::Error;

/// Exit code for a successful invocation.
pub const SUCCESS: i32 = 0;
/// Exit code for unclassified errors.
pub const ERR_GENERIC: i32 = 1;
/// Exit code when the API returned an error.
pub const ERR_API: i32 = 102;
/// Exit code when the config file could not be parsed.
pub const ERR_CONFIG_FILE_PARSE: i32 = 103;
/// Exit code when the api key is missing or invalid.
pub const ERR_AUTH: i32 = 104;
/// Exit code for config read failures.
pub const ERR_CONFIG_FILE_READ: i32 = 110;
/// Exit code for config write failures.
pub const ERR_CONFIG_FILE_WRITE: i32 = 111;
/// Exit code when sending was postponed due to backoff.
pub const ERR_BACKOFF: i32 = 112;

/// Failure modes of the heartbeat pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid api key, or a 401 from the API.
    #[error("invalid api key... find yours at wakatime.com/api-key. {0}")]
    Auth(String),

    /// A 400 response from the API. Not worth retrying.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The backoff gate declined to send.
    #[error("rate limited: {0}")]
    Backoff(String),

    /// The request exceeded the configured timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Any other non-2xx response or network-level failure.
    #[error("api error: {0}")]
    Api(String),

    /// The user config file could not be parsed.
    #[error("failed to parse config file: {0}")]
    ConfigFileParse(String),

    /// The internal config file could not be read.
    #[error("failed to read config file: {0}")]
    ConfigFileRead(String),

    /// The internal config file could not be written.
    #[error("failed to write config file: {0}")]
    ConfigFileWrite(String),

    /// The offline queue could not be opened (lock contention or corruption).
    #[error("failed to open offline queue: {0}")]
    OpenDb(String),

    /// The offline queue failed mid-operation.
    #[error("offline queue error: {0}")]
    Queue(String),

    /// Unclassified error.
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// The process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Auth(_) => ERR_AUTH,
            Error::BadRequest(_) => ERR_GENERIC,
            Error::Backoff(_) => ERR_BACKOFF,
            Error::Timeout(_) => ERR_GENERIC,
            Error::Api(_) => ERR_API,
            Error::ConfigFileParse(_) => ERR_CONFIG_FILE_PARSE,
            Error::ConfigFileRead(_) => ERR_CONFIG_FILE_READ,
            Error::ConfigFileWrite(_) => ERR_CONFIG_FILE_WRITE,
            Error::OpenDb(_) | Error::Queue(_) | Error::Generic(_) => ERR_GENERIC,
        }
    }

    /// Whether this error should be logged at error level.
    ///
    /// Backoff and timeout are expected conditions; heartbeats flow to the
    /// offline queue instead, so they only get a debug record.
    pub fn should_log_error(&self) -> bool {
        !matches!(self, Error::Backoff(_) | Error::Timeout(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Generic(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(Error::Auth(String::new()).exit_code(), 104);
        assert_eq!(Error::Backoff(String::new()).exit_code(), 112);
        assert_eq!(Error::Api(String::new()).exit_code(), 102);
        assert_eq!(Error::BadRequest(String::new()).exit_code(), 1);
        assert_eq!(Error::Timeout(String::new()).exit_code(), 1);
        assert_eq!(Error::ConfigFileParse(String::new()).exit_code(), 103);
        assert_eq!(Error::ConfigFileRead(String::new()).exit_code(), 110);
        assert_eq!(Error::ConfigFileWrite(String::new()).exit_code(), 111);
        assert_eq!(Error::OpenDb(String::new()).exit_code(), 1);
    }

    #[test]
    fn backoff_and_timeout_are_not_logged_as_errors() {
        assert!(!Error::Backoff(String::new()).should_log_error());
        assert!(!Error::Timeout(String::new()).should_log_error());
        assert!(Error::Auth(String::new()).should_log_error());
        assert!(Error::Api(String::new()).should_log_error());
    }
}
