//! Error types for rsfairplay.
//!
//! Every failure carries a FairPlay Streaming [`Status`]; that code is what a
//! client sees in the `status` field of its create-ckc result.

use std::fmt;

use thiserror::Error;

/// FairPlay Streaming status codes.
///
/// The numeric values are part of the wire contract with key server clients
/// and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Success.
    NoErr = 0,
    /// SPC container version is not 1 or 2.
    SpcVersionErr = -42580,
    /// A TLLV in the SPC is malformed.
    ParserErr = -42581,
    /// A required or requested TLLV is absent from the SPC.
    MissingRequiredTagErr = -42583,
    /// Invalid input parameter.
    ParamErr = -42585,
    /// Allocation failure.
    MemoryErr = -42586,
    /// Unsupported protocol version.
    VersionErr = -42590,
    /// The same TLLV tag appeared twice in the SPC.
    DupTagErr = -42591,
    /// Internal server failure.
    InternalErr = -42601,
    /// The client device does not satisfy the content security requirements.
    ClientSecurityLevelErr = -42604,
    /// The SPC was not encrypted for this server's credentials.
    InvalidCertificateErr = -42605,
    /// The requested functionality is not available.
    NotImplementedErr = -42612,
}

impl Status {
    /// Numeric status code as reported to clients.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a numeric code back to a known status.
    ///
    /// Unknown codes (for instance from the vendor key payload library) map to
    /// `InternalErr`.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Status::NoErr,
            -42580 => Status::SpcVersionErr,
            -42581 => Status::ParserErr,
            -42583 => Status::MissingRequiredTagErr,
            -42585 => Status::ParamErr,
            -42586 => Status::MemoryErr,
            -42590 => Status::VersionErr,
            -42591 => Status::DupTagErr,
            -42601 => Status::InternalErr,
            -42604 => Status::ClientSecurityLevelErr,
            -42605 => Status::InvalidCertificateErr,
            -42612 => Status::NotImplementedErr,
            _ => Status::InternalErr,
        }
    }

    /// Protocol name of the status, as used in the FairPlay documentation.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Status::NoErr => "noErr",
            Status::SpcVersionErr => "spcVersionErr",
            Status::ParserErr => "parserErr",
            Status::MissingRequiredTagErr => "missingRequiredTagErr",
            Status::ParamErr => "paramErr",
            Status::MemoryErr => "memoryErr",
            Status::VersionErr => "versionErr",
            Status::DupTagErr => "dupTagErr",
            Status::InternalErr => "internalErr",
            Status::ClientSecurityLevelErr => "clientSecurityLevelErr",
            Status::InvalidCertificateErr => "invalidCertificateErr",
            Status::NotImplementedErr => "notImplementedErr",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Main error type for rsfairplay operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A protocol failure with the status reported to the client.
    #[error("{status}: {message}")]
    Fps { status: Status, message: String },

    /// RSA error.
    #[error("RSA error: {0}")]
    RsaError(#[from] rsa::Error),

    /// PKCS1 error.
    #[error("PKCS1 error: {0}")]
    Pkcs1Error(#[from] rsa::pkcs1::Error),

    /// PKCS8 error.
    #[error("PKCS8 error: {0}")]
    Pkcs8Error(#[from] rsa::pkcs8::Error),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    /// Hex decode error.
    #[error("Hex decode error: {0}")]
    HexDecodeError(#[from] hex::FromHexError),

    /// JSON error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML configuration error.
    #[error("Config error: {0}")]
    ConfigError(#[from] serde_yaml::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a protocol error.
    pub fn fps(status: Status, message: impl Into<String>) -> Self {
        Error::Fps {
            status,
            message: message.into(),
        }
    }

    /// Status code reported for this error.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Error::Fps { status, .. } => *status,
            Error::RsaError(_) => Status::InvalidCertificateErr,
            Error::Base64DecodeError(_) | Error::HexDecodeError(_) | Error::JsonError(_) => {
                Status::ParamErr
            }
            Error::Pkcs1Error(_) | Error::Pkcs8Error(_) | Error::ConfigError(_) => {
                Status::InternalErr
            }
            Error::IoError(_) | Error::Other(_) => Status::InternalErr,
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Fps {
            status,
            message: status.name().to_string(),
        }
    }
}

/// Result type alias for rsfairplay operations.
pub type Result<T> = std::result::Result<T, Error>;
