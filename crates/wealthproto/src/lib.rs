use serde::{Deserialize, Serialize};
use wealthcrypto::{Ciphertext, PaillierPublicKey};
use wealthregistry::{Address, RegistryError};

pub const PROTO_VER: u32 = 1;

/// One call against the registry. The caller identity is not part of the
/// message; the host binds it to the session.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub proto_ver: u32,
    pub call: Call,
}

impl Request {
    pub fn new(call: Call) -> Self {
        Self {
            proto_ver: PROTO_VER,
            call,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Call {
    Submit { ciphertext: Ciphertext },
    HasSubmitted { who: Address },
    FindRichest { candidates: Vec<Address> },
    Richest,
    PublicKey,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Reply {
    Submitted,
    HasSubmitted(bool),
    Winner(Address),
    /// `None` until a comparison has succeeded.
    Richest(Option<Address>),
    PublicKey(PaillierPublicKey),
    Rejected(Rejection),
}

/// Wire form of a rejected call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    UnsupportedVersion { got: u32, expected: u32 },
    DuplicateSubmission(Address),
    MissingSubmission(Address),
    InvalidCiphertext(String),
    EmptyComparison,
    TooManyCandidates { got: u32, max: u32 },
    DuplicateCandidate(Address),
    /// Coprocessor or internal failure; detail stays in the host log.
    Unavailable,
}

impl From<&RegistryError> for Rejection {
    fn from(e: &RegistryError) -> Self {
        match e {
            RegistryError::DuplicateSubmission(a) => Rejection::DuplicateSubmission(*a),
            RegistryError::MissingSubmission(a) => Rejection::MissingSubmission(*a),
            RegistryError::InvalidCiphertext(why) => Rejection::InvalidCiphertext(why.clone()),
            RegistryError::EmptyComparison => Rejection::EmptyComparison,
            RegistryError::TooManyCandidates { got, max } => Rejection::TooManyCandidates {
                got: u32::try_from(*got).unwrap_or(u32::MAX),
                max: u32::try_from(*max).unwrap_or(u32::MAX),
            },
            RegistryError::DuplicateCandidate(a) => Rejection::DuplicateCandidate(*a),
            RegistryError::Coprocessor(_) | RegistryError::InternalInvariantFailed => {
                Rejection::Unavailable
            }
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::UnsupportedVersion { got, expected } => {
                write!(f, "protocol version {got} not supported (expected {expected})")
            }
            Rejection::DuplicateSubmission(a) => write!(f, "{a} has already submitted"),
            Rejection::MissingSubmission(a) => write!(f, "{a} has not submitted"),
            Rejection::InvalidCiphertext(why) => write!(f, "invalid ciphertext: {why}"),
            Rejection::EmptyComparison => f.write_str("empty comparison list"),
            Rejection::TooManyCandidates { got, max } => {
                write!(f, "{got} candidates exceeds limit {max}")
            }
            Rejection::DuplicateCandidate(a) => write!(f, "{a} listed twice"),
            Rejection::Unavailable => f.write_str("comparison service unavailable"),
        }
    }
}
