//! The client protocol consumed by the view-syncer (`spec.md` §6 "Client
//! protocol"). Transport (WebSocket framing, auth verification) is an
//! external collaborator (`spec.md` §1); this module only fixes the message
//! vocabulary.

use serde::{Deserialize, Serialize};

use zero_core::Value;

/// A single row mutation included in a `poke`'s patch set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Patch {
    Put { table: String, row_key: String, row: Vec<(String, Value)> },
    Del { table: String, row_key: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDesiredQueries {
    pub client_id: String,
    #[serde(default)]
    pub add: Vec<DesiredQuery>,
    #[serde(default)]
    pub remove: Vec<String>,
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredQuery {
    pub query_hash: String,
    pub ast_json: String,
}

/// Messages the transport forwards from a connected client into the
/// view-syncer (`spec.md` §6 "Upstream messages").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UpstreamMessage {
    InitConnection { client_id: String, cookie: Option<String> },
    ChangeDesiredQueries(ChangeDesiredQueries),
    UpdateAuth { token: String },
    ClearAuth,
    DeleteClients { client_ids: Vec<String> },
    Push { client_id: String, mutations_json: String },
    Inspect,
}

/// Messages the view-syncer emits back through the transport (`spec.md` §6
/// "Downstream messages").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DownstreamMessage {
    Poke {
        patch: Vec<Patch>,
        cookie: String,
        complete: bool,
        error: Option<ErrorKind>,
    },
    Pong,
    Error {
        kind: ErrorKind,
        message: String,
    },
}

/// `spec.md` §6 "Error kinds".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    SchemaVersionNotSupported,
    AuthInvalid,
    MutationDisagreement,
    ReplicaResetRequired,
    Internal,
}

impl From<&zero_core::ZeroError> for ErrorKind {
    fn from(err: &zero_core::ZeroError) -> Self {
        match err {
            zero_core::ZeroError::SchemaDrift(_) => ErrorKind::ReplicaResetRequired,
            zero_core::ZeroError::PermissionDenied => ErrorKind::AuthInvalid,
            zero_core::ZeroError::Timeout(_) => ErrorKind::Internal,
            _ => ErrorKind::Internal,
        }
    }
}
