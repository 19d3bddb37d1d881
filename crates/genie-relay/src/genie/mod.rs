//! Genie backend contract and its REST adapter.

mod client;
mod error;
mod http;
mod types;

pub use client::GenieApi;
pub use error::GenieError;
pub use http::HttpGenieClient;
pub use types::{
    ColumnInfo, GenieAttachment, GenieConversation, GenieMessage, GenieSpace, MessageError,
    PendingMessage, QueryAttachment, QueryResultDescriptor, ResultManifest, ResultSchema,
    StatementResponse, TextAttachment, status,
};
