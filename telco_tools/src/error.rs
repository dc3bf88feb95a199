use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelcoApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Request failed: {0}")]
    RequestError(String),
    #[error("Invalid response: {0}")]
    ResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
}

impl TelcoApiError {
    /// 404 from the gateway's verify endpoint means the reference is unknown, which is a distinct outcome from
    /// the gateway being unreachable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TelcoApiError::QueryError { status: 404, .. })
    }
}
