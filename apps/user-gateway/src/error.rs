use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Who caused the failure decides what the caller may see. Client errors
/// echo their message; server and security details stay in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Client,
    Server,
    Security,
}

#[derive(Debug)]
pub struct GatewayError {
    pub severity: Severity,
    pub code: &'static str,
    detail: String,
}

impl GatewayError {
    pub fn client(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Client,
            code,
            detail: message.into(),
        }
    }

    pub fn server(code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Server,
            code,
            detail: detail.into(),
        }
    }

    pub fn security(code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Security,
            code,
            detail: detail.into(),
        }
    }

    /// What goes over the wire.
    pub fn public_message(&self) -> &str {
        match self.severity {
            Severity::Client => &self.detail,
            Severity::Server => "Operation failed",
            Severity::Security => "Access denied",
        }
    }

    /// What goes in the log.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn log(&self, context: &str) {
        match self.severity {
            Severity::Client => {
                tracing::debug!(code = self.code, detail = %self.detail, "{context}: client error")
            }
            Severity::Server => {
                tracing::error!(code = self.code, detail = %self.detail, "{context}: server error")
            }
            Severity::Security => {
                tracing::warn!(code = self.code, detail = %self.detail, "{context}: security error")
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.log("http request failed");
        let status = match self.severity {
            Severity::Client => StatusCode::BAD_REQUEST,
            Severity::Server => StatusCode::INTERNAL_SERVER_ERROR,
            Severity::Security => StatusCode::UNAUTHORIZED,
        };
        (status, self.public_message().to_string()).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
