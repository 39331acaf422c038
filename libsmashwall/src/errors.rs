use std::fmt::Formatter;

#[derive(Debug, PartialEq)]
pub enum SwError {
    /// Parameter is the rejected month token
    InvalidMonth(String),
    /// Parameter is the rejected resolution token
    InvalidResolution(String),
    ErrorCreatingDestinationDirectory(String),
    UnknownError(String),
    /// parameters are file path, additional error message
    FileOperationError {
        file_name: String,
        message: String,
    },
    /// Parameter is the url that timed out
    Timeout(String),
    NetworkError(String),
    ErrorStatusCode {
        status_code: u16,
        url: String,
    },
    InvalidUrl(String),
}

impl SwError {
    /// Sorts a failed request into timeout, error status or plain network failure.
    pub(crate) fn from_request_error(e: reqwest::Error, url: &str) -> Self {
        if e.is_timeout() {
            SwError::Timeout(url.to_string())
        } else if let Some(status) = e.status() {
            SwError::ErrorStatusCode {
                status_code: status.as_u16(),
                url: url.to_string(),
            }
        } else if e.is_builder() {
            SwError::InvalidUrl(url.to_string())
        } else {
            SwError::NetworkError(e.to_string())
        }
    }
}

impl std::fmt::Display for SwError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            SwError::InvalidMonth(token) => format!("Month is not valid : {token}"),
            SwError::InvalidResolution(token) => {
                format!("Resolution is not valid : {token}")
            }
            SwError::ErrorCreatingDestinationDirectory(err) => {
                format!("error creating destination directory. {err}")
            }
            SwError::UnknownError(err) => format!("an unknown error occurred. {err}"),
            SwError::FileOperationError { file_name, message } => {
                format!("{message} : {file_name}")
            }
            SwError::Timeout(url) => format!("Connection timed out. {url}"),
            SwError::NetworkError(err) => format!("Unable to establish connection. {err}"),
            SwError::ErrorStatusCode { status_code, url } => {
                format!("Error {status_code} : {url}")
            }
            SwError::InvalidUrl(url) => format!("Invalid url received : {url}"),
        };
        write!(f, "{str}")
    }
}

impl std::error::Error for SwError {}
