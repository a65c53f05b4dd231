//! Error conversion for the MCP server

use rmcp::ErrorData;
use runbook_core::RunbookError;

/// Maps a runbook error to an MCP error. Bad input becomes an invalid-params
/// error so the client can correct its request.
pub fn to_mcp_error(message: &str, error: &RunbookError) -> ErrorData {
    match error {
        RunbookError::InvalidInput { .. }
        | RunbookError::InvalidRegex { .. }
        | RunbookError::Configuration { .. }
        | RunbookError::Serialization { .. }
        | RunbookError::RunNotFound { .. } => {
            ErrorData::invalid_params(format!("{message}: {error}"), None)
        }
        _ => ErrorData::internal_error(format!("{message}: {error}"), None),
    }
}
