//! Line protocol for the control socket.
//!
//! One request per line, one reply line per request:
//!
//! ```text
//! get <param>          ->  <decimal>
//! set <param> <value>  ->  ok
//! status               ->  <json>
//! anything else        ->  err <reason>
//! ```

use crate::error::CtlError;

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get(String),
    Set { param: String, value: String },
    Status,
}

/// Parse one request line. Extra words after a complete request are
/// rejected rather than ignored.
pub fn parse(line: &str) -> Result<Request, CtlError> {
    let mut words = line.split_whitespace();
    let request = match words.next() {
        Some("get") => Request::Get(words.next().ok_or(CtlError::MissingArgument)?.to_owned()),
        Some("set") => {
            let param = words.next().ok_or(CtlError::MissingArgument)?.to_owned();
            let value = words.next().ok_or(CtlError::MissingArgument)?.to_owned();
            Request::Set { param, value }
        }
        Some("status") => Request::Status,
        _ => return Err(CtlError::UnknownCommand),
    };
    if words.next().is_some() {
        return Err(CtlError::UnknownCommand);
    }
    Ok(request)
}

/// Reply line for an error, newline included.
pub fn error_line(e: &CtlError) -> String {
    format!("err {e}\n")
}
