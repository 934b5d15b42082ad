use thiserror::Error;

/// Faults from power-supply lookups, property reads and the charging switch.
///
/// None of these are fatal to the control loop: lookup and read failures
/// back the loop off to slow polling, switch failures are retried on the
/// next tick.
#[derive(Debug, Error)]
pub enum PowerError {
    #[error("power supply {0} not found")]
    NotFound(String),

    #[error("power supply {name} does not expose {attribute}")]
    PropertyUnsupported { name: String, attribute: &'static str },

    #[error("malformed {attribute} value {value:?} on power supply {name}")]
    Malformed {
        name: String,
        attribute: &'static str,
        value: String,
    },

    #[error("i/o error on {attribute} of power supply {name}: {source}")]
    Io {
        name: String,
        attribute: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reported to control-socket clients.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CtlError {
    #[error("unknown command")]
    UnknownCommand,

    #[error("missing argument")]
    MissingArgument,

    #[error("unknown parameter {0}")]
    UnknownParameter(String),

    /// The write did not parse as a non-negative decimal integer.
    /// The in-memory value is left untouched.
    #[error("invalid input {0:?}")]
    InvalidInput(String),
}
