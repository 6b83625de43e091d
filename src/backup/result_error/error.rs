use crate::backup::result_error::{WithDebugObjectAndFnName, WithFunctionName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(
        "Command exited with status {} in environment {:?}: {}\n{}",
        display_status(status),
        environment,
        command,
        indent::indent_all_with("  ", stderr.to_string())
    )]
    CommandFailure {
        environment: String,
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("Command timed out after {:?} in environment {:?}: {}", timeout, environment, command)]
    CommandTimeout {
        environment: String,
        command: String,
        timeout: Duration,
    },
    #[error("No database to back up")]
    EmptyCatalog,
    #[error("Unknown maintenance profile {0:?}")]
    UnknownProfile(String),
    #[error("Unknown execution environment {0:?}")]
    UnknownEnvironment(String),
    #[error("Invalid name {0:?}")]
    InvalidName(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { fn_name: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "<terminated by signal>".to_string(),
    }
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> WithFunctionName<S> for Error {
    fn with_fn_name(self, fn_name: S) -> Self {
        Self::WithFnName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// The innermost error, with every message and function-name wrapper removed.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithMsg { error, .. }
            | Error::WithFnName { error, .. }
            | Error::WithDebugObjAndFnName { error, .. } => error.root(),
            e => e,
        }
    }
}
