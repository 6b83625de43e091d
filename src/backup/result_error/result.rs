use crate::backup::result_error::error::Error;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithFunctionName, WithMsg};
use std::fmt::Debug;

pub type Result<T> = std::result::Result<T, Error>;

impl<S: Into<String>, O: Debug + Send + 'static, R> WithDebugObjectAndFnName<S, O> for Result<R> {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        self.map_err(|e| e.with_debug_object_and_fn_name(obj, fn_name))
    }
}

impl<R, S: Into<String>> WithMsg<S> for Result<R> {
    fn with_msg(self, msg: S) -> Self {
        self.map_err(|e| e.with_msg(msg))
    }
}

impl<R, S: Into<String>> WithFunctionName<S> for Result<R> {
    fn with_fn_name(self, fn_name: S) -> Self {
        self.map_err(|e| e.with_fn_name(fn_name))
    }
}

/// Joins a primary outcome with a secondary error that must not be lost.
///
/// Used where a cleanup step (the `after` hooks) runs after a failed step:
/// both errors are kept, the primary one first.
pub fn chain_result<T>(primary: Result<T>, secondary: Result<()>) -> Result<T> {
    match (primary, secondary) {
        (Ok(v), Ok(())) => Ok(v),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e1), Err(e2)) => Err(e1.chain(e2)),
    }
}
