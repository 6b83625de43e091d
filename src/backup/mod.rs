pub mod backup_config;
pub mod catalog;
pub mod commands;
pub mod dump;
pub mod exec;
pub mod hooks;
pub mod orchestrator;
pub mod path;
pub mod redacted;
pub mod result_error;
pub mod retention;
pub mod tier;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
