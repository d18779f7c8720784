mod console;
mod effects;
mod logging;
mod persistence;
mod runtime;

pub(crate) use runtime::run_app;
