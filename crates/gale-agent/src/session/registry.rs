//! Lookup from command name to handler.
//!
//! Dispatch is a table keyed on the command name string. Unknown names are
//! not an error: the interpreter emits a warning line and succeeds, so newer
//! servers can ship commands older agents ignore.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use gale_protocol::{commands, BuildCommand};

use super::BuildSession;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = crate::Result<bool>> + Send + 'a>>;

/// A build command handler. Receives the session and the already
/// interpolated command; returns whether the command succeeded.
pub type Handler = for<'a> fn(&'a mut BuildSession, &'a BuildCommand) -> HandlerFuture<'a>;

pub struct CommandRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl CommandRegistry {
    /// Registry holding the built-in command set.
    pub fn builtin() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(commands::COMPOSE, handle_compose);
        registry.register(commands::ECHO, handle_echo);
        registry.register(commands::EXPORT, handle_export);
        registry.register(commands::EXEC, handle_exec);
        registry.register(commands::MKDIRS, handle_mkdirs);
        registry.register(commands::CLEANDIR, handle_cleandir);
        registry.register(commands::FAIL, handle_fail);
        registry.register(commands::SECRET, handle_secret);
        registry.register(commands::UPLOAD_ARTIFACT, handle_upload_artifact);
        registry.register(commands::DOWNLOAD_ARTIFACT, handle_download_artifact);
        registry.register(commands::GENERATE_TEST_REPORT, handle_generate_test_report);
        registry.register(commands::END, handle_end);
        registry.register(commands::TEST, handle_test);
        registry
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).copied()
    }
}

fn handle_compose<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.compose(c))
}

fn handle_echo<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.echo(c))
}

fn handle_export<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.export(c))
}

fn handle_exec<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.exec(c))
}

fn handle_mkdirs<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.mkdirs(c))
}

fn handle_cleandir<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.cleandir(c))
}

fn handle_fail<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.fail(c))
}

fn handle_secret<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.secret(c))
}

fn handle_upload_artifact<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.upload_artifact(c))
}

fn handle_download_artifact<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.download_artifact(c))
}

fn handle_generate_test_report<'a>(
    s: &'a mut BuildSession,
    c: &'a BuildCommand,
) -> HandlerFuture<'a> {
    Box::pin(s.generate_test_report(c))
}

fn handle_end<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.end(c))
}

fn handle_test<'a>(s: &'a mut BuildSession, c: &'a BuildCommand) -> HandlerFuture<'a> {
    Box::pin(s.test(c))
}
