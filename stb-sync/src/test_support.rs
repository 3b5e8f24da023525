//! Scripted fakes for the shell and database collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use stb_core::{Service, ServiceName};

use crate::db::{Database, DbError};
use crate::shell::{CommandOutput, Shell, ShellCommand, ShellError};

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub dir: PathBuf,
    pub line: String,
    pub envs: Vec<(String, String)>,
}

/// Records every command; answers with scripted output, exit 0 by default.
#[derive(Default)]
pub(crate) struct FakeShell {
    calls: Mutex<Vec<Call>>,
    responses: Mutex<HashMap<(Option<String>, String), CommandOutput>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `line` for every directory.
    pub fn respond(&self, line: &str, stdout: &str, code: i32) {
        self.insert(None, line, stdout, code);
    }

    /// Script `line` only when run inside the directory of `service`.
    pub fn respond_in(&self, service: &str, line: &str, stdout: &str, code: i32) {
        self.insert(Some(service.to_string()), line, stdout, code);
    }

    fn insert(&self, service: Option<String>, line: &str, stdout: &str, code: i32) {
        self.responses.lock().unwrap().insert(
            (service, line.to_string()),
            CommandOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: if code == 0 { String::new() } else { format!("{line} exploded") },
            },
        );
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.line).collect()
    }

    /// Command lines issued inside the directory of `service`.
    pub fn lines_in(&self, service: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| dir_name(&c.dir) == service)
            .map(|c| c.line)
            .collect()
    }
}

impl Shell for FakeShell {
    fn exec(&self, dir: &Path, command: &ShellCommand) -> Result<CommandOutput, ShellError> {
        let line = command.line();
        self.calls.lock().unwrap().push(Call {
            dir: dir.to_path_buf(),
            line: line.clone(),
            envs: command.envs().to_vec(),
        });

        let responses = self.responses.lock().unwrap();
        let scripted = responses
            .get(&(Some(dir_name(dir)), line.clone()))
            .or_else(|| responses.get(&(None, line)));
        Ok(scripted.cloned().unwrap_or(CommandOutput {
            code: Some(0),
            ..CommandOutput::default()
        }))
    }
}

fn dir_name(dir: &Path) -> String {
    ServiceName::from_dir(dir).0
}

/// Which database operation a [`FakeDatabase`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DbCall {
    Drop { service: String, force: bool },
    Create { service: String, parallel: bool },
}

/// Database that is "not configured" for the listed services and succeeds
/// for all others.
#[derive(Default)]
pub(crate) struct FakeDatabase {
    unconfigured: Vec<String>,
    failing: Vec<String>,
    calls: Mutex<Vec<DbCall>>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unconfigured(mut self, service: &str) -> Self {
        self.unconfigured.push(service.to_string());
        self
    }

    /// `create_databases` fails with a shell error for `service`.
    pub fn failing(mut self, service: &str) -> Self {
        self.failing.push(service.to_string());
        self
    }

    pub fn calls(&self) -> Vec<DbCall> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, service: &Service) -> Result<(), DbError> {
        let name = service.name().0;
        if self.unconfigured.contains(&name) {
            return Err(DbError::NotConfigured {
                service: name,
                field: "POSTGRES_USER",
                path: service.dotenv_path(),
            });
        }
        Ok(())
    }
}

impl Database for FakeDatabase {
    fn drop_databases(&self, service: &Service, force: bool) -> Result<(), DbError> {
        self.check(service)?;
        self.calls.lock().unwrap().push(DbCall::Drop {
            service: service.name().0,
            force,
        });
        Ok(())
    }

    fn create_databases(&self, service: &Service, parallel: bool) -> Result<(), DbError> {
        self.check(service)?;
        let name = service.name().0;
        self.calls.lock().unwrap().push(DbCall::Create {
            service: name.clone(),
            parallel,
        });
        if self.failing.contains(&name) {
            return Err(DbError::Shell(ShellError::Failed {
                command: format!("createdb {name}"),
                dir: service.dir.clone(),
                code: 1,
                stderr: "connection refused".to_string(),
            }));
        }
        Ok(())
    }

    fn upgrade_databases(&self, service: &Service, _parallel: bool) -> Result<(), DbError> {
        self.check(service)
    }
}
