//! Per-service update workflow across a fleet.
//!
//! For every service, in fleet order, inside a [`WorkdirScope`]:
//!
//! 1. stash uncommitted work and check out `master` (`checkout_to_master`)
//! 2. `git pull` (`pull_changes`)
//! 3. `git submodule update --init --recursive`
//! 4. `poetry update` or `poetry install`
//! 5. env refresh from the template (`update_env`)
//! 6. fleet-wide port plan (`update_ports`)
//! 7. database reset (`reset_databases`)
//!
//! A failing step fails the service. Under [`FailurePolicy::Abort`] the rest
//! of the fleet is reported as [`ServiceOutcome::NotRun`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use stb_core::{EnvOverrides, Fleet, Service, ServiceName, StashRecord};

use crate::db::{self, Database, ResetOutcome};
use crate::env;
use crate::ports::PortPlan;
use crate::shell::{Shell, ShellCommand, WorkdirScope};
use crate::writer::save_dotenv;
use crate::SyncError;

const STASH_SEPARATOR: &str = "------------";

/// Which optional steps run. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateOptions {
    pub update_dependencies: bool,
    pub pull_changes: bool,
    pub update_ports: bool,
    pub update_env: bool,
    pub checkout_to_master: bool,
    pub reset_databases: bool,
}

/// What happens to the rest of the fleet after a service fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop; later services are not run.
    #[default]
    Abort,
    /// Record the failure and move on.
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Workdir,
    Checkout,
    Pull,
    Submodules,
    Dependencies,
    Env,
    Ports,
    Databases,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Step::Workdir => "workdir",
            Step::Checkout => "checkout",
            Step::Pull => "pull",
            Step::Submodules => "submodules",
            Step::Dependencies => "dependencies",
            Step::Env => "env",
            Step::Ports => "ports",
            Step::Databases => "databases",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Shell,
    Database,
    Io,
    Other,
}

impl FailureKind {
    fn of(error: &SyncError) -> Self {
        match error {
            SyncError::Shell(_) => FailureKind::Shell,
            SyncError::Database(_) => FailureKind::Database,
            SyncError::Io { .. } => FailureKind::Io,
            SyncError::Discovery(_) | SyncError::PortRangeExhausted { .. } => FailureKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceOutcome {
    /// Every enabled step ran; `skipped` lists steps that had nothing to do.
    Updated { skipped: Vec<Step> },
    Failed {
        step: Step,
        kind: FailureKind,
        message: String,
    },
    /// An earlier service failed under [`FailurePolicy::Abort`].
    NotRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub service: ServiceName,
    pub outcome: ServiceOutcome,
}

impl ServiceReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ServiceOutcome::Failed { .. })
    }
}

/// Result of [`Updater::update_fleet`], one entry per service in fleet order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub services: Vec<ServiceReport>,
    pub stashes: Vec<StashRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl UpdateReport {
    pub fn is_success(&self) -> bool {
        !self.services.iter().any(ServiceReport::is_failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ServiceReport> + '_ {
        self.services.iter().filter(|report| report.is_failed())
    }

    /// The stash notice shown after a run, or `None` when nothing was stashed.
    pub fn stash_summary(&self) -> Option<String> {
        if self.stashes.is_empty() {
            return None;
        }
        let branches: Vec<String> = self.stashes.iter().map(ToString::to_string).collect();
        Some(format!(
            "{STASH_SEPARATOR}\nStashed changes in the following branches: {}",
            branches.join(", ")
        ))
    }
}

struct StepFailure {
    step: Step,
    error: SyncError,
}

trait AtStep<T> {
    fn at(self, step: Step) -> Result<T, StepFailure>;
}

impl<T, E: Into<SyncError>> AtStep<T> for Result<T, E> {
    fn at(self, step: Step) -> Result<T, StepFailure> {
        self.map_err(|error| StepFailure {
            step,
            error: error.into(),
        })
    }
}

/// Drives the update workflow with the given collaborators.
pub struct Updater<'a, S: ?Sized, D: ?Sized> {
    shell: &'a S,
    db: &'a D,
    overrides: &'a EnvOverrides,
    options: UpdateOptions,
    policy: FailurePolicy,
}

impl<'a, S: Shell + ?Sized, D: Database + ?Sized> Updater<'a, S, D> {
    pub fn new(shell: &'a S, db: &'a D, overrides: &'a EnvOverrides) -> Self {
        Self {
            shell,
            db,
            overrides,
            options: UpdateOptions::default(),
            policy: FailurePolicy::default(),
        }
    }

    pub fn options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Update every service of `fleet`.
    ///
    /// Errors only when the port plan cannot be built; per-service failures
    /// are recorded in the report.
    pub fn update_fleet(&self, fleet: &mut Fleet) -> Result<UpdateReport, SyncError> {
        let started_at = Utc::now();
        let plan = if self.options.update_ports {
            Some(PortPlan::for_fleet(fleet)?)
        } else {
            None
        };

        let mut services = Vec::with_capacity(fleet.len());
        let mut stashes = Vec::new();
        let mut halted = false;

        for service in fleet.iter_mut() {
            let name = service.name();
            if halted {
                services.push(ServiceReport {
                    service: name,
                    outcome: ServiceOutcome::NotRun,
                });
                continue;
            }

            let outcome = match self.update_service(service, plan.as_ref(), &mut stashes) {
                Ok(skipped) => {
                    tracing::info!("{name}: updated");
                    ServiceOutcome::Updated { skipped }
                }
                Err(StepFailure { step, error }) => {
                    tracing::error!("{name}: {step} failed: {error}");
                    if self.policy == FailurePolicy::Abort {
                        halted = true;
                    }
                    ServiceOutcome::Failed {
                        step,
                        kind: FailureKind::of(&error),
                        message: error.to_string(),
                    }
                }
            };
            services.push(ServiceReport {
                service: name,
                outcome,
            });
        }

        Ok(UpdateReport {
            services,
            stashes,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn update_service(
        &self,
        service: &mut Service,
        plan: Option<&PortPlan>,
        stashes: &mut Vec<StashRecord>,
    ) -> Result<Vec<Step>, StepFailure> {
        let options = self.options;
        let scope = WorkdirScope::enter(self.shell, &service.dir).at(Step::Workdir)?;

        if options.checkout_to_master {
            if let Some(record) = self.checkout_master(&scope, service).at(Step::Checkout)? {
                stashes.push(record);
            }
        }
        if options.pull_changes {
            scope.run(&ShellCommand::from_words("git pull")).at(Step::Pull)?;
        }
        scope
            .run(&ShellCommand::from_words("git submodule update --init --recursive"))
            .at(Step::Submodules)?;
        let dependencies = if options.update_dependencies {
            "poetry update"
        } else {
            "poetry install"
        };
        scope
            .run(&ShellCommand::from_words(dependencies))
            .at(Step::Dependencies)?;

        if options.update_env {
            env::reconcile(service, self.overrides);
            save_dotenv(service, false).at(Step::Env)?;
        }
        if let Some(plan) = plan {
            plan.apply(service);
            save_dotenv(service, false).at(Step::Ports)?;
        }

        let mut skipped = Vec::new();
        if options.reset_databases {
            let outcome = db::reset(self.db, service, true, true).at(Step::Databases)?;
            if outcome == ResetOutcome::NotConfigured {
                skipped.push(Step::Databases);
            }
        }
        Ok(skipped)
    }

    /// Stash a dirty tree, then check out `master`.
    ///
    /// The branch lookup may fail; the stash is then simply not recorded.
    fn checkout_master(
        &self,
        scope: &WorkdirScope<'_, S>,
        service: &Service,
    ) -> Result<Option<StashRecord>, SyncError> {
        let diff = scope.run(&ShellCommand::from_words("git diff"))?;
        let mut record = None;
        if !diff.stdout.trim().is_empty() {
            scope.run(&ShellCommand::from_words("git stash"))?;
            match scope.exec(&ShellCommand::from_words("git branch --show-current")) {
                Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                    record = Some(StashRecord {
                        service: service.name(),
                        branch: output.stdout.trim().to_string(),
                    });
                }
                Ok(_) => tracing::warn!("{}: stashed changes on an unknown branch", service.name()),
                Err(err) => tracing::warn!("{}: branch lookup failed: {err}", service.name()),
            }
        }
        scope.run(&ShellCommand::from_words("git checkout master"))?;
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
