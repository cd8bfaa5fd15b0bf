//! `job-controller`: tracks Job revisions so failed Jobs can be re-run.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::batch::v1::Job;
use tracing::debug;

use super::worker::{DEFAULT_RESYNC, run_sync_loop};
use super::{Activation, ControllerName, Result, Runnable};
use crate::informers::{Informer, InformerFactory};
use crate::shutdown::Shutdown;

pub struct JobController {
    jobs: Arc<Informer<Job>>,
}

impl Runnable for JobController {
    fn start(self: Box<Self>, shutdown: Shutdown) -> BoxFuture<'static, Result<()>> {
        let jobs = self.jobs.store();
        run_sync_loop(
            ControllerName::Job,
            vec![self.jobs.wait_until_synced()],
            DEFAULT_RESYNC,
            shutdown,
            move || {
                let state = jobs.state();
                let finished = state.iter().filter(|job| is_finished(job)).count();
                debug!(jobs = state.len(), finished, "Job resync");
            },
        )
        .boxed()
    }
}

/// Whether the Job has reached a terminal condition
pub fn is_finished(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| (c.type_ == "Complete" || c.type_ == "Failed") && c.status == "True")
        })
}

pub fn job_controller(kubernetes: &InformerFactory) -> Activation {
    Activation::enabled(JobController {
        jobs: kubernetes.informer(),
    })
}
