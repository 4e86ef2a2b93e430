//! Offloading template generation from async hosts.

use std::sync::Arc;

use log::warn;
use serde::Deserialize;

use crate::{generate_template, Result, TemplateConfig, TemplateDocument, TemplateMap, TemplateSource};

/// Complete input of one generation call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateJob {
    pub source: Option<TemplateSource>,
    pub map: Option<TemplateMap>,
    #[serde(default)]
    pub config: TemplateConfig,
}

impl TemplateJob {
    pub fn run(&self) -> Result<TemplateDocument> {
        generate_template(self.source.as_ref(), self.map.as_ref(), &self.config)
    }
}

/// Run `job` on the blocking thread pool.
///
/// If the blocking task cannot complete the job is run again on the calling
/// task. Dropping the returned future detaches a running job; its result is
/// discarded. Must be polled inside a tokio runtime.
pub async fn submit(job: TemplateJob) -> Result<TemplateDocument> {
    let job = Arc::new(job);
    let task = tokio::task::spawn_blocking({
        let job = Arc::clone(&job);
        move || job.run()
    });
    match task.await {
        Ok(res) => res,
        Err(e) => {
            warn!("template worker failed: {e}, generating in-process");
            job.run()
        }
    }
}
