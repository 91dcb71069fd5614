//! Worker pool for citation verification.
//!
//! A fixed number of worker tasks pull jobs from a shared `async_channel`
//! queue. Every worker shares one `reqwest::Client`, the rate limiters and
//! the query cache, and runs a citation through lookup, scoring and
//! classification before answering on the job's oneshot channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classifier::{LookupContext, Pending, verify_citation};
use crate::db::MetadataSource;
use crate::{Config, MatchResult, ParsedCitation, ProgressEvent};

/// A citation verification job submitted to the pool.
pub struct CitationJob {
    pub citation: ParsedCitation,
    pub index: usize,
    pub total: usize,
    pub result_tx: oneshot::Sender<MatchResult>,
    /// Progress callback for this job (emits Checking, Result, Retrying, ...).
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// A pool of worker tasks that process citation jobs.
///
/// Submit jobs via [`submit()`](ValidationPool::submit) and receive results
/// through the oneshot receiver paired with each job.
pub struct ValidationPool {
    job_tx: async_channel::Sender<CitationJob>,
    pool_handle: JoinHandle<()>,
}

impl ValidationPool {
    /// Create a pool of `config.num_workers` workers over the given sources.
    pub fn new(
        config: Arc<Config>,
        sources: Vec<Arc<dyn MetadataSource>>,
        cancel: CancellationToken,
    ) -> Self {
        let num_workers = config.num_workers.max(1);
        let (job_tx, job_rx) = async_channel::unbounded::<CitationJob>();
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(num_workers)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let sources: Arc<[Arc<dyn MetadataSource>]> = sources.into();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers);
            for worker in 0..num_workers {
                handles.push(tokio::spawn(worker_loop(
                    worker,
                    job_rx.clone(),
                    config.clone(),
                    sources.clone(),
                    client.clone(),
                    cancel.clone(),
                )));
            }
            // Workers hold the remaining receivers; they exit once the queue closes
            drop(job_rx);
            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Submit a job to the pool.
    pub async fn submit(&self, job: CitationJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the queue and wait for every worker to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    worker: usize,
    job_rx: async_channel::Receiver<CitationJob>,
    config: Arc<Config>,
    sources: Arc<[Arc<dyn MetadataSource>]>,
    client: reqwest::Client,
    cancel: CancellationToken,
) {
    tracing::debug!(worker, "worker started");
    // Jobs are drained even after cancellation so that every citation gets a result
    while let Ok(job) = job_rx.recv().await {
        let CitationJob {
            citation,
            index,
            total,
            result_tx,
            progress,
        } = job;

        progress(ProgressEvent::Checking {
            index,
            total,
            title: citation.title.clone().unwrap_or_default(),
        });

        let ctx = LookupContext {
            sources: &sources,
            client: &client,
            timeout: config.db_timeout(),
            candidate_limit: config.candidate_limit,
            rate_limiters: &config.rate_limiters,
            retry: &config.retry,
            cache: config.query_cache.as_deref(),
            progress: progress.as_ref(),
        };
        let result = verify_citation(
            Pending::new(index, citation),
            &ctx,
            &config.weights,
            config.verify_threshold,
            &cancel,
        )
        .await;

        progress(ProgressEvent::Result {
            index,
            total,
            result: Box::new(result.clone()),
        });
        let _ = result_tx.send(result);
    }
    tracing::debug!(worker, "worker finished");
}
