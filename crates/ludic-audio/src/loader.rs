//! Background load pipeline
//!
//! Decode work runs on a small pool of worker threads so loading a large file
//! never stalls the game loop or the mixer callback. Jobs are two-phase: the
//! heavy phase (open, decode, convert) runs on a worker without touching any
//! mixer state, then a completion closure is queued back to the owning thread
//! and run from [`drain_completions`](LoadPipeline::drain_completions), where
//! it binds the result and invokes the caller's callback exactly once.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};

/// A unit of decode work run on a worker thread.
pub(crate) type WorkerJob = Box<dyn FnOnce() + Send>;

/// A closure run on the owning thread after its job finishes.
pub(crate) type Completion = Box<dyn FnOnce() + Send>;

/// Worker pool plus the completion queue back to the owning thread.
pub(crate) struct LoadPipeline {
    jobs: Option<Sender<WorkerJob>>,
    workers: Vec<JoinHandle<()>>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
}

impl LoadPipeline {
    pub fn new(num_workers: usize) -> Self {
        let (jobs, job_rx) = unbounded::<WorkerJob>();
        let (completion_tx, completion_rx) = unbounded::<Completion>();

        let workers = (0..num_workers.max(1))
            .map(|i| {
                let rx = job_rx.clone();
                thread::Builder::new()
                    .name(format!("audio-load-{i}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            job();
                        }
                    })
                    .unwrap_or_else(|e| panic!("failed to spawn audio load worker: {e}"))
            })
            .collect();

        Self {
            jobs: Some(jobs),
            workers,
            completion_tx,
            completion_rx,
        }
    }

    /// Queue a job on the worker pool.
    pub fn submit(&self, job: WorkerJob) {
        if let Some(jobs) = &self.jobs {
            // The receiver outlives the sender while workers run.
            let _ = jobs.send(job);
        }
    }

    /// Sender that jobs use to queue their completion closure.
    pub fn completion_sender(&self) -> Sender<Completion> {
        self.completion_tx.clone()
    }

    /// Run every queued completion closure. Call from the owning thread.
    pub fn drain_completions(&self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            completion();
        }
    }
}

impl Drop for LoadPipeline {
    fn drop(&mut self) {
        // Closing the job channel lets the workers drain and exit.
        self.jobs.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        // Completions queued by the last jobs still run exactly once.
        self.drain_completions();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_and_completions_drain_on_caller() {
        let pipeline = LoadPipeline::new(2);
        let ran = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let ran = ran.clone();
            let completed = completed.clone();
            let tx = pipeline.completion_sender();
            pipeline.submit(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(Box::new(move || {
                    completed.fetch_add(1, Ordering::SeqCst);
                }));
            }));
        }

        // Completions only fire when drained from this thread.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while completed.load(Ordering::SeqCst) < 8 {
            assert!(std::time::Instant::now() < deadline, "pipeline stalled");
            pipeline.drain_completions();
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_drop_joins_workers() {
        let pipeline = LoadPipeline::new(1);
        let done = Arc::new(AtomicUsize::new(0));
        let d = done.clone();
        pipeline.submit(Box::new(move || {
            d.fetch_add(1, Ordering::SeqCst);
        }));
        drop(pipeline);
        // Drop waits for the queue to drain before joining.
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_runs_pending_completions_once() {
        let pipeline = LoadPipeline::new(1);
        let completed = Arc::new(AtomicUsize::new(0));

        let c = completed.clone();
        let tx = pipeline.completion_sender();
        pipeline.submit(Box::new(move || {
            let _ = tx.send(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        // Tear down without ever draining; the callback still fires once.
        drop(pipeline);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
}
