//! OCR worker pool
//!
//! A fixed set of threads, each owning one OCR worker, pulls batches from a
//! shared queue. Every job carries its own reply channel so the caller can
//! wait for exactly the jobs it submitted.

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

use super::ocr::{expand_whitelist, OcrEngine, OcrText, OcrWorker};

/// Regions of one batch that share a whitelist
#[derive(Debug, Clone)]
pub struct JobSegment {
    pub char_set: String,
    /// Region name and its pixels
    pub items: Vec<(String, RgbaImage)>,
}

/// A batch of OCR work for one worker
#[derive(Debug)]
pub struct OcrJob {
    pub segments: Vec<JobSegment>,
    pub reply: Sender<BatchOutcome>,
}

/// Per-region results of one job, in no particular order
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<(String, Result<OcrText, String>)>,
}

/// Thread pool running OCR jobs
pub struct OcrWorkerPool {
    sender: Option<Sender<OcrJob>>,
    handles: Vec<JoinHandle<()>>,
}

impl OcrWorkerPool {
    /// Start `size` worker threads (at least one)
    pub fn new(engine: Arc<dyn OcrEngine>, size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<OcrJob>();

        let handles = (0..size)
            .map(|index| {
                let engine = engine.clone();
                let receiver = receiver.clone();
                std::thread::spawn(move || run_worker(index, engine, receiver))
            })
            .collect();

        info!("Started OCR worker pool with {} workers ({})", size, engine.name());

        Self {
            sender: Some(sender),
            handles,
        }
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queue a job; its outcome is sent on the job's reply channel
    pub fn submit(&self, job: OcrJob) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("OCR worker pool is shut down"))?;
        sender
            .send(job)
            .map_err(|_| anyhow::anyhow!("OCR worker pool queue is closed"))
    }
}

impl Drop for OcrWorkerPool {
    fn drop(&mut self) {
        // Closing the queue lets every worker loop exit
        self.sender.take();

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        debug!("OCR worker pool stopped");
    }
}

fn run_worker(index: usize, engine: Arc<dyn OcrEngine>, receiver: Receiver<OcrJob>) {
    let mut worker = match engine.spawn_worker() {
        Ok(worker) => Some(worker),
        Err(e) => {
            error!("OCR worker {} failed to start: {:#}", index, e);
            None
        }
    };
    let mut configured: Option<String> = None;

    while let Ok(job) = receiver.recv() {
        let mut outcome = BatchOutcome::default();

        for segment in job.segments {
            debug!(
                "OCR worker {}: {} regions with whitelist {:?}",
                index,
                segment.items.len(),
                segment.char_set
            );
            let names: Vec<String> = segment.items.iter().map(|(name, _)| name.clone()).collect();
            let processed = panic::catch_unwind(AssertUnwindSafe(|| {
                process_segment(worker.as_deref_mut(), &mut configured, segment, &mut outcome)
            }));

            if processed.is_err() {
                error!("OCR worker {} panicked, replacing its backend worker", index);
                for name in names {
                    if !outcome.results.iter().any(|(done, _)| *done == name) {
                        outcome.results.push((name, Err("OCR worker panicked".to_string())));
                    }
                }
                configured = None;
                worker = match engine.spawn_worker() {
                    Ok(worker) => Some(worker),
                    Err(e) => {
                        error!("OCR worker {} failed to restart: {:#}", index, e);
                        None
                    }
                };
            }
        }

        // The requester may have given up; nothing to do about it here
        let _ = job.reply.send(outcome);
    }

    debug!("OCR worker {} exiting", index);
}

fn process_segment(
    worker: Option<&mut (dyn OcrWorker + 'static)>,
    configured: &mut Option<String>,
    segment: JobSegment,
    outcome: &mut BatchOutcome,
) {
    let Some(worker) = worker else {
        outcome.results.extend(
            segment
                .items
                .into_iter()
                .map(|(name, _)| (name, Err("OCR worker unavailable".to_string()))),
        );
        return;
    };

    let whitelist = expand_whitelist(&segment.char_set);
    if configured.as_deref() != Some(whitelist.as_str()) {
        if let Err(e) = worker.configure(&whitelist) {
            *configured = None;
            let reason = format!("failed to configure whitelist {:?}: {:#}", segment.char_set, e);
            outcome
                .results
                .extend(segment.items.into_iter().map(|(name, _)| (name, Err(reason.clone()))));
            return;
        }
        *configured = Some(whitelist);
    }

    for (name, image) in segment.items {
        let result = worker.recognize(&image).map_err(|e| format!("{:#}", e));
        outcome.results.push((name, result));
    }
}
