//! Fixed-size pool of decode slots for Tight rectangles.
//!
//! Slot 0 is the calling task itself: a job submitted to it runs inline before
//! `submit` returns. Slots `1..N` are dedicated OS threads, each fed through a
//! one-deep `flume` channel, so a slot holds at most one job at a time.
//!
//! Every slot owns a [`Scratch`] arena. The decoder takes it with
//! [`DecodeThreadPool::acquire`] (waiting for the slot's previous job if
//! needed), fills it with the rectangle's payload, and hands it back together
//! with the job. The worker returns the arena with the job's result, so buffers
//! are reused from one rectangle to the next without reallocating.
//!
//! A failed job does not stop anything by itself: its error is reported the
//! next time the slot is acquired, waited on, or flushed.

use crate::error::{DecodeError, Result};
use std::thread;

/// Hard upper bound on the number of decode slots.
pub const MAX_DECODE_THREADS: usize = 8;

/// Effective slot count for a requested value.
///
/// The available parallelism is capped at [`MAX_DECODE_THREADS`]; a request is
/// honoured only when it lies in `1..=that`, anything else falls back to it.
pub fn resolve_thread_count(requested: Option<usize>) -> usize {
    let available = num_cpus::get().clamp(1, MAX_DECODE_THREADS);
    match requested {
        Some(n) if (1..=available).contains(&n) => n,
        _ => available,
    }
}

/// Reusable per-slot buffers.
#[derive(Debug, Default)]
pub struct Scratch {
    /// Bytes as read from the wire (zlib or JPEG stream).
    pub compressed: Vec<u8>,
    /// Filtered data, either inflated or read directly.
    pub decoded: Vec<u8>,
    /// Native pixels ready to blit.
    pub pixels: Vec<u8>,
}

/// A unit of work the pool can run on any slot.
pub trait Job: Send + 'static {
    fn run(self, scratch: &mut Scratch) -> Result<()>;
}

type Done = (Scratch, Result<()>);

struct Worker<J> {
    jobs: Option<flume::Sender<(J, Scratch)>>,
    done: flume::Receiver<Done>,
    handle: Option<thread::JoinHandle<()>>,
}

struct Slot<J> {
    /// `None` while a job is in flight on this slot's worker.
    scratch: Option<Scratch>,
    /// `None` for slot 0, which runs on the caller.
    worker: Option<Worker<J>>,
}

pub struct DecodeThreadPool<J: Job> {
    slots: Vec<Slot<J>>,
    next: usize,
}

impl<J: Job> DecodeThreadPool<J> {
    /// Start a pool with `threads` slots, clamped to `1..=MAX_DECODE_THREADS`.
    pub fn new(threads: usize) -> Result<Self> {
        let count = threads.clamp(1, MAX_DECODE_THREADS);
        let mut slots = Vec::with_capacity(count);
        slots.push(Slot {
            scratch: Some(Scratch::default()),
            worker: None,
        });

        for index in 1..count {
            let (job_tx, job_rx) = flume::bounded::<(J, Scratch)>(1);
            let (done_tx, done_rx) = flume::bounded::<Done>(1);
            let handle = thread::Builder::new()
                .name(format!("tight-decode-{index}"))
                .spawn(move || worker_loop(index, job_rx, done_tx))
                .map_err(|e| {
                    DecodeError::resource(format!("failed to start decode worker {index}: {e}"))
                })?;
            slots.push(Slot {
                scratch: Some(Scratch::default()),
                worker: Some(Worker {
                    jobs: Some(job_tx),
                    done: done_rx,
                    handle: Some(handle),
                }),
            });
        }

        tracing::info!("Using {} thread(s) for Tight decoding", count);
        Ok(Self { slots, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Next slot in round-robin order.
    pub fn next_round_robin(&mut self) -> usize {
        let slot = self.next;
        self.next = (self.next + 1) % self.slots.len();
        slot
    }

    /// The slot that owns jobs for zlib channel `channel`.
    pub fn slot_for_channel(&self, channel: usize) -> usize {
        channel % self.slots.len()
    }

    /// True when `slot` has no job in flight.
    pub fn is_idle(&self, slot: usize) -> bool {
        self.slots[slot].scratch.is_some()
    }

    /// Wait until `slot` is idle and take its scratch arena.
    ///
    /// Fails with the previous job's error if that job failed.
    pub async fn acquire(&mut self, slot: usize) -> Result<Scratch> {
        self.wait_idle(slot).await?;
        self.slots[slot]
            .scratch
            .take()
            .ok_or_else(|| DecodeError::resource(format!("decode slot {slot} has no scratch")))
    }

    /// Hand back an arena taken with [`Self::acquire`] without running a job,
    /// e.g. when reading the payload failed.
    pub fn release(&mut self, slot: usize, scratch: Scratch) {
        self.slots[slot].scratch = Some(scratch);
    }

    /// Wait for the job in flight on `slot`, if any.
    pub async fn wait_idle(&mut self, slot: usize) -> Result<()> {
        let entry = &mut self.slots[slot];
        if entry.scratch.is_some() {
            return Ok(());
        }
        let worker = entry.worker.as_ref().ok_or_else(|| {
            DecodeError::resource(format!("decode slot {slot} lost its scratch"))
        })?;
        let (scratch, result) = worker.done.recv_async().await.map_err(|_| {
            DecodeError::resource(format!("decode worker {slot} exited unexpectedly"))
        })?;
        entry.scratch = Some(scratch);
        result
    }

    /// Run `job` on `slot` with the arena obtained from [`Self::acquire`].
    ///
    /// Slot 0 runs the job immediately and returns its result; other slots
    /// return as soon as the job is queued.
    pub fn submit(&mut self, slot: usize, job: J, mut scratch: Scratch) -> Result<()> {
        let entry = &mut self.slots[slot];
        match &entry.worker {
            None => {
                let result = job.run(&mut scratch);
                entry.scratch = Some(scratch);
                result
            }
            Some(worker) => {
                let jobs = worker.jobs.as_ref().ok_or_else(|| {
                    DecodeError::resource(format!("decode worker {slot} is shut down"))
                })?;
                jobs.send((job, scratch)).map_err(|_| {
                    DecodeError::resource(format!("decode worker {slot} exited unexpectedly"))
                })
            }
        }
    }

    /// Wait for every slot and report the first failure.
    pub async fn flush(&mut self) -> Result<()> {
        let mut first_error = None;
        for slot in 0..self.slots.len() {
            if let Err(e) = self.wait_idle(slot).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait for in-flight jobs, then stop the workers.
    pub async fn shutdown(mut self) -> Result<()> {
        let result = self.flush().await;
        self.stop_workers();
        result
    }

    fn stop_workers(&mut self) {
        for slot in &mut self.slots {
            if let Some(worker) = slot.worker.as_mut() {
                worker.jobs.take();
            }
        }
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(handle) = slot.worker.as_mut().and_then(|w| w.handle.take()) {
                if handle.join().is_err() {
                    tracing::warn!("Tight decode worker {} panicked", index);
                }
            }
        }
    }
}

impl<J: Job> Drop for DecodeThreadPool<J> {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

fn worker_loop<J: Job>(
    index: usize,
    jobs: flume::Receiver<(J, Scratch)>,
    done: flume::Sender<Done>,
) {
    while let Ok((job, mut scratch)) = jobs.recv() {
        let result = job.run(&mut scratch);
        if let Err(e) = &result {
            tracing::debug!("Tight decode worker {} job failed: {}", index, e);
        }
        if done.send((scratch, result)).is_err() {
            break;
        }
    }
    tracing::trace!("Tight decode worker {} stopped", index);
}
