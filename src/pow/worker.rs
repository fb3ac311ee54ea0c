//! The nonce-scanning worker pool.
//!
//! Range requests flow to the workers over a rendezvous channel, which
//! bounds the parallelism at the worker count; readiness and first-match
//! reports flow back. Closing the job channel is the kill signal: each
//! worker finishes its current range, then exits and is joined.

use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::camera::{Camera, ProjectedStar};
use super::dipper::DipperDetector;
use super::{Observatory, Proof};

#[derive(Debug, Clone, Copy)]
struct IndexRange {
    proof_num: u64,
    start: u64,
    end: u64,
}

enum Report {
    Ready(usize),
    Done(usize),
}

struct Worker {
    id: usize,
    camera: Camera,
    stars: Vec<ProjectedStar>,
    detector: DipperDetector,
    found: Vec<ProjectedStar>,
    done_at: Option<u64>,
}

impl Worker {
    fn run(mut self, jobs: Receiver<IndexRange>, reports: Sender<Report>) -> Self {
        while let Ok(range) = jobs.recv() {
            log::trace!(
                "worker {} scanning [{}, {})",
                self.id,
                range.start,
                range.end
            );

            for index in range.start..range.end {
                self.camera.set_target_from(range.proof_num, index);
                self.camera.take_picture(&mut self.stars);
                if self.detector.search(&self.stars, &mut self.found) {
                    self.done_at = Some(index);
                    let _ = reports.send(Report::Done(self.id));
                    // First match wins; stop scanning.
                    return self;
                }
            }

            if reports.send(Report::Ready(self.id)).is_err() {
                break;
            }
        }
        self
    }
}

pub(super) fn scan(observatory: &Observatory, proof_num: u64) -> Option<Proof> {
    let config = observatory.config();
    let (job_tx, job_rx) = bounded::<IndexRange>(0);
    let (report_tx, report_rx) = unbounded::<Report>();

    let handles: Vec<JoinHandle<Worker>> = (0..config.num_workers)
        .map(|id| {
            let worker = Worker {
                id,
                camera: observatory.new_camera(id),
                stars: Vec::new(),
                detector: DipperDetector::with_tolerance(config.tolerance),
                found: Vec::new(),
                done_at: None,
            };
            let jobs = job_rx.clone();
            let reports = report_tx.clone();
            std::thread::Builder::new()
                .name(format!("observatory-worker-{id}"))
                .spawn(move || worker.run(jobs, reports))
                .expect("failed to spawn observatory worker")
        })
        .collect();
    drop(report_tx);
    drop(job_rx);

    let mut index = 0;
    let mut done = false;
    while !done {
        let range = IndexRange {
            proof_num,
            start: index,
            end: index + config.index_delta,
        };

        crossbeam_channel::select! {
            recv(report_rx) -> report => match report {
                Ok(Report::Done(id)) => {
                    log::debug!("worker {id} found a dipper");
                    done = true;
                }
                Ok(Report::Ready(id)) => log::trace!("worker {id} ready"),
                // Every worker exited.
                Err(_) => done = true,
            },
            send(job_tx, range) -> sent => {
                if sent.is_ok() {
                    index += config.index_delta;
                } else {
                    done = true;
                }
            }
        }
    }

    // Kill signal: workers drain their current range and exit.
    drop(job_tx);

    let workers: Vec<Worker> = handles
        .into_iter()
        .map(|handle| handle.join().expect("observatory worker panicked"))
        .collect();

    workers
        .into_iter()
        .find(|worker| worker.done_at.is_some())
        .map(|worker| Proof {
            nonce: worker.done_at.expect("winning worker has an index"),
            stars: worker.found,
        })
}
