//! The proof-of-work observatory: a deterministic galaxy projected through
//! per-worker cameras, scanned for the dipper constellation by a bounded
//! worker pool.

mod camera;
mod dipper;
mod galaxy;
mod worker;

pub use camera::{Camera, ProjectedStar};
pub use dipper::{DipperDetector, DEFAULT_TOLERANCE};
pub use galaxy::{Galaxy, SiphashKeys, Star, Vec3, DEFAULT_NUM_STARS};

use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub num_workers: usize,
    /// Width of the index range handed to a worker per request.
    pub index_delta: u64,
    /// Focal window of each worker's camera.
    pub window: f64,
    /// Detector tolerance, relative to the anchor pair's span.
    pub tolerance: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            index_delta: 100,
            window: 0.25,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// A successful scan: the index that produced the match and the seven
/// matching stars in template order.
#[derive(Debug, Clone)]
pub struct Proof {
    pub nonce: u64,
    pub stars: Vec<ProjectedStar>,
}

pub struct Observatory {
    galaxy: Arc<Galaxy>,
    config: ScanConfig,
}

impl Observatory {
    /// Seeds a galaxy from `message`. A `num_stars` of zero selects the
    /// default population.
    pub fn init(message: &[u8], num_stars: usize) -> Self {
        let keys = SiphashKeys::from_message(message);
        let num_stars = if num_stars == 0 {
            DEFAULT_NUM_STARS
        } else {
            num_stars
        };
        Self {
            galaxy: Arc::new(Galaxy::new(keys, num_stars)),
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn keys(&self) -> &SiphashKeys {
        self.galaxy.keys()
    }

    pub fn galaxy(&self) -> &Galaxy {
        &self.galaxy
    }

    pub fn star(&self, id: u32) -> Star {
        self.galaxy.star(id)
    }

    /// A fresh camera sharing this observatory's galaxy.
    pub fn new_camera(&self, id: usize) -> Camera {
        Camera::new(Arc::clone(&self.galaxy), id, self.config.window)
    }

    /// Scans nonces with the worker pool until some worker finds a dipper.
    /// Returns the winning worker's findings, or `None` if the pool drained
    /// without a match.
    pub fn scan(&self, proof_num: u64) -> Option<Proof> {
        worker::scan(self, proof_num)
    }
}
