//! Deterministic star field keyed by a message seed.
//!
//! Star `i` gets its three coordinates from the keyed PRF evaluated at the
//! counters `3i`, `3i+1`, `3i+2`; the same keys always produce the same
//! galaxy. Stars are bucketed by direction on a theta/phi grid so a camera
//! only has to look at the buckets around its target.

use std::f64::consts::PI;
use std::hash::Hasher;

use sha2::{Digest, Sha256};
use siphasher::sip::SipHasher24;

pub const DEFAULT_NUM_STARS: usize = 1 << 16;

/// Angular subdivisions per axis of the direction grid.
const BUCKET_DIVISIONS: usize = 16;

/// The 128-bit siphash key pair seeding a galaxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiphashKeys {
    pub k0: u64,
    pub k1: u64,
}

impl SiphashKeys {
    /// Derives the key pair from an arbitrary message.
    pub fn from_message(message: &[u8]) -> Self {
        let digest = Sha256::digest(message);
        Self {
            k0: u64::from_le_bytes(digest[0..8].try_into().expect("digest is 32 bytes")),
            k1: u64::from_le_bytes(digest[8..16].try_into().expect("digest is 32 bytes")),
        }
    }

    pub(crate) fn prf(&self, counter: u64) -> u64 {
        let mut hasher = SipHasher24::new_with_keys(self.k0, self.k1);
        hasher.write_u64(counter);
        hasher.finish()
    }

    /// PRF over a `(proof_num, index)` pair, with a lane selector for the
    /// three coordinates.
    pub(crate) fn prf_pair(&self, a: u64, b: u64, lane: u64) -> u64 {
        let mut hasher = SipHasher24::new_with_keys(self.k0, self.k1);
        hasher.write_u64(a);
        hasher.write_u64(b);
        hasher.write_u64(lane);
        hasher.finish()
    }
}

/// Maps a PRF output onto [-1, 1].
pub(crate) fn to_coordinate(word: u64) -> f64 {
    (word as f64 / u64::MAX as f64) * 2.0 - 1.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn normalized(self) -> Self {
        let length = self.length();
        if length == 0.0 {
            return Self::new(1.0, 0.0, 0.0);
        }
        Self::new(self.x / length, self.y / length, self.z / length)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Star {
    pub id: u32,
    pub position: Vec3,
}

pub(crate) fn make_star(keys: &SiphashKeys, id: u32) -> Star {
    let base = 3 * u64::from(id);
    Star {
        id,
        position: Vec3::new(
            to_coordinate(keys.prf(base)),
            to_coordinate(keys.prf(base + 1)),
            to_coordinate(keys.prf(base + 2)),
        ),
    }
}

fn bucket_coords(direction: Vec3) -> (usize, usize) {
    let d = direction.normalized();
    let theta = d.z.clamp(-1.0, 1.0).acos();
    let phi = d.y.atan2(d.x) + PI;

    let row = ((theta / PI) * BUCKET_DIVISIONS as f64) as usize;
    let col = ((phi / (2.0 * PI)) * BUCKET_DIVISIONS as f64) as usize;
    (row.min(BUCKET_DIVISIONS - 1), col.min(BUCKET_DIVISIONS - 1))
}

pub struct Galaxy {
    keys: SiphashKeys,
    stars: Vec<Star>,
    buckets: Vec<Vec<u32>>,
}

impl Galaxy {
    /// Generates and buckets the whole star field. Immutable afterwards, so
    /// cameras on any thread may read it.
    pub fn new(keys: SiphashKeys, num_stars: usize) -> Self {
        let mut stars = Vec::with_capacity(num_stars);
        let mut buckets = vec![Vec::new(); BUCKET_DIVISIONS * BUCKET_DIVISIONS];

        for id in 0..num_stars as u32 {
            let star = make_star(&keys, id);
            let (row, col) = bucket_coords(star.position);
            buckets[row * BUCKET_DIVISIONS + col].push(id);
            stars.push(star);
        }

        Self {
            keys,
            stars,
            buckets,
        }
    }

    pub fn keys(&self) -> &SiphashKeys {
        &self.keys
    }

    pub fn num_stars(&self) -> usize {
        self.stars.len()
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn star(&self, id: u32) -> Star {
        self.stars[id as usize]
    }

    /// The buckets in the 3x3 direction neighborhood of `direction`; phi
    /// wraps around, theta clamps at the poles.
    pub fn buckets_near(&self, direction: Vec3) -> Vec<&[u32]> {
        let (row, col) = bucket_coords(direction);

        let mut near = Vec::with_capacity(9);
        for dr in -1i64..=1 {
            let r = row as i64 + dr;
            if r < 0 || r >= BUCKET_DIVISIONS as i64 {
                continue;
            }
            for dc in -1i64..=1 {
                let c = (col as i64 + dc).rem_euclid(BUCKET_DIVISIONS as i64);
                near.push(self.buckets[r as usize * BUCKET_DIVISIONS + c as usize].as_slice());
            }
        }
        near
    }
}
