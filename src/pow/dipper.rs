//! Search for the seven-star dipper pattern in a projected picture.
//!
//! A candidate pair of stars anchors the first two template points; the
//! similarity transform the pair fixes (rotation, scale, translation) maps
//! the remaining five template points into the picture, each of which must
//! land within tolerance of a distinct star.

use itertools::Itertools;

use super::camera::ProjectedStar;

/// Plane coordinates of the dipper asterism, handle first.
const TEMPLATE: [(f64, f64); 7] = [
    (0.00, 0.00), // Alkaid
    (0.18, 0.09), // Mizar
    (0.38, 0.12), // Alioth
    (0.57, 0.13), // Megrez
    (0.74, 0.02), // Phecda
    (0.97, 0.08), // Merak
    (1.00, 0.34), // Dubhe
];

/// Matching tolerance as a fraction of the candidate pair's span.
pub const DEFAULT_TOLERANCE: f64 = 0.02;

#[derive(Clone, Copy)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    fn sub(self, other: Self) -> Self {
        Self::new(self.re - other.re, self.im - other.im)
    }

    fn add(self, other: Self) -> Self {
        Self::new(self.re + other.re, self.im + other.im)
    }

    fn mul(self, other: Self) -> Self {
        Self::new(
            self.re * other.re - self.im * other.im,
            self.re * other.im + self.im * other.re,
        )
    }

    fn div(self, other: Self) -> Self {
        let norm = other.re * other.re + other.im * other.im;
        Self::new(
            (self.re * other.re + self.im * other.im) / norm,
            (self.im * other.re - self.re * other.im) / norm,
        )
    }

    fn modulus(self) -> f64 {
        (self.re * self.re + self.im * self.im).sqrt()
    }
}

fn star_point(star: &ProjectedStar) -> Complex {
    Complex::new(star.u, star.v)
}

fn template_point(k: usize) -> Complex {
    Complex::new(TEMPLATE[k].0, TEMPLATE[k].1)
}

pub struct DipperDetector {
    tolerance: f64,
}

impl DipperDetector {
    pub fn new() -> Self {
        Self::with_tolerance(DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Searches the picture; on a match `found` holds the seven stars in
    /// template order.
    pub fn search(&self, stars: &[ProjectedStar], found: &mut Vec<ProjectedStar>) -> bool {
        found.clear();
        if stars.len() < TEMPLATE.len() {
            return false;
        }

        for (i, j) in (0..stars.len()).cartesian_product(0..stars.len()) {
            if i != j && self.matches(stars, i, j, found) {
                return true;
            }
        }

        found.clear();
        false
    }

    fn matches(
        &self,
        stars: &[ProjectedStar],
        i: usize,
        j: usize,
        found: &mut Vec<ProjectedStar>,
    ) -> bool {
        // T(z) = a*z + b maps template point 0 onto star i and point 1 onto
        // star j.
        let anchor = star_point(&stars[i]);
        let a = star_point(&stars[j])
            .sub(anchor)
            .div(template_point(1).sub(template_point(0)));
        let b = anchor.sub(a.mul(template_point(0)));

        let scale = a.modulus();
        if scale == 0.0 {
            return false;
        }
        let tolerance = self.tolerance * scale;

        found.clear();
        found.push(stars[i]);
        found.push(stars[j]);
        let mut used = [usize::MAX; TEMPLATE.len()];
        used[0] = i;
        used[1] = j;

        for k in 2..TEMPLATE.len() {
            let expected = a.mul(template_point(k)).add(b);

            let mut best: Option<usize> = None;
            let mut best_distance = f64::INFINITY;
            for (index, star) in stars.iter().enumerate() {
                if used[..k].contains(&index) {
                    continue;
                }
                let distance = star_point(star).sub(expected).modulus();
                if distance <= tolerance && distance < best_distance {
                    best = Some(index);
                    best_distance = distance;
                }
            }

            let Some(index) = best else {
                found.clear();
                return false;
            };
            used[k] = index;
            found.push(stars[index]);
        }

        true
    }
}

impl Default for DipperDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::camera::ProjectedStar;
    use super::{DipperDetector, TEMPLATE};

    fn star(id: u32, u: f64, v: f64) -> ProjectedStar {
        ProjectedStar { id, u, v }
    }

    #[test]
    fn too_few_stars_never_match() {
        let detector = DipperDetector::with_tolerance(f64::INFINITY);
        let stars: Vec<ProjectedStar> = (0..6).map(|i| star(i, i as f64 * 0.1, 0.0)).collect();

        let mut found = Vec::new();
        assert!(!detector.search(&stars, &mut found));
        assert!(found.is_empty());
    }

    #[test]
    fn the_template_itself_matches() {
        let detector = DipperDetector::new();
        let stars: Vec<ProjectedStar> = TEMPLATE
            .iter()
            .enumerate()
            .map(|(i, &(u, v))| star(i as u32, u, v))
            .collect();

        let mut found = Vec::new();
        assert!(detector.search(&stars, &mut found));
        assert_eq!(found.len(), 7);
    }

    #[test]
    fn a_rotated_scaled_template_matches() {
        let detector = DipperDetector::new();
        // Rotate by 90 degrees, scale by 0.5, translate.
        let stars: Vec<ProjectedStar> = TEMPLATE
            .iter()
            .enumerate()
            .map(|(i, &(u, v))| star(i as u32, 0.3 - 0.5 * v, -0.1 + 0.5 * u))
            .collect();

        let mut found = Vec::new();
        assert!(detector.search(&stars, &mut found));
        assert_eq!(found.len(), 7);
    }

    #[test]
    fn scattered_stars_do_not_match_under_a_tight_tolerance() {
        let detector = DipperDetector::with_tolerance(1e-9);
        // A grid deliberately unlike the template.
        let stars: Vec<ProjectedStar> = (0..9)
            .map(|i| star(i, f64::from(i % 3) * 0.31, f64::from(i / 3) * 0.17))
            .collect();

        let mut found = Vec::new();
        assert!(!detector.search(&stars, &mut found));
        assert!(found.is_empty());
    }
}
