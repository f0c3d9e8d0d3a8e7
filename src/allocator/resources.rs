//! Scalar resource vectors.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub, SubAssign};

const EPSILON: f64 = 1e-9;

/// Resources of an agent, an allocation or the whole cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpus: f64,
    /// Megabytes.
    pub mem: f64,
    /// Megabytes.
    pub disk: f64,
}

impl Resources {
    pub fn new(cpus: f64, mem: f64, disk: f64) -> Self {
        Self { cpus, mem, disk }
    }

    pub fn is_empty(&self) -> bool {
        self.cpus <= EPSILON && self.mem <= EPSILON && self.disk <= EPSILON
    }

    /// True if every scalar of `other` fits in `self`.
    pub fn contains(&self, other: &Resources) -> bool {
        other.cpus <= self.cpus + EPSILON
            && other.mem <= self.mem + EPSILON
            && other.disk <= self.disk + EPSILON
    }

    /// Largest fraction of `total` this vector represents.
    pub fn dominant_share(&self, total: &Resources) -> f64 {
        [
            (self.cpus, total.cpus),
            (self.mem, total.mem),
            (self.disk, total.disk),
        ]
        .into_iter()
        .filter(|(_, total)| *total > EPSILON)
        .map(|(used, total)| used / total)
        .fold(0.0, f64::max)
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            cpus: self.cpus + rhs.cpus,
            mem: self.mem + rhs.mem,
            disk: self.disk + rhs.disk,
        }
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Resources) {
        *self = *self + rhs;
    }
}

/// Subtraction clamps at zero.
impl Sub for Resources {
    type Output = Resources;

    fn sub(self, rhs: Resources) -> Resources {
        Resources {
            cpus: (self.cpus - rhs.cpus).max(0.0),
            mem: (self.mem - rhs.mem).max(0.0),
            disk: (self.disk - rhs.disk).max(0.0),
        }
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, rhs: Resources) {
        *self = *self - rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_share() {
        let total = Resources::new(10.0, 1000.0, 0.0);
        let used = Resources::new(1.0, 500.0, 0.0);
        assert!((used.dominant_share(&total) - 0.5).abs() < 1e-12);
        assert_eq!(Resources::default().dominant_share(&total), 0.0);
    }

    #[test]
    fn test_subtraction_clamps() {
        let left = Resources::new(1.0, 100.0, 0.0) - Resources::new(2.0, 50.0, 10.0);
        assert_eq!(left, Resources::new(0.0, 50.0, 0.0));
    }

    #[test]
    fn test_contains() {
        let offer = Resources::new(4.0, 4096.0, 0.0);
        assert!(offer.contains(&Resources::new(4.0, 1024.0, 0.0)));
        assert!(!offer.contains(&Resources::new(0.5, 8192.0, 0.0)));
    }
}
