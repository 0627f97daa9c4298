//! Closed-circuit PpO₂ setpoint schedule.
//!
//! A piecewise-constant map from depth to loop setpoint, kept sorted by
//! decreasing depth (decreasing setpoint on depth ties). The lookup follows
//! the original planner's semantics: with `boosted` off the deepest setpoint
//! applies everywhere.

use tracing::warn;

use crate::parameters::Parameters;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetPoint {
    /// Depth at and below which this setpoint starts to apply (m).
    pub depth: f64,
    /// Loop PpO₂ (bar).
    pub setpoint: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetPoints {
    points: Vec<SetPoint>,
}

impl Default for SetPoints {
    /// The seeded schedule: 1.3 at depth, stepping up to 1.6 by 6 m.
    fn default() -> Self {
        let mut sp = SetPoints::new();
        sp.add(1000.0, 1.3);
        sp.add(40.0, 1.4);
        sp.add(21.0, 1.5);
        sp.add(6.0, 1.6);
        sp
    }
}

impl SetPoints {
    pub fn new() -> Self {
        SetPoints { points: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn as_slice(&self) -> &[SetPoint] {
        &self.points
    }

    pub fn add(&mut self, depth: f64, setpoint: f64) {
        self.points.push(SetPoint { depth, setpoint });
        self.sort();
    }

    /// Remove an entry. Refuses to empty a non-empty schedule.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.points.len() > 1 && index < self.points.len() {
            self.points.remove(index);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Sort by decreasing depth, decreasing setpoint on ties.
    fn sort(&mut self) {
        self.points.sort_by(|a, b| {
            b.depth
                .total_cmp(&a.depth)
                .then(b.setpoint.total_cmp(&a.setpoint))
        });
    }

    /// The setpoint in effect at `depth`.
    ///
    /// An empty schedule falls back to the diluent PpO₂ ceiling. With
    /// `boosted` off, or at or below the deepest configured depth, the
    /// deepest setpoint applies; above the shallowest configured depth the
    /// shallowest applies; otherwise the entry whose depth is immediately
    /// greater than `depth`.
    pub fn effective(&self, depth: f64, boosted: bool, params: &Parameters) -> f64 {
        if self.points.is_empty() {
            warn!("no setpoint configured, falling back to diluent PpO2 ceiling");
            return params.max_ppo2_diluent;
        }

        if depth >= self.points[0].depth || !boosted {
            return self.points[0].setpoint;
        }

        let last = self.points[self.points.len() - 1];
        if depth < last.depth {
            return last.setpoint;
        }

        for pair in self.points.windows(2) {
            if depth < pair[0].depth && depth >= pair[1].depth {
                return pair[0].setpoint;
            }
        }

        self.points[0].setpoint
    }
}
