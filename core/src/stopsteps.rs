//! User-pinned stop waypoints.
//!
//! Each entry pins a depth the ascent must pause at for a fixed duration.
//! The list is kept sorted by decreasing depth and never goes empty: the
//! default single waypoint is a zero-minute hold at the shallow stop depth,
//! which gives the MaxTime service a first stop to extend.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopStep {
    pub depth: f64,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopSteps {
    steps: Vec<StopStep>,
}

impl Default for StopSteps {
    fn default() -> Self {
        StopSteps {
            steps: vec![StopStep {
                depth: 3.0,
                time: 0.0,
            }],
        }
    }
}

impl StopSteps {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn as_slice(&self) -> &[StopStep] {
        &self.steps
    }

    pub fn add(&mut self, depth: f64, time: f64) {
        self.steps.push(StopStep { depth, time });
        self.sort();
    }

    pub fn edit(&mut self, index: usize, depth: f64, time: f64) -> bool {
        match self.steps.get_mut(index) {
            Some(step) => {
                *step = StopStep { depth, time };
                self.sort();
                true
            }
            None => false,
        }
    }

    /// Remove a waypoint. Refuses to empty the list.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.steps.len() > 1 && index < self.steps.len() {
            self.steps.remove(index);
            true
        } else {
            false
        }
    }

    fn sort(&mut self) {
        self.steps
            .sort_by(|a, b| b.depth.total_cmp(&a.depth).then(b.time.total_cmp(&a.time)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_single_shallow_waypoint() {
        let ss = StopSteps::default();
        assert_eq!(ss.len(), 1);
        assert_eq!(ss.as_slice()[0].depth, 3.0);
        assert_eq!(ss.as_slice()[0].time, 0.0);
    }

    #[test]
    fn test_sorted_by_decreasing_depth() {
        let mut ss = StopSteps::default();
        ss.add(21.0, 2.0);
        ss.add(9.0, 1.0);
        let depths: Vec<f64> = ss.as_slice().iter().map(|s| s.depth).collect();
        assert_eq!(depths, vec![21.0, 9.0, 3.0]);
    }

    #[test]
    fn test_remove_keeps_at_least_one() {
        let mut ss = StopSteps::default();
        assert!(!ss.remove(0));
        ss.add(12.0, 3.0);
        assert!(ss.remove(1));
        assert_eq!(ss.len(), 1);
        assert!(!ss.remove(0));
    }

    #[test]
    fn test_edit_resorts() {
        let mut ss = StopSteps::default();
        ss.add(21.0, 2.0);
        assert!(ss.edit(1, 30.0, 2.0));
        assert_eq!(ss.as_slice()[0].depth, 30.0);
        assert!(!ss.edit(9, 5.0, 1.0));
    }
}
