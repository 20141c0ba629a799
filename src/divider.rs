use log::{debug, warn};
use mask_painter_common::{clamp, DividerConfig, DividerStatistics, Ellipse};

/// A vertical split line; particles to its right are subject to `probability`.
#[derive(Debug, Clone, PartialEq)]
pub struct Divider {
    pub name: String,
    pub x: f64,
    probability: f64,
    /// Display attribute only, never interpreted by the simulation.
    pub color: String,
}

impl Divider {
    pub fn new(name: impl Into<String>, x: f64, probability: f64, color: impl Into<String>) -> Self {
        let mut divider = Divider { name: name.into(), x, probability: 0.0, color: color.into() };
        divider.set_probability(probability);
        divider
    }

    /// True if `point_x` lies strictly to the right of the divider.
    #[inline]
    pub fn is_point_in_region(&self, point_x: f64) -> bool {
        point_x > self.x
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn set_probability(&mut self, probability: f64) {
        self.probability = if probability.is_nan() { 0.0 } else { clamp(probability, 0.0, 1.0) };
    }

    pub fn set_position(&mut self, x: f64) {
        self.x = x;
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
    }

    pub fn to_config(&self) -> DividerConfig {
        DividerConfig {
            name: self.name.clone(),
            x: self.x,
            probability: self.probability,
            color: self.color.clone(),
        }
    }
}

/// Ordered set of dividers, sorted ascending by `x`, with unique names.
#[derive(Debug, Clone)]
pub struct DividerManager {
    dividers: Vec<Divider>,
    bounds: Ellipse,
}

impl DividerManager {
    pub fn new(bounds: Ellipse) -> Self {
        DividerManager { dividers: Vec::new(), bounds }
    }

    /// Builds a manager from config entries. Entries that cannot be added are skipped.
    pub fn from_configs(configs: &[DividerConfig], bounds: Ellipse) -> Self {
        let mut manager = Self::new(bounds);
        for cfg in configs {
            if !manager.add(&cfg.name, cfg.x, cfg.probability, &cfg.color) {
                warn!(
                    "Skipping divider '{}' at x={:.2}: duplicate name or outside ellipse bounds.",
                    cfg.name, cfg.x
                );
            }
        }
        manager
    }

    /// Adds a divider. Fails without mutation on a duplicate name or an out-of-bounds `x`.
    pub fn add(&mut self, name: &str, x: f64, probability: f64, color: &str) -> bool {
        if self.get(name).is_some() || !self.validate_position(x) {
            return false;
        }
        self.dividers.push(Divider::new(name, x, probability, color));
        self.sort();
        debug!("Added divider '{}' at x={:.2} (p={:.3}).", name, x, probability);
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match self.dividers.iter().position(|d| d.name == name) {
            Some(idx) => {
                self.dividers.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn rename(&mut self, old_name: &str, new_name: &str) -> bool {
        if self.get(new_name).is_some() {
            return false;
        }
        match self.get_mut(old_name) {
            Some(divider) => {
                divider.name = new_name.to_string();
                true
            }
            None => false,
        }
    }

    /// Moves a divider, keeping the collection sorted. Out-of-bounds positions are rejected.
    pub fn set_position(&mut self, name: &str, x: f64) -> bool {
        if !self.validate_position(x) {
            return false;
        }
        match self.get_mut(name) {
            Some(divider) => {
                divider.set_position(x);
                self.sort();
                true
            }
            None => false,
        }
    }

    pub fn set_probability(&mut self, name: &str, probability: f64) -> bool {
        match self.get_mut(name) {
            Some(divider) => {
                divider.set_probability(probability);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Divider> {
        self.dividers.iter().find(|d| d.name == name)
    }

    /// Mutable access for display attributes. Use `set_position` to move a divider.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Divider> {
        self.dividers.iter_mut().find(|d| d.name == name)
    }

    /// Probability of the nearest divider strictly to the left of `x`, or 0 if there is none.
    ///
    /// With duplicate `x` values the divider last in sorted order wins. The sort is
    /// stable, so that is the most recently inserted of them.
    pub fn region_probability(&self, x: f64) -> f64 {
        self.dividers
            .iter()
            .rev()
            .find(|d| d.is_point_in_region(x))
            .map_or(0.0, |d| d.probability())
    }

    /// True if `x` lies within the ellipse's horizontal extent.
    pub fn validate_position(&self, x: f64) -> bool {
        let (min_x, max_x) = self.bounds.x_bounds();
        min_x <= x && x <= max_x
    }

    /// Replaces the governing ellipse and drops dividers that fall outside it.
    /// Returns the removed dividers.
    pub fn update_bounds(&mut self, bounds: Ellipse) -> Vec<Divider> {
        self.bounds = bounds;
        let (kept, dropped): (Vec<Divider>, Vec<Divider>) = std::mem::take(&mut self.dividers)
            .into_iter()
            .partition(|d| self.validate_position(d.x));
        self.dividers = kept;
        for d in &dropped {
            debug!("Dropped divider '{}' at x={:.2}: outside new bounds.", d.name, d.x);
        }
        dropped
    }

    pub fn bounds(&self) -> Ellipse {
        self.bounds
    }

    /// Copy of all dividers in ascending `x` order.
    pub fn dividers(&self) -> Vec<Divider> {
        self.dividers.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Divider> {
        self.dividers.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.dividers.iter().map(|d| d.name.clone()).collect()
    }

    pub fn to_configs(&self) -> Vec<DividerConfig> {
        self.dividers.iter().map(Divider::to_config).collect()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.dividers.len();
        self.dividers.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.dividers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dividers.is_empty()
    }

    pub fn statistics(&self) -> DividerStatistics {
        if self.dividers.is_empty() {
            return DividerStatistics::default();
        }
        let count = self.dividers.len();
        let sum: f64 = self.dividers.iter().map(|d| d.probability()).sum();
        // Sorted ascending, so the extremes are at the ends.
        let min_x = self.dividers.first().map_or(0.0, |d| d.x);
        let max_x = self.dividers.last().map_or(0.0, |d| d.x);
        DividerStatistics {
            count,
            average_probability: sum / count as f64,
            position_range: (min_x, max_x),
            names: self.names(),
        }
    }

    fn sort(&mut self) {
        self.dividers
            .sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    }
}
