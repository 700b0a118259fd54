//! Ordered `label -> voting power` mapping.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Label reported for indices outside a proposal's choice list.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Vote distribution that keeps label order stable across serialization.
///
/// Serialized as a plain JSON object; entry order is the order labels were
/// credited unless [`VoteDistribution::sort_by_rank`] reorders them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteDistribution {
    entries: Vec<(String, f64)>,
}

impl VoteDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `power` to `label`, inserting the label on first credit.
    pub fn credit(&mut self, label: &str, power: f64) {
        match self.entries.iter_mut().find(|(name, _)| name == label) {
            Some((_, total)) => *total += power,
            None => self.entries.push((label.to_string(), power)),
        }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, power)| *power)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, power)| (name.as_str(), *power))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, power)| power).sum()
    }

    /// Stable reorder by a caller-supplied rank; equal ranks keep credit order.
    pub fn sort_by_rank<F>(&mut self, mut rank: F)
    where
        F: FnMut(&str) -> usize,
    {
        self.entries.sort_by_key(|(name, _)| rank(name));
    }

    /// Label with the largest power. Ties go to the earliest entry.
    pub fn leader(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (name, power) in self.iter() {
            match best {
                Some((_, top)) if power <= top => {}
                _ => best = Some((name, power)),
            }
        }
        best.map(|(name, _)| name)
    }

    /// Each label's share of the total power, in percent. All zeros when the
    /// total is zero.
    pub fn percentages(&self) -> VoteDistribution {
        let total = self.total();
        let entries = self
            .entries
            .iter()
            .map(|(name, power)| {
                let share = if total == 0.0 { 0.0 } else { power / total * 100.0 };
                (name.clone(), share)
            })
            .collect();
        Self { entries }
    }

    pub fn rounded(&self, decimals: u32) -> VoteDistribution {
        let entries = self
            .entries
            .iter()
            .map(|(name, power)| (name.clone(), round_to(*power, decimals)))
            .collect();
        Self { entries }
    }
}

impl FromIterator<(String, f64)> for VoteDistribution {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut dist = Self::new();
        for (label, power) in iter {
            dist.credit(&label, power);
        }
        dist
    }
}

/// Half-away-from-zero rounding to a fixed number of decimals.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

impl Serialize for VoteDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, power) in &self.entries {
            map.serialize_entry(name, power)?;
        }
        map.end()
    }
}

struct DistributionVisitor;

impl<'de> Visitor<'de> for DistributionVisitor {
    type Value = VoteDistribution;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of choice label to voting power")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut dist = VoteDistribution::new();
        while let Some((label, power)) = access.next_entry::<String, f64>()? {
            dist.credit(&label, power);
        }
        Ok(dist)
    }
}

impl<'de> Deserialize<'de> for VoteDistribution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DistributionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_accumulates_and_keeps_first_seen_order() {
        let mut dist = VoteDistribution::new();
        dist.credit("No", 10.0);
        dist.credit("Yes", 5.0);
        dist.credit("No", 2.5);
        let labels: Vec<_> = dist.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["No", "Yes"]);
        assert_eq!(dist.get("No"), Some(12.5));
        assert_eq!(dist.total(), 17.5);
    }

    #[test]
    fn leader_breaks_ties_on_entry_order() {
        let mut dist = VoteDistribution::new();
        dist.credit("Yes", 100.0);
        dist.credit("No", 100.0);
        assert_eq!(dist.leader(), Some("Yes"));
        dist.sort_by_rank(|label| if label == "No" { 0 } else { 1 });
        assert_eq!(dist.leader(), Some("No"));
        assert_eq!(VoteDistribution::new().leader(), None);
    }

    #[test]
    fn percentages_of_empty_total_are_zero() {
        let mut dist = VoteDistribution::new();
        dist.credit("Yes", 0.0);
        assert_eq!(dist.percentages().get("Yes"), Some(0.0));
    }

    #[test]
    fn json_object_round_trip_preserves_order() {
        let mut dist = VoteDistribution::new();
        dist.credit("Zeta", 1.0);
        dist.credit("Alpha", 2.0);
        let text = serde_json::to_string(&dist).unwrap();
        assert_eq!(text, r#"{"Zeta":1.0,"Alpha":2.0}"#);
        let back: VoteDistribution = serde_json::from_str(&text).unwrap();
        assert_eq!(back, dist);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_to(1.005_1, 2), 1.01);
        assert_eq!(round_to(0.123_46, 4), 0.1235);
        assert_eq!(round_to(-2.5, 0), -3.0);
        assert_eq!(round_to(2.0, 2), 2.0);
    }
}
