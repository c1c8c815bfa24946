//! Nearest neighbour matching of descriptors between two images.

use crate::settings::MatchingSettings;
use align_core::{Descriptor, Feature, Match};
use log::*;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A distance between two descriptors.
pub trait Metric: Sync {
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32;
}

/// Euclidean distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct L2;

impl Metric for L2 {
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        a.distance(b)
    }
}

/// The nearest feature of B found for a feature of A.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub index_a: usize,
    pub index_b: usize,
    /// Distance to the nearest feature of B.
    pub distance: f32,
    /// Distance to the second nearest feature of B, if B has more than one feature.
    pub second_distance: Option<f32>,
}

impl From<Candidate> for Match {
    fn from(candidate: Candidate) -> Self {
        Match {
            index_a: candidate.index_a,
            index_b: candidate.index_b,
            distance: candidate.distance,
        }
    }
}

/// Decides whether a candidate becomes a match.
pub trait MatchConstraint: Sync {
    fn accept(&self, candidate: &Candidate) -> bool;

    /// Accepts only what both `self` and `other` accept.
    fn and<C: MatchConstraint>(self, other: C) -> And<Self, C>
    where
        Self: Sized,
    {
        And(self, other)
    }
}

impl<F> MatchConstraint for F
where
    F: Fn(&Candidate) -> bool + Sync,
{
    fn accept(&self, candidate: &Candidate) -> bool {
        self(candidate)
    }
}

/// Accepts every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConstraint;

impl MatchConstraint for NullConstraint {
    fn accept(&self, _: &Candidate) -> bool {
        true
    }
}

/// Rejects ambiguous candidates: the nearest distance must be below `ratio`
/// times the second nearest. A candidate without a second neighbour passes.
#[derive(Debug, Clone, Copy)]
pub struct RatioConstraint(pub f32);

impl MatchConstraint for RatioConstraint {
    fn accept(&self, candidate: &Candidate) -> bool {
        candidate
            .second_distance
            .map_or(true, |second| candidate.distance < self.0 * second)
    }
}

/// Rejects candidates further apart than the given distance.
#[derive(Debug, Clone, Copy)]
pub struct MaxDistance(pub f32);

impl MatchConstraint for MaxDistance {
    fn accept(&self, candidate: &Candidate) -> bool {
        candidate.distance <= self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct And<A, B>(pub A, pub B);

impl<A: MatchConstraint, B: MatchConstraint> MatchConstraint for And<A, B> {
    fn accept(&self, candidate: &Candidate) -> bool {
        self.0.accept(candidate) && self.1.accept(candidate)
    }
}

/// The constraints named by [`MatchingSettings`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchPolicy {
    pub ratio: Option<RatioConstraint>,
    pub max_distance: Option<MaxDistance>,
}

impl From<&MatchingSettings> for MatchPolicy {
    fn from(settings: &MatchingSettings) -> Self {
        Self {
            ratio: settings.ratio.map(RatioConstraint),
            max_distance: settings.max_distance.map(MaxDistance),
        }
    }
}

impl MatchConstraint for MatchPolicy {
    fn accept(&self, candidate: &Candidate) -> bool {
        self.ratio.map_or(true, |c| c.accept(candidate))
            && self.max_distance.map_or(true, |c| c.accept(candidate))
    }
}

/// Brute force matcher from the features of A to the features of B.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<M, C> {
    pub metric: M,
    pub constraint: C,
    /// Only keep pairs that are each other's nearest neighbour.
    pub cross_check: bool,
}

impl Matcher<L2, NullConstraint> {
    /// Euclidean matching that accepts every nearest neighbour.
    pub fn new() -> Self {
        Self {
            metric: L2,
            constraint: NullConstraint,
            cross_check: false,
        }
    }
}

impl Default for Matcher<L2, NullConstraint> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Metric, C: MatchConstraint> Matcher<M, C> {
    pub fn metric<N: Metric>(self, metric: N) -> Matcher<N, C> {
        Matcher {
            metric,
            constraint: self.constraint,
            cross_check: self.cross_check,
        }
    }

    pub fn constraint<D: MatchConstraint>(self, constraint: D) -> Matcher<M, D> {
        Matcher {
            metric: self.metric,
            constraint,
            cross_check: self.cross_check,
        }
    }

    pub fn cross_check(self, cross_check: bool) -> Self {
        Self {
            cross_check,
            ..self
        }
    }

    /// Nearest and second nearest neighbour of `descriptor` among `others`.
    ///
    /// Ties go to the lower index.
    fn neighbours(
        &self,
        descriptor: &Descriptor,
        others: &[Feature],
    ) -> Option<(usize, f32, Option<f32>)> {
        let mut nearest: Option<(usize, f32)> = None;
        let mut second: Option<f32> = None;
        for (ix, other) in others.iter().enumerate() {
            let distance = self.metric.distance(descriptor, &other.descriptor);
            match nearest {
                Some((_, best)) if distance >= best => {
                    if second.map_or(true, |s| distance < s) {
                        second = Some(distance);
                    }
                }
                _ => {
                    second = nearest.map(|(_, best)| best);
                    nearest = Some((ix, distance));
                }
            }
        }
        nearest.map(|(ix, distance)| (ix, distance, second))
    }

    fn nearest_indices(&self, from: &[Feature], to: &[Feature]) -> Vec<Option<usize>> {
        let nearest = |feature: &Feature| {
            self.neighbours(&feature.descriptor, to).map(|(ix, _, _)| ix)
        };
        #[cfg(not(feature = "rayon"))]
        let indices: Vec<Option<usize>> = from.iter().map(nearest).collect();
        #[cfg(feature = "rayon")]
        let indices: Vec<Option<usize>> = from.par_iter().map(nearest).collect();
        indices
    }

    /// Matches every feature of `a` to at most one feature of `b`.
    ///
    /// The result is ordered by `index_a`. It is empty when either side is.
    pub fn match_features(&self, a: &[Feature], b: &[Feature]) -> Vec<Match> {
        let reverse = if self.cross_check {
            Some(self.nearest_indices(b, a))
        } else {
            None
        };
        let candidate = |(index_a, feature): (usize, &Feature)| {
            let (index_b, distance, second_distance) = self.neighbours(&feature.descriptor, b)?;
            let candidate = Candidate {
                index_a,
                index_b,
                distance,
                second_distance,
            };
            let symmetric = reverse
                .as_ref()
                .map_or(true, |reverse| reverse[index_b] == Some(index_a));
            if symmetric && self.constraint.accept(&candidate) {
                Some(Match::from(candidate))
            } else {
                None
            }
        };
        #[cfg(not(feature = "rayon"))]
        let matches: Vec<Match> = a.iter().enumerate().filter_map(candidate).collect();
        #[cfg(feature = "rayon")]
        let matches: Vec<Match> = a.par_iter().enumerate().filter_map(candidate).collect();
        info!(
            "Matched {} of {} features against {}.",
            matches.len(),
            a.len(),
            b.len()
        );
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::InterestPoint;

    fn features(descriptors: &[&[f32]]) -> Vec<Feature> {
        descriptors
            .iter()
            .enumerate()
            .map(|(ix, d)| Feature {
                point: InterestPoint::new(ix as f32, 0.0, 1.0, 1.0),
                descriptor: Descriptor(d.to_vec()),
            })
            .collect()
    }

    #[test]
    fn nearest_neighbours_in_order() {
        let a = features(&[&[0.0, 0.0], &[10.0, 0.0], &[0.0, 10.0]]);
        let b = features(&[&[0.0, 9.0], &[1.0, 0.0], &[10.0, 1.0]]);
        let matches = Matcher::new().match_features(&a, &b);
        let pairs = matches
            .iter()
            .map(|m| (m.index_a, m.index_b))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![(0, 1), (1, 2), (2, 0)]);
        assert_eq!(matches[0].distance, 1.0);
    }

    #[test]
    fn empty_sides_give_no_matches() {
        let a = features(&[&[0.0]]);
        assert!(Matcher::new().match_features(&a, &[]).is_empty());
        assert!(Matcher::new().match_features(&[], &a).is_empty());
    }

    #[test]
    fn ratio_rejects_ambiguous_matches() {
        let a = features(&[&[0.0], &[5.0]]);
        let b = features(&[&[1.0], &[-1.1], &[20.0]]);
        let matches = Matcher::new()
            .constraint(RatioConstraint(0.8))
            .match_features(&a, &b);
        // The first feature is nearly equidistant from two others.
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index_a, 1);
    }

    #[test]
    fn ratio_passes_single_neighbour() {
        let a = features(&[&[0.0]]);
        let b = features(&[&[3.0]]);
        let matches = Matcher::new()
            .constraint(RatioConstraint(0.5))
            .match_features(&a, &b);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn cross_check_keeps_mutual_neighbours() {
        // Both features of A prefer the first feature of B, which prefers the second of A.
        let a = features(&[&[0.0], &[0.9]]);
        let b = features(&[&[1.0], &[10.0]]);
        let plain = Matcher::new().match_features(&a, &b);
        assert_eq!(plain.len(), 2);
        let checked = Matcher::new().cross_check(true).match_features(&a, &b);
        assert_eq!(checked.len(), 1);
        assert_eq!((checked[0].index_a, checked[0].index_b), (1, 0));
    }

    #[test]
    fn constraints_compose() {
        let a = features(&[&[0.0], &[5.0], &[9.0]]);
        let b = features(&[&[0.5], &[7.0]]);
        let even = |c: &Candidate| c.index_a % 2 == 0;
        let matches = Matcher::new()
            .constraint(MaxDistance(1.0).and(even))
            .match_features(&a, &b);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index_a, 0);
    }

    #[test]
    fn policy_follows_settings() {
        let settings = MatchingSettings {
            ratio: None,
            max_distance: Some(0.25),
            cross_check: false,
        };
        let policy = MatchPolicy::from(&settings);
        let candidate = Candidate {
            index_a: 0,
            index_b: 0,
            distance: 0.5,
            second_distance: Some(0.6),
        };
        assert!(!policy.accept(&candidate));
        assert!(MatchPolicy::default().accept(&candidate));
    }

    #[test]
    fn index_a_never_repeats() {
        let a = features(&[&[0.0], &[0.1], &[0.2], &[0.3]]);
        let b = features(&[&[0.0]]);
        let matches = Matcher::new().match_features(&a, &b);
        let mut seen = matches.iter().map(|m| m.index_a).collect::<Vec<_>>();
        seen.dedup();
        assert_eq!(seen.len(), matches.len());
        assert_eq!(matches.len(), 4);
    }
}
