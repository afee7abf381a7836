use anyhow::bail;
use rand::Rng;

use crate::models::constants::CENTS_PER_UNIT;
use crate::models::rewards::WheelSegment;

/// Weighted wheel. Weights are relative and need not sum to one.
#[derive(Clone, Debug)]
pub struct Wheel {
    segments: Vec<WheelSegment>,
    total_weight: f64,
}

impl Wheel {
    pub fn new(segments: Vec<WheelSegment>) -> Result<Self, anyhow::Error> {
        if segments.is_empty() {
            bail!("Wheel has no segments.");
        }
        for segment in &segments {
            if !segment.weight.is_finite() || segment.weight < 0.0 {
                bail!("Segment {} has an invalid weight.", segment.label);
            }
            if segment.payout_in_cents < 0 {
                bail!("Segment {} has a negative payout.", segment.label);
            }
        }

        let total_weight: f64 = segments.iter().map(|s| s.weight).sum();
        if total_weight <= 0.0 {
            bail!("Wheel weights must not all be zero.");
        }

        Ok(Self {
            segments,
            total_weight,
        })
    }

    pub fn segments(&self) -> &[WheelSegment] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&WheelSegment> {
        self.segments.get(index)
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Maps a draw in `[0, total_weight)` to the first segment whose cumulative
    /// weight reaches it. A draw on a boundary goes to the earlier segment.
    pub fn select(&self, draw: f64) -> usize {
        let mut cumulative = 0.0;
        for (index, segment) in self.segments.iter().enumerate() {
            cumulative += segment.weight;
            if segment.weight > 0.0 && draw <= cumulative {
                return index;
            }
        }

        // Float accumulation can land just short of the draw.
        self.segments
            .iter()
            .rposition(|s| s.weight > 0.0)
            .unwrap_or(self.segments.len() - 1)
    }

    pub fn spin<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let draw = rng.gen::<f64>() * self.total_weight;
        self.select(draw)
    }
}

impl Default for Wheel {
    fn default() -> Self {
        Self {
            total_weight: default_segments().iter().map(|s| s.weight).sum(),
            segments: default_segments(),
        }
    }
}

pub fn default_segments() -> Vec<WheelSegment> {
    vec![
        WheelSegment::new("₹10", 10 * CENTS_PER_UNIT, 0.3),
        WheelSegment::new("Try Again", 0, 0.2),
        WheelSegment::new("₹50", 50 * CENTS_PER_UNIT, 0.15),
        WheelSegment::new("Bonus", 5 * CENTS_PER_UNIT, 0.2),
        WheelSegment::new("₹100", 100 * CENTS_PER_UNIT, 0.09),
        WheelSegment::new("JACKPOT", 500 * CENTS_PER_UNIT, 0.01),
        WheelSegment::new("₹20", 20 * CENTS_PER_UNIT, 0.2),
        WheelSegment::new("Zero", 0, 0.2),
    ]
}
