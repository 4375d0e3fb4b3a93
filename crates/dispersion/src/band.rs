use serde::{Deserialize, Serialize};

/// Number of offset steps the dispersion loop takes per fragment.
pub const BAND_SAMPLES: u32 = 16;

/// Upper bound on the loop count. Keeps the fragment loop well inside GPU
/// watchdog limits and the count exactly representable as `f32`.
pub const MAX_BAND_SAMPLES: u32 = 256;

/// Maximum extra offset reached by the last sampling step, before the
/// per-band spread weight is applied.
pub const SLIDE_RANGE: f32 = 0.1;

/// One of the six simulated spectral samples.
///
/// Primary bands map directly onto a stored color channel. Secondary bands
/// are reconstructed from two neighbouring channels minus the third.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Red,
    Yellow,
    Green,
    Cyan,
    Blue,
    Purple,
}

impl Band {
    /// All bands in spectral order.
    pub const ALL: [Band; 6] = [
        Band::Red,
        Band::Yellow,
        Band::Green,
        Band::Cyan,
        Band::Blue,
        Band::Purple,
    ];

    /// Multiplier applied to the slide offset, staggering how far each band
    /// spreads across the loop.
    pub fn spread_weight(self) -> f32 {
        match self {
            Band::Red => 1.0,
            Band::Yellow => 1.0,
            Band::Green => 2.0,
            Band::Cyan => 2.5,
            Band::Blue => 3.0,
            Band::Purple => 1.0,
        }
    }

    /// Scalar intensity of this band extracted from a sampled RGB texel.
    pub fn extract(self, rgb: [f32; 3]) -> f32 {
        let [r, g, b] = rgb;
        match self {
            Band::Red => r * 0.5,
            Band::Green => g * 0.5,
            Band::Blue => b * 0.5,
            Band::Yellow => (r * 2.0 + g * 2.0 - b) / 6.0,
            Band::Cyan => (g * 2.0 + b * 2.0 - r) / 6.0,
            Band::Purple => (b * 2.0 + r * 2.0 - g) / 6.0,
        }
    }

    /// Short lowercase name used in parameter keys and log output.
    pub fn name(self) -> &'static str {
        match self {
            Band::Red => "red",
            Band::Yellow => "yellow",
            Band::Green => "green",
            Band::Cyan => "cyan",
            Band::Blue => "blue",
            Band::Purple => "purple",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-band scalars in `Band::ALL` order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandValues(pub [f32; 6]);

impl BandValues {
    pub fn get(&self, band: Band) -> f32 {
        self.0[band as usize]
    }

    pub fn set(&mut self, band: Band, value: f32) {
        self.0[band as usize] = value;
    }

    /// Fold the six band scalars back into RGB.
    pub fn recombine(&self) -> [f32; 3] {
        let r = self.get(Band::Red);
        let y = self.get(Band::Yellow);
        let g = self.get(Band::Green);
        let c = self.get(Band::Cyan);
        let b = self.get(Band::Blue);
        let p = self.get(Band::Purple);
        [
            r + (2.0 * p + 2.0 * y - c) / 3.0,
            g + (2.0 * y + 2.0 * c - p) / 3.0,
            b + (2.0 * c + 2.0 * p - y) / 3.0,
        ]
    }
}

/// Slide offset for loop step `i` out of `samples`.
pub fn slide(i: u32, samples: u32) -> f32 {
    i as f32 / samples as f32 * SLIDE_RANGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_stagger_spread() {
        let weights: Vec<f32> = Band::ALL.iter().map(|b| b.spread_weight()).collect();
        assert_eq!(weights, vec![1.0, 1.0, 2.0, 2.5, 3.0, 1.0]);
    }

    #[test]
    fn primaries_take_half_channel() {
        let texel = [0.8, 0.4, 0.2];
        assert_eq!(Band::Red.extract(texel), 0.4);
        assert_eq!(Band::Green.extract(texel), 0.2);
        assert_eq!(Band::Blue.extract(texel), 0.1);
    }

    #[test]
    fn pure_red_fixture() {
        // Worked by hand from the extraction and recombination formulas:
        // r = 1/2, y = 2/6, g = 0, c = -1/6, b = 0, p = 2/6
        let texel = [1.0, 0.0, 0.0];
        let mut bands = BandValues::default();
        for band in Band::ALL {
            bands.set(band, band.extract(texel));
        }
        let expected_bands = [0.5, 1.0 / 3.0, 0.0, -1.0 / 6.0, 0.0, 1.0 / 3.0];
        for (got, want) in bands.0.iter().zip(expected_bands) {
            assert!((got - want).abs() < 1e-6, "{got} != {want}");
        }

        // R = 1/2 + (2/3 + 2/3 + 1/6)/3 = 1/2 + 1/2 = 1
        // G = 0 + (2/3 - 1/3 - 1/3)/3 = 0
        // B = 0 + (-1/3 + 2/3 - 1/3)/3 = 0
        let [r, g, b] = bands.recombine();
        assert!((r - 1.0).abs() < 1e-6);
        assert!(g.abs() < 1e-6);
        assert!(b.abs() < 1e-6);
    }

    #[test]
    fn slide_spans_range() {
        assert_eq!(slide(0, BAND_SAMPLES), 0.0);
        assert!((slide(8, BAND_SAMPLES) - 0.05).abs() < 1e-7);
        assert!(slide(BAND_SAMPLES - 1, BAND_SAMPLES) < SLIDE_RANGE);
    }
}
