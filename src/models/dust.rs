//! Dust extinction curves.
//!
//! `BumpMixtureLaw` follows the Cardelli, Clayton & Mathis (1989) R(V)
//! parameterization, with the 2175 A bump terms of the UV branch scaled by
//! `fbump`. `fbump = 1` is plain CCM89, `fbump = 0` a bump-free curve. The
//! bump contribution at x = 3.3 um^-1 is held fixed so the UV branch stays
//! continuous with the optical one for every `fbump`.

use crate::domain::DustParams;

/// Wavelength-dependent extinction normalized to the V band.
pub trait ExtinctionLaw: Send + Sync {
    fn name(&self) -> &str;

    /// A(lambda) / A(V) at `wavelength_nm`.
    fn a_lambda_over_av(&self, wavelength_nm: f64, rv: f64, fbump: f64) -> f64;

    /// Multiplicative flux transmission 10^(-0.4 A(lambda)) at each wavelength.
    fn transmission(&self, wavelengths_nm: &[f64], dust: &DustParams) -> Vec<f64> {
        wavelengths_nm
            .iter()
            .map(|&w| 10f64.powf(-0.4 * dust.av * self.a_lambda_over_av(w, dust.rv, dust.fbump)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BumpMixtureLaw;

impl BumpMixtureLaw {
    /// Valid range of the parameterization in inverse microns.
    const X_MIN: f64 = 0.3;
    const X_MAX: f64 = 8.0;
    const X_UV: f64 = 3.3;

    fn bump_a(x: f64) -> f64 {
        -0.104 / ((x - 4.67).powi(2) + 0.341)
    }

    fn bump_b(x: f64) -> f64 {
        1.206 / ((x - 4.62).powi(2) + 0.263)
    }

    /// CCM89 (a, b) coefficients at inverse wavelength `x`.
    fn coefficients(x: f64, fbump: f64) -> (f64, f64) {
        if x < 1.1 {
            let p = x.powf(1.61);
            (0.574 * p, -0.527 * p)
        } else if x < Self::X_UV {
            let y = x - 1.82;
            let a = horner(
                y,
                &[1.0, 0.17699, -0.50447, -0.02427, 0.72085, 0.01979, -0.77530, 0.32999],
            );
            let b = horner(
                y,
                &[0.0, 1.41338, 2.28305, 1.07233, -5.38434, -0.62251, 5.30260, -2.09002],
            );
            (a, b)
        } else {
            let (fa, fb) = if x >= 5.9 {
                let d = x - 5.9;
                (
                    -0.04473 * d * d - 0.009779 * d * d * d,
                    0.2130 * d * d + 0.1207 * d * d * d,
                )
            } else {
                (0.0, 0.0)
            };
            let ba = fbump * Self::bump_a(x) + (1.0 - fbump) * Self::bump_a(Self::X_UV);
            let bb = fbump * Self::bump_b(x) + (1.0 - fbump) * Self::bump_b(Self::X_UV);
            (1.752 - 0.316 * x + ba + fa, -3.090 + 1.825 * x + bb + fb)
        }
    }
}

fn horner(y: f64, coeffs: &[f64]) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * y + c)
}

impl ExtinctionLaw for BumpMixtureLaw {
    fn name(&self) -> &str {
        "ccm89-bump-mixture"
    }

    fn a_lambda_over_av(&self, wavelength_nm: f64, rv: f64, fbump: f64) -> f64 {
        let x = (1000.0 / wavelength_nm).clamp(Self::X_MIN, Self::X_MAX);
        let (a, b) = Self::coefficients(x, fbump.clamp(0.0, 1.0));
        a + b / rv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v_band_is_normalized() {
        let law = BumpMixtureLaw;
        // x = 1.82 um^-1 is the CCM89 V reference point.
        let v = law.a_lambda_over_av(1000.0 / 1.82, 3.1, 1.0);
        assert!((v - 1.0).abs() < 1e-12, "{v}");
    }

    #[test]
    fn bump_strength_scales_with_fbump() {
        let law = BumpMixtureLaw;
        let full = law.a_lambda_over_av(217.5, 3.1, 1.0);
        let half = law.a_lambda_over_av(217.5, 3.1, 0.5);
        let none = law.a_lambda_over_av(217.5, 3.1, 0.0);
        assert!(full > half && half > none);
        assert!(((full + none) / 2.0 - half).abs() < 1e-12);
    }

    #[test]
    fn uv_branch_is_continuous_for_any_fbump() {
        let law = BumpMixtureLaw;
        let eps = 1e-9;
        for fbump in [0.0, 0.3, 1.0] {
            let blue = law.a_lambda_over_av(1000.0 / (3.3 + eps), 3.1, fbump);
            let red = law.a_lambda_over_av(1000.0 / (3.3 - eps), 3.1, fbump);
            assert!((blue - red).abs() < 1e-3, "fbump={fbump}: {blue} vs {red}");
        }
    }

    #[test]
    fn extinction_falls_toward_the_infrared() {
        let law = BumpMixtureLaw;
        let b = law.a_lambda_over_av(440.0, 3.1, 1.0);
        let i = law.a_lambda_over_av(810.0, 3.1, 1.0);
        let h = law.a_lambda_over_av(1600.0, 3.1, 1.0);
        assert!(b > 1.0 && i < 1.0 && h < i);
    }

    #[test]
    fn zero_av_is_transparent() {
        let law = BumpMixtureLaw;
        let t = law.transmission(&[300.0, 550.0, 1500.0], &DustParams { av: 0.0, rv: 3.1, fbump: 1.0 });
        assert_eq!(t, vec![1.0, 1.0, 1.0]);
    }
}
