use glam::Vec4;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Vec4,
}

/// Decoded gradient colour ramp.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GradientRamp {
    pub stops: Vec<GradientStop>,
}

impl GradientRamp {
    /// Decodes `stop_count` colour stops of `(offset, r, g, b)` followed
    /// by optional `(offset, alpha)` pairs. Fails when the colour section
    /// is shorter than declared.
    pub fn decode(raw: &[f32], stop_count: usize) -> Result<Self> {
        let color_len = stop_count * 4;
        if raw.len() < color_len {
            return Err(EngineError::MalformedGradient {
                stops: stop_count,
                len: raw.len(),
            });
        }
        Ok(Self::decode_complete(raw, stop_count))
    }

    /// Decodes whichever colour stops are complete, ignoring the declared
    /// count when the array is short.
    pub fn decode_lenient(raw: &[f32], stop_count: usize) -> Self {
        Self::decode_complete(raw, stop_count.min(raw.len() / 4))
    }

    fn decode_complete(raw: &[f32], stop_count: usize) -> Self {
        let color_len = stop_count * 4;
        let colors: Vec<(f32, [f32; 3])> = raw[..color_len]
            .chunks_exact(4)
            .map(|c| (c[0], [c[1], c[2], c[3]]))
            .collect();
        let alphas: Vec<(f32, f32)> = raw[color_len..]
            .chunks_exact(2)
            .map(|c| (c[0], c[1]))
            .collect();

        if alphas.is_empty() {
            return Self {
                stops: colors
                    .iter()
                    .map(|&(offset, [r, g, b])| GradientStop {
                        offset,
                        color: Vec4::new(r, g, b, 1.0),
                    })
                    .collect(),
            };
        }

        // Colour and alpha stops may sit at different offsets; sample both
        // ramps at the union of offsets.
        let mut offsets: Vec<f32> = colors
            .iter()
            .map(|c| c.0)
            .chain(alphas.iter().map(|a| a.0))
            .collect();
        offsets.sort_by(|a, b| a.total_cmp(b));
        offsets.dedup();

        let stops = offsets
            .into_iter()
            .map(|offset| {
                let [r, g, b] = sample_ramp(&colors, offset, [1.0; 3], |a, b, t| {
                    [
                        a[0] + (b[0] - a[0]) * t,
                        a[1] + (b[1] - a[1]) * t,
                        a[2] + (b[2] - a[2]) * t,
                    ]
                });
                let alpha = sample_ramp(&alphas, offset, 1.0, |a, b, t| a + (b - a) * t);
                GradientStop {
                    offset,
                    color: Vec4::new(r, g, b, alpha),
                }
            })
            .collect();
        Self { stops }
    }
}

fn sample_ramp<V: Copy>(
    stops: &[(f32, V)],
    offset: f32,
    empty: V,
    lerp: impl Fn(V, V, f32) -> V,
) -> V {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return empty;
    };
    if offset <= first.0 {
        return first.1;
    }
    if offset >= last.0 {
        return last.1;
    }
    for pair in stops.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if offset >= a.0 && offset <= b.0 {
            let range = b.0 - a.0;
            let t = if range == 0.0 { 0.0 } else { (offset - a.0) / range };
            return lerp(a.1, b.1, t);
        }
    }
    last.1
}

/// Resolved stroke dash pattern.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashPattern {
    pub lengths: Vec<f32>,
    pub offset: f32,
}

impl DashPattern {
    /// Odd-length arrays are repeated to even length; the offset is wrapped
    /// into `[0, total)`. Returns `None` for an empty array.
    pub fn resolve(mut lengths: Vec<f32>, offset: f32) -> Option<Self> {
        if lengths.is_empty() {
            return None;
        }
        if lengths.len() % 2 != 0 {
            lengths.extend_from_within(..);
        }
        let total: f32 = lengths.iter().sum();
        let offset = if total > 0.0 {
            offset.rem_euclid(total)
        } else {
            0.0
        };
        Some(Self { lengths, offset })
    }
}

/// Parses `#rrggbb` (optionally `#rrggbbaa`) into a colour in `0..=1`.
pub fn parse_hex_color(hex: &str) -> Option<Vec4> {
    let digits = hex.trim().trim_start_matches('#');
    if !digits.is_ascii() || (digits.len() != 6 && digits.len() != 8) {
        return None;
    }
    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .ok()
            .map(|v| v as f32 / 255.0)
    };
    let alpha = if digits.len() == 8 { channel(6)? } else { 1.0 };
    Some(Vec4::new(channel(0)?, channel(2)?, channel(4)?, alpha))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_color_stops() {
        let ramp = GradientRamp::decode(&[0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0], 2)
            .expect("complete ramp");
        assert_eq!(ramp.stops.len(), 2);
        assert_eq!(ramp.stops[1].color, Vec4::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn merges_alpha_stops_at_union_offsets() {
        let raw = [
            0.0, 1.0, 1.0, 1.0, //
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.5, 0.0,
        ];
        let ramp = GradientRamp::decode(&raw, 2).expect("complete ramp");
        let offsets: Vec<f32> = ramp.stops.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0.0, 0.5, 1.0]);
        assert_eq!(ramp.stops[1].color, Vec4::new(0.5, 0.5, 0.5, 0.0));
        assert_eq!(ramp.stops[0].color.w, 1.0);
    }

    #[test]
    fn short_arrays_are_rejected_and_lenient_decoding_keeps_complete_stops() {
        let raw = [0.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        assert!(matches!(
            GradientRamp::decode(&raw, 2),
            Err(EngineError::MalformedGradient { stops: 2, len: 6 })
        ));
        assert_eq!(GradientRamp::decode_lenient(&raw, 2).stops.len(), 1);
    }

    #[test]
    fn odd_dash_arrays_are_doubled_and_offset_wraps() {
        let dash = DashPattern::resolve(vec![4.0, 2.0, 1.0], 15.0).expect("dash");
        assert_eq!(dash.lengths, vec![4.0, 2.0, 1.0, 4.0, 2.0, 1.0]);
        assert_eq!(dash.offset, 1.0);
        assert_eq!(DashPattern::resolve(vec![3.0, 1.0], -1.0).map(|d| d.offset), Some(3.0));
        assert!(DashPattern::resolve(Vec::new(), 0.0).is_none());
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_hex_color("#ff0000"), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        assert_eq!(parse_hex_color("00ff0080").map(|c| c.w), Some(128.0 / 255.0));
        assert_eq!(parse_hex_color("#12"), None);
    }
}
