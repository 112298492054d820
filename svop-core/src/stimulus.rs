use serde::{Deserialize, Serialize};

/// A stimulus location in screen pixels, numbered from 1 in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StimulusPoint {
    pub index: usize,
    pub x: i32,
    pub y: i32,
}

impl StimulusPoint {
    pub fn new(index: usize, x: i32, y: i32) -> Self {
        Self { index, x, y }
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }
}

/// Goldmann perimetry stimulus sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StimulusSize {
    #[serde(rename = "I")]
    GoldmannI,
    #[serde(rename = "II")]
    GoldmannII,
    #[serde(rename = "III")]
    GoldmannIII,
    #[default]
    #[serde(rename = "IV")]
    GoldmannIV,
    #[serde(rename = "V")]
    GoldmannV,
}

impl StimulusSize {
    /// Angle subtended at the eye, in degrees.
    pub fn angular_diameter_deg(&self) -> f64 {
        match self {
            StimulusSize::GoldmannI => 0.11,
            StimulusSize::GoldmannII => 0.22,
            StimulusSize::GoldmannIII => 0.43,
            StimulusSize::GoldmannIV => 0.86,
            StimulusSize::GoldmannV => 1.72,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StimulusSize::GoldmannI => "Goldmann I",
            StimulusSize::GoldmannII => "Goldmann II",
            StimulusSize::GoldmannIII => "Goldmann III",
            StimulusSize::GoldmannIV => "Goldmann IV",
            StimulusSize::GoldmannV => "Goldmann V",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "I" | "1" => Some(Self::GoldmannI),
            "II" | "2" => Some(Self::GoldmannII),
            "III" | "3" => Some(Self::GoldmannIII),
            "IV" | "4" => Some(Self::GoldmannIV),
            "V" | "5" => Some(Self::GoldmannV),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_size_is_goldmann_iv() {
        assert_eq!(StimulusSize::default(), StimulusSize::GoldmannIV);
        assert_eq!(StimulusSize::default().angular_diameter_deg(), 0.86);
    }

    #[test]
    fn sizes_double_per_step() {
        let sizes = [
            StimulusSize::GoldmannII,
            StimulusSize::GoldmannIII,
            StimulusSize::GoldmannIV,
            StimulusSize::GoldmannV,
        ];
        let mut prev = StimulusSize::GoldmannI.angular_diameter_deg();
        for s in sizes {
            let d = s.angular_diameter_deg();
            assert!((d / prev - 2.0).abs() < 0.1, "{} vs {}", d, prev);
            prev = d;
        }
    }

    #[test]
    fn parse_roman_and_digits() {
        assert_eq!(StimulusSize::from_str("IV"), Some(StimulusSize::GoldmannIV));
        assert_eq!(StimulusSize::from_str("3"), Some(StimulusSize::GoldmannIII));
        assert_eq!(StimulusSize::from_str("VI"), None);
    }
}
