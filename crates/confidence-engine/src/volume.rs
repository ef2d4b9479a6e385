use analysis_core::adaptive;
use serde::{Deserialize, Serialize};
use std::fmt;

const MIN_HISTORY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeGrade {
    A,
    B,
    C,
    D,
    F,
    /// Not enough data to grade. Distinct from F, which means thin trading.
    Unknown,
}

impl VolumeGrade {
    /// Label stored in `predictions.volume_grade`.
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeGrade::A => "A",
            VolumeGrade::B => "B",
            VolumeGrade::C => "C",
            VolumeGrade::D => "D",
            VolumeGrade::F => "F",
            VolumeGrade::Unknown => "Unknown",
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            VolumeGrade::A => 1.0,
            VolumeGrade::B => 0.85,
            VolumeGrade::C => 0.7,
            VolumeGrade::D => 0.45,
            VolumeGrade::F => 0.2,
            VolumeGrade::Unknown => 0.5,
        }
    }

    fn from_ratio(ratio: f64) -> Self {
        if ratio >= 1.5 {
            VolumeGrade::A
        } else if ratio >= 1.2 {
            VolumeGrade::B
        } else if ratio >= 0.8 {
            VolumeGrade::C
        } else if ratio >= 0.5 {
            VolumeGrade::D
        } else {
            VolumeGrade::F
        }
    }
}

impl fmt::Display for VolumeGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeQuality {
    pub grade: VolumeGrade,
    pub score: f64,
    pub ratio: Option<f64>,
    pub missing_data: bool,
}

impl VolumeQuality {
    pub fn unknown() -> Self {
        Self {
            grade: VolumeGrade::Unknown,
            score: VolumeGrade::Unknown.score(),
            ratio: None,
            missing_data: true,
        }
    }
}

/// Grade the current volume against recent history.
pub fn assess_volume(current: Option<f64>, history: &[f64]) -> VolumeQuality {
    let history: Vec<f64> = history.iter().copied().filter(|v| v.is_finite()).collect();
    if history.len() < MIN_HISTORY {
        return VolumeQuality::unknown();
    }

    let avg = adaptive::mean(&history);
    let current = match current {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => return VolumeQuality::unknown(),
    };
    if avg <= 0.0 {
        return VolumeQuality::unknown();
    }

    let ratio = current / avg;
    let grade = VolumeGrade::from_ratio(ratio);
    VolumeQuality {
        grade,
        score: grade.score(),
        ratio: Some(ratio),
        missing_data: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grades_by_ratio() {
        let history = [100.0; 10];
        let cases = [
            (200.0, VolumeGrade::A),
            (150.0, VolumeGrade::A),
            (130.0, VolumeGrade::B),
            (100.0, VolumeGrade::C),
            (60.0, VolumeGrade::D),
            (10.0, VolumeGrade::F),
        ];
        for (current, expected) in cases {
            let quality = assess_volume(Some(current), &history);
            assert_eq!(quality.grade, expected, "current = {}", current);
            assert!(!quality.missing_data);
        }
    }

    #[test]
    fn test_missing_data_is_unknown_not_f() {
        let short = assess_volume(Some(100.0), &[100.0, 100.0]);
        assert_eq!(short.grade, VolumeGrade::Unknown);
        assert!(short.missing_data);
        assert_eq!(short.score, 0.5);

        assert_eq!(assess_volume(None, &[100.0; 10]).grade, VolumeGrade::Unknown);
        assert_eq!(assess_volume(Some(100.0), &[0.0; 10]).grade, VolumeGrade::Unknown);
    }

    #[test]
    fn test_display_matches_stored_label() {
        assert_eq!(VolumeGrade::A.to_string(), "A");
        assert_eq!(VolumeGrade::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn test_zero_current_volume_is_f() {
        let quality = assess_volume(Some(0.0), &[100.0; 10]);
        assert_eq!(quality.grade, VolumeGrade::F);
        assert_eq!(quality.ratio, Some(0.0));
    }
}
