//! Spoken alert texts, rendered in the configured language.

use crate::config::Language;
use crate::types::DetectionResult;

#[derive(Debug, Clone, Copy)]
pub struct Messages {
    language: Language,
}

/// Whole centimeters, as announced.
fn centimeters(distance_cm: f64) -> u32 {
    distance_cm.max(0.0) as u32
}

impl Messages {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// Imminent collision.
    pub fn danger(&self, distance_cm: f64, label: Option<&str>) -> String {
        let cm = centimeters(distance_cm);
        match (self.language, label) {
            (Language::English, None) => format!("Warning! Obstacle at {cm} centimeters"),
            (Language::English, Some(l)) => format!("Warning! {l} at {cm} centimeters"),
            (Language::French, None) => format!("Attention! Obstacle à {cm} centimètres"),
            (Language::French, Some(l)) => format!("Attention! {l} à {cm} centimètres"),
        }
    }

    /// Obstacle inside the warning band.
    pub fn range_warning(&self, distance_cm: f64, label: Option<&str>) -> String {
        let cm = centimeters(distance_cm);
        match (self.language, label) {
            (Language::English, None) => format!("Obstacle at {cm} centimeters"),
            (Language::English, Some(l)) => format!("{l} at {cm} centimeters"),
            (Language::French, None) => format!("Obstacle à {cm} centimètres"),
            (Language::French, Some(l)) => format!("{l} à {cm} centimètres"),
        }
    }

    /// Confident close detection without a range confirmation.
    pub fn vision_warning(&self, label: &str) -> String {
        match self.language {
            Language::English => format!("{label} ahead"),
            Language::French => format!("{label} devant"),
        }
    }

    /// Summary of what the camera sees, grouped by label in order of salience.
    ///
    /// "Detected: a person, 2 chairs and a dog."
    pub fn detection_summary(&self, detections: &[DetectionResult]) -> String {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for d in detections {
            match counts.iter_mut().find(|(label, _)| *label == d.label) {
                Some((_, n)) => *n += 1,
                None => counts.push((d.label.as_str(), 1)),
            }
        }

        let (prefix, and, nothing) = match self.language {
            Language::English => ("Detected", "and", "No object detected."),
            Language::French => ("Détecté", "et", "Aucun objet détecté."),
        };

        let mut parts: Vec<String> = counts
            .iter()
            .map(|&(label, n)| self.counted(label, n))
            .collect();
        let Some(last) = parts.pop() else {
            return nothing.to_string();
        };
        if parts.is_empty() {
            format!("{prefix}: {last}.")
        } else {
            format!("{prefix}: {} {and} {last}.", parts.join(", "))
        }
    }

    pub fn sensors_unavailable(&self) -> String {
        match self.language {
            Language::English => "Sensors unavailable".to_string(),
            Language::French => "Capteurs indisponibles".to_string(),
        }
    }

    fn counted(&self, label: &str, n: usize) -> String {
        if n > 1 {
            return format!("{n} {label}s");
        }
        match self.language {
            Language::English => {
                let article = match label.chars().next() {
                    Some(c) if "aeiouAEIOU".contains(c) => "an",
                    _ => "a",
                };
                format!("{article} {label}")
            }
            Language::French => format!("un {label}"),
        }
    }
}
