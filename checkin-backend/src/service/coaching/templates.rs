use crate::shared::entities::{BreathingExercise, SentimentLabel, StretchExercise};

/// Static exercise content for one sentiment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExerciseTemplate {
    pub breathing_title: &'static str,
    pub breathing_minutes: u32,
    pub breathing_steps: &'static [&'static str],
    pub stretch_title: &'static str,
    pub stretch_steps: &'static [&'static str],
}

const NEGATIVE: ExerciseTemplate = ExerciseTemplate {
    breathing_title: "5-Minute Stress Relief Breathing",
    breathing_minutes: 5,
    breathing_steps: &[
        "Sit comfortably and close your eyes",
        "Breathe in slowly for 4 seconds",
        "Hold your breath for 7 seconds",
        "Exhale slowly for 8 seconds",
        "Repeat 4 times",
    ],
    stretch_title: "Tension Relief Stretches",
    stretch_steps: &[
        "Slowly roll your neck and shoulders",
        "Stretch your arms up and down",
        "Take deep breaths and release tension",
    ],
};

const NEUTRAL: ExerciseTemplate = ExerciseTemplate {
    breathing_title: "Daily Management Breathing",
    breathing_minutes: 3,
    breathing_steps: &[
        "Sit in a comfortable position",
        "Breathe in naturally",
        "Pause briefly and release tension",
        "Exhale slowly",
        "Repeat for 3 minutes",
    ],
    stretch_title: "Energy Recharge Stretches",
    stretch_steps: &[
        "Turn your neck left and right",
        "Raise and lower your shoulders",
        "Stretch your arms to relax your body",
    ],
};

const POSITIVE: ExerciseTemplate = ExerciseTemplate {
    breathing_title: "Energy Maintenance Breathing",
    breathing_minutes: 2,
    breathing_steps: &[
        "Take a deep breath",
        "Feel the positive energy",
        "Exhale slowly",
        "Maintain this good feeling",
        "Repeat for 2 minutes",
    ],
    stretch_title: "Vitality Boost Stretches",
    stretch_steps: &[
        "Stretch your arms high up",
        "Lean your body left and right",
        "Feel the positive energy throughout your body",
    ],
};

pub fn template_for(label: SentimentLabel) -> &'static ExerciseTemplate {
    match label {
        SentimentLabel::Negative => &NEGATIVE,
        SentimentLabel::Neutral => &NEUTRAL,
        SentimentLabel::Positive => &POSITIVE,
    }
}

impl ExerciseTemplate {
    pub fn breathing(&self) -> BreathingExercise {
        BreathingExercise {
            title: self.breathing_title.to_string(),
            instructions: self.breathing_steps.iter().map(|s| s.to_string()).collect(),
            duration: self.breathing_minutes,
        }
    }

    pub fn stretch(&self) -> StretchExercise {
        StretchExercise {
            title: self.stretch_title.to_string(),
            instructions: self.stretch_steps.iter().map(|s| s.to_string()).collect(),
            image_url: None,
        }
    }
}
