use crate::shared::entities::{Resource, ResourceCategory, SentimentLabel};

/// Below this a negative check-in is steered towards in-person counseling first.
const LOW_NEGATIVE_SCORE: f64 = 0.3;

#[derive(Debug, Clone, Copy)]
struct ResourceDef {
    title: &'static str,
    description: &'static str,
    url: &'static str,
    category: ResourceCategory,
}

impl ResourceDef {
    fn build(&self) -> Resource {
        Resource {
            title: self.title.to_string(),
            description: self.description.to_string(),
            url: self.url.to_string(),
            category: self.category,
        }
    }
}

const GET_HELP_NOW: ResourceDef = ResourceDef {
    title: "Get Help Now",
    description: "Call or text 988 to reach the Suicide & Crisis Lifeline, 24/7",
    url: "tel:988",
    category: ResourceCategory::Emergency,
};

const CRISIS_TEXT_LINE: ResourceDef = ResourceDef {
    title: "Crisis Text Line",
    description: "Text HOME to 741741 for free, confidential support",
    url: "https://crisistextline.org",
    category: ResourceCategory::Emergency,
};

const CAMPUS_COUNSELING: ResourceDef = ResourceDef {
    title: "University Counseling Center",
    description: "Free counseling services for students",
    url: "https://counseling.university.edu",
    category: ResourceCategory::Counseling,
};

const ONLINE_THERAPY: ResourceDef = ResourceDef {
    title: "BetterHelp Online Therapy",
    description: "Licensed therapists online, with student pricing",
    url: "https://betterhelp.com/students",
    category: ResourceCategory::Counseling,
};

const THERAPIST_FINDER: ResourceDef = ResourceDef {
    title: "Psychology Today Therapist Finder",
    description: "Find a therapist for a preventive check-in before stress builds up",
    url: "https://psychologytoday.com/therapists",
    category: ResourceCategory::Counseling,
};

const HEADSPACE: ResourceDef = ResourceDef {
    title: "Headspace for Students",
    description: "Short guided meditations for focus and sleep",
    url: "https://headspace.com/students",
    category: ResourceCategory::Meditation,
};

const MINDFULNESS_APP: ResourceDef = ResourceDef {
    title: "Mindfulness Meditation App",
    description: "Guided meditation for stress relief",
    url: "https://meditation-app.com",
    category: ResourceCategory::Meditation,
};

const MAINTENANCE_TIPS: ResourceDef = ResourceDef {
    title: "Achievement Maintenance Tips",
    description: "Habits that help you keep a good streak going",
    url: "https://wellness.com",
    category: ResourceCategory::Meditation,
};

/// Three resources chosen from score and label; crisis always leads with emergency contacts.
pub fn select_resources(score: f64, label: SentimentLabel, is_crisis: bool) -> Vec<Resource> {
    let picks: [ResourceDef; 3] = if is_crisis {
        [GET_HELP_NOW, CRISIS_TEXT_LINE, CAMPUS_COUNSELING]
    } else {
        match label {
            SentimentLabel::Negative if score < LOW_NEGATIVE_SCORE => {
                [CAMPUS_COUNSELING, ONLINE_THERAPY, HEADSPACE]
            }
            SentimentLabel::Negative => [ONLINE_THERAPY, CAMPUS_COUNSELING, MINDFULNESS_APP],
            SentimentLabel::Neutral => [MINDFULNESS_APP, HEADSPACE, THERAPIST_FINDER],
            SentimentLabel::Positive => [HEADSPACE, MINDFULNESS_APP, MAINTENANCE_TIPS],
        }
    };
    picks.iter().map(ResourceDef::build).collect()
}

pub fn motivational_message(score: f64, label: SentimentLabel, is_crisis: bool) -> &'static str {
    if is_crisis {
        return "You don't have to go through this alone. Please reach out right now: call or text 988, \
                or text HOME to 741741. Someone is there to help, any time of day.";
    }
    match label {
        SentimentLabel::Negative if score < LOW_NEGATIVE_SCORE => {
            "Thank you for sharing how you feel. It takes courage. Talking with a counselor \
             or someone you trust can make a real difference, and you deserve that support."
        }
        SentimentLabel::Negative => {
            "It's tough right now, but you're doing well enough. Taking it one step at a time, \
             everything will be okay."
        }
        SentimentLabel::Neutral => {
            "Taking a moment to check in with yourself is a healthy habit. Cherish this moment. \
             Your efforts will create good results."
        }
        SentimentLabel::Positive => {
            "You're doing really well! Keep maintaining this positive energy."
        }
    }
}
