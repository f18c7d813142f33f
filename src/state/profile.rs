//! Pure normalization of untrusted client-supplied profile attributes.
//! Never fails: unrecognized input coerces to the neutral value of its
//! domain rather than being rejected.

use crate::protocol::{
    AgeBucket, AgePreference, ChatType, Gender, GenderPreference, PeerProfile, RawProfile,
};

const MAX_KEYWORDS: usize = 10;
const MAX_KEYWORD_LEN: usize = 50;
const MAX_LOCATION_LEN: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub gender: Gender,
    pub age: AgeBucket,
    pub location: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub gender: GenderPreference,
    pub age: AgePreference,
    pub chat_type: ChatType,
}

impl From<&Profile> for PeerProfile {
    fn from(profile: &Profile) -> Self {
        PeerProfile {
            gender: profile.gender,
            age: profile.age,
            location: profile.location.clone(),
            keywords: profile.keywords.clone(),
        }
    }
}

fn normalize_gender(raw: Option<&str>) -> Gender {
    match raw.map(|s| s.to_lowercase()) {
        Some(ref s) if s == "male" => Gender::Male,
        Some(ref s) if s == "female" => Gender::Female,
        Some(ref s) if s == "other" => Gender::Other,
        _ => Gender::NotSpecified,
    }
}

fn normalize_age(raw: Option<&str>) -> AgeBucket {
    match raw.map(|s| s.to_lowercase()) {
        Some(ref s) if s == "18-25" => AgeBucket::R18To25,
        Some(ref s) if s == "26-35" => AgeBucket::R26To35,
        Some(ref s) if s == "36-45" => AgeBucket::R36To45,
        Some(ref s) if s == "46+" => AgeBucket::R46Plus,
        _ => AgeBucket::NotSpecified,
    }
}

fn normalize_gender_pref(raw: Option<&str>) -> GenderPreference {
    match raw.map(|s| s.to_lowercase()) {
        Some(ref s) if s == "male" => GenderPreference::Male,
        Some(ref s) if s == "female" => GenderPreference::Female,
        Some(ref s) if s == "other" => GenderPreference::Other,
        _ => GenderPreference::Any,
    }
}

fn normalize_age_pref(raw: Option<&str>) -> AgePreference {
    match raw.map(|s| s.to_lowercase()) {
        Some(ref s) if s == "18-25" => AgePreference::R18To25,
        Some(ref s) if s == "26-35" => AgePreference::R26To35,
        Some(ref s) if s == "36-45" => AgePreference::R36To45,
        Some(ref s) if s == "46+" => AgePreference::R46Plus,
        _ => AgePreference::Any,
    }
}

fn normalize_chat_type(raw: Option<&str>) -> ChatType {
    match raw.map(|s| s.to_lowercase()) {
        Some(ref s) if s == "video" => ChatType::Video,
        _ => ChatType::Text,
    }
}

fn normalize_location(raw: Option<&str>) -> String {
    raw.map(|s| s.trim().chars().take(MAX_LOCATION_LEN).collect())
        .unwrap_or_default()
}

fn normalize_keywords(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .map(|k| k.chars().take(MAX_KEYWORD_LEN).collect::<String>())
        .take(MAX_KEYWORDS)
        .collect()
}

/// Splits a `RawProfile` into a canonical `(Profile, Preferences)`
/// pair. Used both by `register` (own attributes) and `find_match`
/// (desired counterpart attributes use the same raw shape).
pub fn normalize(raw: &RawProfile) -> (Profile, Preferences) {
    let profile = Profile {
        gender: normalize_gender(raw.gender.as_deref()),
        age: normalize_age(raw.age.as_deref()),
        location: normalize_location(raw.location.as_deref()),
        keywords: normalize_keywords(&raw.keywords),
    };
    let preferences = Preferences {
        gender: normalize_gender_pref(raw.pref_gender.as_deref()),
        age: normalize_age_pref(raw.pref_age.as_deref()),
        chat_type: normalize_chat_type(raw.chat_type.as_deref()),
    };
    (profile, preferences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_values_coerce_to_neutral() {
        let raw = RawProfile {
            gender: Some("robot".into()),
            age: Some("ancient".into()),
            pref_gender: Some("nonsense".into()),
            pref_age: Some("nonsense".into()),
            chat_type: Some("nonsense".into()),
            ..Default::default()
        };
        let (profile, prefs) = normalize(&raw);
        assert_eq!(profile.gender, Gender::NotSpecified);
        assert_eq!(profile.age, AgeBucket::NotSpecified);
        assert_eq!(prefs.gender, GenderPreference::Any);
        assert_eq!(prefs.age, AgePreference::Any);
        assert_eq!(prefs.chat_type, ChatType::Text);
    }

    #[test]
    fn keywords_are_trimmed_lowercased_deduped_by_cap() {
        let raw = RawProfile {
            keywords: (0..15).map(|i| format!("  Word{i} ")).collect(),
            ..Default::default()
        };
        let (profile, _) = normalize(&raw);
        assert_eq!(profile.keywords.len(), MAX_KEYWORDS);
        assert_eq!(profile.keywords[0], "word0");
    }

    #[test]
    fn location_is_truncated() {
        let raw = RawProfile {
            location: Some("x".repeat(500)),
            ..Default::default()
        };
        let (profile, _) = normalize(&raw);
        assert_eq!(profile.location.len(), MAX_LOCATION_LEN);
    }

    #[test]
    fn normalizer_never_fails_on_empty_input() {
        let raw = RawProfile::default();
        let (profile, prefs) = normalize(&raw);
        assert_eq!(profile.gender, Gender::NotSpecified);
        assert_eq!(prefs.chat_type, ChatType::Text);
    }
}
