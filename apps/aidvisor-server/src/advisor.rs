//! College advisor requests: wire shape, validation, cache key, and prompt.

use std::collections::BTreeMap;

use aidvisor_core::{GenerationTask, Normalizer};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

pub const SYSTEM_PROMPT: &str = "You are a helpful college admissions advisor.";

const REQUIRED: &str = "Required field";
const GPA_SCALE: &str = "Must be numeric on a 0–5.0 scale";
const EARLIEST_START_YEAR: u32 = 2025;

static FOUR_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").expect("year regex"));

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdvisorRequest {
    // Stats
    pub gpa: Option<String>,
    pub weighted_gpa: Option<String>,
    pub test_score: Option<String>,
    pub coursework: Option<String>,
    pub class_rank: Option<String>,
    pub school_amount: Option<String>,

    // Academics
    pub intended_major: Option<String>,
    pub teaching_style: Option<String>,
    pub teaching_style_other: Option<String>,
    pub class_size: Option<String>,
    pub accept_ap_ib: Option<String>,
    pub school_type: Option<String>,
    pub school_type_other: Option<String>,
    pub activities_keywords: Option<Vec<String>>,

    // Career
    pub career_goal: Option<String>,
    pub career_flexibility: Option<String>,
    pub program_features: Option<String>,

    // Finances
    pub budget: Option<String>,
    pub efc_sai: Option<String>,
    pub will_apply_aid: Option<String>,
    pub scholarship_interest: Option<String>,
    pub merit_aid_importance: Option<String>,

    // Strategy & timing
    pub curriculum_flexibility: Option<String>,
    pub outcomes_priority: Option<String>,
    pub outcomes_details: Option<String>,
    pub alumni_network_importance: Option<String>,
    pub start_year: Option<String>,

    // Location
    pub zip_code: Option<String>,
    pub distance_from_home: Option<String>,
    pub campus_setting: Option<String>,
    pub geographic_features: Option<Vec<String>>,
    pub region_keywords: Option<String>,
    pub climate: Option<String>,
    pub format: Option<String>,
    pub school_preference: Option<String>,

    // Campus life
    pub housing_preference: Option<String>,
    pub housing_keywords: Option<Vec<String>>,

    pub include_colleges: Option<Vec<String>>,
    pub exclude_colleges: Option<Vec<String>>,
}

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

fn list(value: &Option<Vec<String>>) -> &[String] {
    value.as_deref().unwrap_or(&[])
}

fn gpa_in_scale(raw: &str) -> bool {
    raw.parse::<f64>()
        .map(|g| (0.0..=5.0).contains(&g))
        .unwrap_or(false)
}

impl AdvisorRequest {
    /// Per-field problems keyed by the form label; empty when the request is
    /// usable.
    pub fn validate(&self) -> BTreeMap<String, String> {
        let mut invalid = BTreeMap::new();
        let mut flag = |field: &str, msg: &str| {
            invalid.insert(field.to_string(), msg.to_string());
        };

        match trimmed(&self.school_amount) {
            "" => flag("School Amount", REQUIRED),
            raw => {
                if !matches!(raw.parse::<i64>(), Ok(1..=10)) {
                    flag("School Amount", "Must be a number between 1 and 10");
                }
            }
        }

        match trimmed(&self.gpa) {
            "" => flag("GPA", REQUIRED),
            raw if !gpa_in_scale(raw) => flag("GPA", GPA_SCALE),
            _ => {}
        }

        let weighted = trimmed(&self.weighted_gpa);
        if !weighted.is_empty() && !gpa_in_scale(weighted) {
            flag("Weighted GPA", GPA_SCALE);
        }

        match trimmed(&self.start_year) {
            "" => flag("Start Year", REQUIRED),
            raw if !FOUR_DIGITS.is_match(raw) => {
                flag("Start Year", "Must be a 4-digit year like 2026")
            }
            raw => {
                if raw.parse::<u32>().map_or(true, |y| y < EARLIEST_START_YEAR) {
                    flag("Start Year", "Must be a 4-digit year of 2025 or later");
                }
            }
        }

        match trimmed(&self.will_apply_aid).to_lowercase().as_str() {
            "" => flag("Financial Aid", REQUIRED),
            "yes" | "no" => {}
            _ => flag("Financial Aid", "Must be 'Yes' or 'No'"),
        }

        match trimmed(&self.scholarship_interest).to_lowercase().as_str() {
            "" => flag("Scholarship Interest", REQUIRED),
            "merit-based" | "need-based" | "both" => {}
            _ => flag(
                "Scholarship Interest",
                "Must be 'merit-based', 'need-based', or 'both'",
            ),
        }

        invalid
    }

    /// Cache key: requests that differ only in whitespace, case on
    /// case-insensitive answers, or list order share a key.
    pub fn fingerprint(&self) -> String {
        Normalizer::new()
            .text("gpa", self.gpa.as_deref())
            .text("weighted_gpa", self.weighted_gpa.as_deref())
            .text("test_score", self.test_score.as_deref())
            .text("coursework", self.coursework.as_deref())
            .text("class_rank", self.class_rank.as_deref())
            .text("school_amount", self.school_amount.as_deref())
            .folded("intended_major", self.intended_major.as_deref())
            .folded("teaching_style", self.teaching_style.as_deref())
            .text("teaching_style_other", self.teaching_style_other.as_deref())
            .folded("class_size", self.class_size.as_deref())
            .folded("accept_ap_ib", self.accept_ap_ib.as_deref())
            .folded("school_type", self.school_type.as_deref())
            .text("school_type_other", self.school_type_other.as_deref())
            .list("activities_keywords", list(&self.activities_keywords))
            .text("career_goal", self.career_goal.as_deref())
            .folded("career_flexibility", self.career_flexibility.as_deref())
            .text("program_features", self.program_features.as_deref())
            .text("budget", self.budget.as_deref())
            .text("efc_sai", self.efc_sai.as_deref())
            .folded("will_apply_aid", self.will_apply_aid.as_deref())
            .folded("scholarship_interest", self.scholarship_interest.as_deref())
            .folded("merit_aid_importance", self.merit_aid_importance.as_deref())
            .folded("curriculum_flexibility", self.curriculum_flexibility.as_deref())
            .folded("outcomes_priority", self.outcomes_priority.as_deref())
            .text("outcomes_details", self.outcomes_details.as_deref())
            .folded(
                "alumni_network_importance",
                self.alumni_network_importance.as_deref(),
            )
            .text("start_year", self.start_year.as_deref())
            .text("zip_code", self.zip_code.as_deref())
            .text("distance_from_home", self.distance_from_home.as_deref())
            .folded("campus_setting", self.campus_setting.as_deref())
            .list("geographic_features", list(&self.geographic_features))
            .text("region_keywords", self.region_keywords.as_deref())
            .folded("climate", self.climate.as_deref())
            .folded("format", self.format.as_deref())
            .folded("school_preference", self.school_preference.as_deref())
            .folded("housing_preference", self.housing_preference.as_deref())
            .list("housing_keywords", list(&self.housing_keywords))
            .list("include_colleges", list(&self.include_colleges))
            .list("exclude_colleges", list(&self.exclude_colleges))
            .fingerprint()
    }

    pub fn task(&self) -> GenerationTask {
        GenerationTask::with_system(SYSTEM_PROMPT, self.prompt())
    }

    /// Student profile followed by the strict JSON reply contract.
    pub fn prompt(&self) -> String {
        let t = |v: &Option<String>| trimmed(v).to_string();
        let joined = |v: &Option<Vec<String>>| {
            list(v)
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let other = |v: &Option<String>| match trimmed(v) {
            "" => String::new(),
            s => format!(" (Other: {s})"),
        };

        let profile = format!(
            "Student Profile
- GPA: {gpa}
- Weighted GPA: {wgpa}
- Test Score: {test}
- Coursework: {course}
- Class Rank: {rank}

Academics
- Intended Major: {major}
- Teaching Style: {style}{style_other}
- Class Size: {size}
- Accept AP/IB Credit: {apib}
- Type of School: {stype}{stype_other}
- Activities Priority: {activities}

Career
- Goal: {goal}
- Flexibility: {flex}
- Must-Have Program Features: {features}

Finances
- Budget: {budget}
- EFC/SAI: {efc}
- Will Apply for Aid: {aid}
- Scholarship Interest: {scholarship}
- Merit Aid Importance: {merit}

Strategy & Timing
- Curriculum Flexibility: {curriculum}
- Career Outcomes Priority: {outcomes}
- Details: {outcomes_details}
- Alumni Network Importance: {alumni}
- Start Year: {start}

Location & Format
- ZIP Code: {zip}
- Distance From Home: {distance}
- Campus Setting: {setting}
- Geographic Features: {geo}
- Region Keywords: {region}
- Climate: {climate}
- Format: {format}
- School Preference: {pref}

Campus Life
- Housing Preference: {housing}
- Housing Keywords: {housing_kw}

Refinements (optional)
- Include Colleges: {include}
- Exclude Colleges: {exclude}",
            gpa = t(&self.gpa),
            wgpa = t(&self.weighted_gpa),
            test = t(&self.test_score),
            course = t(&self.coursework),
            rank = t(&self.class_rank),
            major = t(&self.intended_major),
            style = t(&self.teaching_style),
            style_other = other(&self.teaching_style_other),
            size = t(&self.class_size),
            apib = t(&self.accept_ap_ib),
            stype = t(&self.school_type),
            stype_other = other(&self.school_type_other),
            activities = joined(&self.activities_keywords),
            goal = t(&self.career_goal),
            flex = t(&self.career_flexibility),
            features = t(&self.program_features),
            budget = t(&self.budget),
            efc = t(&self.efc_sai),
            aid = t(&self.will_apply_aid),
            scholarship = t(&self.scholarship_interest),
            merit = t(&self.merit_aid_importance),
            curriculum = t(&self.curriculum_flexibility),
            outcomes = t(&self.outcomes_priority),
            outcomes_details = t(&self.outcomes_details),
            alumni = t(&self.alumni_network_importance),
            start = t(&self.start_year),
            zip = t(&self.zip_code),
            distance = t(&self.distance_from_home),
            setting = t(&self.campus_setting),
            geo = joined(&self.geographic_features),
            region = t(&self.region_keywords),
            climate = t(&self.climate),
            format = t(&self.format),
            pref = t(&self.school_preference),
            housing = t(&self.housing_preference),
            housing_kw = joined(&self.housing_keywords),
            include = joined(&self.include_colleges),
            exclude = joined(&self.exclude_colleges),
        );

        let contract = format!(
            r#"Reply with STRICT JSON ONLY, no prose, in exactly one of two shapes.

1) Recommendations:
{{
  "schools": [
    {{
      "name": "School Name",
      "chance_percent": 75,
      "distance_from_location": "1200 miles",
      "category": "Reach|Match|Safety",
      "reasoning": "Short explanation"
    }}
  ]
}}

2) Problems with the inputs:
{{
  "invalid_fields": {{
    "GPA": "Must be numeric on a 0-5.0 scale",
    "Location": "Required or provide a ZIP code"
  }}
}}

Rules:
- If key inputs are missing or contradictory, return ONLY invalid_fields.
- Otherwise return ONLY schools: the top {amount} options in descending order of chance, each labelled Reach, Match, or Safety with a short reasoning. Aim for roughly 12.5% safety, 75% match, and 12.5% reach schools.
- Nothing outside the JSON object."#,
            amount = t(&self.school_amount),
        );

        format!("I want you to act as a college admissions advisor.\n\n{profile}\n\n{contract}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> AdvisorRequest {
        serde_json::from_value(json!({
            "school_amount": "5",
            "gpa": "3.8",
            "start_year": "2026",
            "will_apply_aid": "Yes",
            "scholarship_interest": "both",
        }))
        .expect("request")
    }

    #[test]
    fn valid_request_has_no_problems() {
        assert!(valid().validate().is_empty());
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let problems = AdvisorRequest::default().validate();
        for field in [
            "School Amount",
            "GPA",
            "Start Year",
            "Financial Aid",
            "Scholarship Interest",
        ] {
            assert_eq!(problems.get(field).map(String::as_str), Some(REQUIRED), "{field}");
        }
        assert!(!problems.contains_key("Weighted GPA"));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut req = valid();
        req.gpa = Some("9.9".into());
        req.weighted_gpa = Some("abc".into());
        req.school_amount = Some("11".into());
        req.start_year = Some("26".into());
        req.will_apply_aid = Some("maybe".into());
        req.scholarship_interest = Some("athletic".into());
        let problems = req.validate();
        assert_eq!(problems["GPA"], GPA_SCALE);
        assert!(problems["GPA"].contains("0–5.0"));
        assert_eq!(problems["Weighted GPA"], GPA_SCALE);
        assert_eq!(problems["School Amount"], "Must be a number between 1 and 10");
        assert_eq!(problems["Start Year"], "Must be a 4-digit year like 2026");
        assert_eq!(problems["Financial Aid"], "Must be 'Yes' or 'No'");
        assert!(problems.contains_key("Scholarship Interest"));
    }

    #[test]
    fn start_year_before_2025_is_rejected() {
        let mut req = valid();
        req.start_year = Some("2019".into());
        assert!(req.validate().contains_key("Start Year"));
        req.start_year = Some(" 2025 ".into());
        assert!(req.validate().is_empty());
    }

    #[test]
    fn answers_are_case_insensitive() {
        let mut req = valid();
        req.will_apply_aid = Some(" NO ".into());
        req.scholarship_interest = Some("Merit-Based".into());
        assert!(req.validate().is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_value::<AdvisorRequest>(json!({"gpa": "3.0", "shoe_size": "9"}));
        assert!(err.is_err());
    }

    #[test]
    fn fingerprint_ignores_incidental_formatting() {
        let mut a = valid();
        a.geographic_features = Some(vec!["Mountains".into(), "coast".into()]);
        a.intended_major = Some("Computer  Science".into());
        let mut b = valid();
        b.gpa = Some("  3.8 ".into());
        b.will_apply_aid = Some("yes".into());
        b.geographic_features = Some(vec![" COAST".into(), "mountains".into(), "".into()]);
        b.intended_major = Some("computer science".into());
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.career_goal = Some("NASA".into());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn blank_and_absent_fields_fingerprint_alike() {
        let a = valid();
        let mut b = valid();
        b.zip_code = Some("   ".into());
        b.include_colleges = Some(vec![]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn prompt_carries_profile_and_contract() {
        let mut req = valid();
        req.teaching_style_other = Some("Socratic".into());
        req.include_colleges = Some(vec!["Rice".into(), " ".into(), "Tulane".into()]);
        let prompt = req.prompt();
        assert!(prompt.contains("- GPA: 3.8"));
        assert!(prompt.contains("(Other: Socratic)"));
        assert!(prompt.contains("- Include Colleges: Rice, Tulane"));
        assert!(prompt.contains("top 5 options"));
        assert!(prompt.contains("\"schools\""));
        assert!(prompt.contains("\"invalid_fields\""));
        assert_eq!(req.task().system.as_deref(), Some(SYSTEM_PROMPT));
    }
}
