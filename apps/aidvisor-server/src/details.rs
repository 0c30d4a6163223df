//! Per-college deep dives.

use aidvisor_core::{slugify, GenerationTask};
use serde::Deserialize;
use serde_json::Value;

pub const SYSTEM_PROMPT: &str =
    "You are a precise, fact-conscious college admissions advisor. Return ONLY strict JSON, no extra text.";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailsRequest {
    #[serde(default)]
    pub school: String,
    /// Whatever profile the client collected; passed through to the prompt.
    #[serde(default)]
    pub profile: Option<Value>,
}

impl DetailsRequest {
    pub fn school_name(&self) -> Option<&str> {
        Some(self.school.trim()).filter(|s| !s.is_empty())
    }
}

/// Cache key for a college. Deep dives are cached per school, not per profile.
pub fn cache_key(school: &str) -> String {
    slugify(school, "school")
}

pub fn task(school: &str, profile: Option<&Value>) -> GenerationTask {
    let profile_json = profile
        .filter(|p| !p.is_null())
        .and_then(|p| serde_json::to_string_pretty(p).ok())
        .unwrap_or_default();
    let user = format!(
        r#"Write a deep dive on the college below, tailored to this student.

College: {school}

Student Profile (JSON; rely only on what is given, invent nothing):
{profile_json}

Reply with STRICT JSON in this shape (leave out empty keys):

{{
  "title": "Readable name of the school",
  "summary": "1-3 sentences tying the school to the student's profile and intended major, where known.",
  "lookingFor": ["what the school values", "..."],
  "fit": {{
    "bullets": ["why this student fits or does not, with nuance", "..."]
  }},
  "scholarships": [
    {{
      "name": "Merit award name",
      "amount": "$X,XXX-$Y,YYY per year",
      "requirements": ["published thresholds (GPA/test/portfolio) if known", "renewal conditions"],
      "candidate_fit": "Is the student a plausible candidate given the profile?"
    }}
  ],
  "sections": [
    {{
      "title": "Academics & Curriculum",
      "text": "Curriculum flexibility, honors, research, capstones, co-ops or internships relevant to the profile."
    }},
    {{
      "title": "Admissions Context",
      "text": "Class profile ranges, what the school tends to prioritize, and how that maps to this student."
    }},
    {{
      "title": "Financial Aid Notes",
      "text": "Merit versus need-based posture, special forms or deadlines, major-specific scholarships worth checking."
    }}
  ]
}}

Guidelines:
- Be specific to the student where possible; when something is unknown or varies by program, say so plainly.
- Never guess numeric cutoffs; when unsure, say "Check the school's official site".
- Keep claims short and scannable.
- Output ONLY the JSON object."#
    );
    GenerationTask::with_system(SYSTEM_PROMPT, user)
}
