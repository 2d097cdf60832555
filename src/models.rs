use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Student,
    Professor,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Administrator => "administrator",
            Role::Student => "student",
            Role::Professor => "professor",
            Role::Unknown => "unknown",
        };
        write!(f, "{}", token)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl UserInfo {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Faculty {
    pub id: i64,
    pub name: String,
}

/// Role-specific profile payload embedded in the `/me/profile/` response.
/// The backend only populates the extras matching the account's role.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileDetails {
    pub id: i64,
    pub user: UserInfo,
    #[serde(default)]
    pub faculty: Option<Faculty>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub office: Option<String>,
    #[serde(default)]
    pub enrollment_year: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub user: UserInfo,
    pub role: Role,
    #[serde(default)]
    pub profile: Option<ProfileDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfessorInfo {
    pub id: i64,
    pub user: UserInfo,
    #[serde(default)]
    pub faculty: Option<Faculty>,
    #[serde(default)]
    pub office: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentInfo {
    pub id: i64,
    pub user: UserInfo,
    #[serde(default)]
    pub faculty: Option<Faculty>,
    #[serde(default)]
    pub enrollment_year: Option<i64>,
}

/// A subject as listed by `/subjects/`. The `enrolled` flag is computed
/// server-side for the requesting student and absent for other roles.
#[derive(Debug, Clone, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub faculty: Option<Faculty>,
    #[serde(default)]
    pub professor: Option<ProfessorInfo>,
    #[serde(default)]
    pub students: Vec<StudentInfo>,
    #[serde(default)]
    pub enrolled: bool,
}

/// One roster entry for a (subject, student) pair. `id` is absent until the
/// first save persists the record.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub student: StudentInfo,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub grade: Option<f64>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewGrade {
    pub subject: i64,
    pub student_id: i64,
    pub grade: Option<f64>,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradePatch {
    pub grade: Option<f64>,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacultyPayload {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectPayload {
    pub code: String,
    pub title: String,
    pub faculty: i64,
    pub professor: Option<i64>,
}

/// The grade column is a decimal the backend renders either as a JSON number
/// or as a quoted string ("87.50"), depending on serializer settings.
fn decimal_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                Ok(None)
            } else {
                text.parse::<f64>()
                    .map(Some)
                    .map_err(serde::de::Error::custom)
            }
        }
    }
}
