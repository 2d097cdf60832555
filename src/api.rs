use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{
    Faculty, FacultyPayload, GradePatch, GradeRecord, NewGrade, ProfessorInfo, ProfileResponse,
    StudentInfo, Subject, SubjectPayload, TokenResponse,
};
use crate::session::SessionStore;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend refused the credential (HTTP 401). Carries the backend's
    /// `detail` message when one was decodable.
    #[error("authentication rejected: {}", detail.as_deref().unwrap_or("token not accepted"))]
    Unauthorized { detail: Option<String> },
    /// Any other non-success response; validation rejections land here and
    /// are not distinguished from authorization refusals by the caller.
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: StatusCode, detail: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Everything the views need from the backend. The reqwest-backed
/// [`ApiClient`] is the production implementation; tests substitute an
/// in-memory one.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> ApiResult<String>;
    async fn profile(&self) -> ApiResult<ProfileResponse>;

    async fn subjects(&self) -> ApiResult<Vec<Subject>>;
    async fn enroll(&self, subject_id: i64) -> ApiResult<()>;
    async fn unenroll(&self, subject_id: i64) -> ApiResult<()>;

    async fn grades_by_subject(&self, subject_id: i64) -> ApiResult<Vec<GradeRecord>>;
    async fn create_grade(&self, payload: &NewGrade) -> ApiResult<()>;
    async fn update_grade(&self, grade_id: i64, payload: &GradePatch) -> ApiResult<()>;

    async fn faculties(&self) -> ApiResult<Vec<Faculty>>;
    async fn create_faculty(&self, payload: &FacultyPayload) -> ApiResult<()>;
    async fn update_faculty(&self, faculty_id: i64, payload: &FacultyPayload) -> ApiResult<()>;
    async fn delete_faculty(&self, faculty_id: i64) -> ApiResult<()>;

    async fn create_subject(&self, payload: &SubjectPayload) -> ApiResult<()>;
    async fn update_subject(&self, subject_id: i64, payload: &SubjectPayload) -> ApiResult<()>;
    async fn delete_subject(&self, subject_id: i64) -> ApiResult<()>;

    async fn professors(&self) -> ApiResult<Vec<ProfessorInfo>>;
    async fn delete_professor(&self, professor_id: i64) -> ApiResult<()>;
    async fn students(&self) -> ApiResult<Vec<StudentInfo>>;
    async fn delete_student(&self, student_id: i64) -> ApiResult<()>;
}

/// Authenticated HTTP client for the university backend. Attaches the
/// current bearer credential to every request; never retries and never
/// clears the session itself — that is the auth flow's call.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(base_url: &str, session: SessionStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.get() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.authorized(self.http.get(self.url(path))).send().await?;
        let response = checked(response).await?;
        Ok(response.json().await?)
    }

    async fn send_unit(&self, request: RequestBuilder) -> ApiResult<()> {
        let response = self.authorized(request).send().await?;
        checked(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Gateway for ApiClient {
    async fn login(&self, username: &str, password: &str) -> ApiResult<String> {
        let response = self
            .http
            .post(self.url("/auth/token/"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let response = checked(response).await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.access)
    }

    async fn profile(&self) -> ApiResult<ProfileResponse> {
        self.get_json("/me/profile/").await
    }

    async fn subjects(&self) -> ApiResult<Vec<Subject>> {
        self.get_json("/subjects/").await
    }

    async fn enroll(&self, subject_id: i64) -> ApiResult<()> {
        self.send_unit(self.http.post(self.url(&format!("/subjects/{}/enroll/", subject_id))))
            .await
    }

    async fn unenroll(&self, subject_id: i64) -> ApiResult<()> {
        self.send_unit(
            self.http
                .post(self.url(&format!("/subjects/{}/unenroll/", subject_id))),
        )
        .await
    }

    async fn grades_by_subject(&self, subject_id: i64) -> ApiResult<Vec<GradeRecord>> {
        self.get_json(&format!("/grades/by_subject/?subject_id={}", subject_id))
            .await
    }

    async fn create_grade(&self, payload: &NewGrade) -> ApiResult<()> {
        self.send_unit(self.http.post(self.url("/grades/")).json(payload))
            .await
    }

    async fn update_grade(&self, grade_id: i64, payload: &GradePatch) -> ApiResult<()> {
        self.send_unit(
            self.http
                .patch(self.url(&format!("/grades/{}/", grade_id)))
                .json(payload),
        )
        .await
    }

    async fn faculties(&self) -> ApiResult<Vec<Faculty>> {
        self.get_json("/faculties/").await
    }

    async fn create_faculty(&self, payload: &FacultyPayload) -> ApiResult<()> {
        self.send_unit(self.http.post(self.url("/faculties/")).json(payload))
            .await
    }

    async fn update_faculty(&self, faculty_id: i64, payload: &FacultyPayload) -> ApiResult<()> {
        self.send_unit(
            self.http
                .put(self.url(&format!("/faculties/{}/", faculty_id)))
                .json(payload),
        )
        .await
    }

    async fn delete_faculty(&self, faculty_id: i64) -> ApiResult<()> {
        self.send_unit(self.http.delete(self.url(&format!("/faculties/{}/", faculty_id))))
            .await
    }

    async fn create_subject(&self, payload: &SubjectPayload) -> ApiResult<()> {
        self.send_unit(self.http.post(self.url("/subjects/")).json(payload))
            .await
    }

    async fn update_subject(&self, subject_id: i64, payload: &SubjectPayload) -> ApiResult<()> {
        self.send_unit(
            self.http
                .put(self.url(&format!("/subjects/{}/", subject_id)))
                .json(payload),
        )
        .await
    }

    async fn delete_subject(&self, subject_id: i64) -> ApiResult<()> {
        self.send_unit(self.http.delete(self.url(&format!("/subjects/{}/", subject_id))))
            .await
    }

    async fn professors(&self) -> ApiResult<Vec<ProfessorInfo>> {
        self.get_json("/professors/").await
    }

    async fn delete_professor(&self, professor_id: i64) -> ApiResult<()> {
        self.send_unit(
            self.http
                .delete(self.url(&format!("/professors/{}/", professor_id))),
        )
        .await
    }

    async fn students(&self) -> ApiResult<Vec<StudentInfo>> {
        self.get_json("/students/").await
    }

    async fn delete_student(&self, student_id: i64) -> ApiResult<()> {
        self.send_unit(self.http.delete(self.url(&format!("/students/{}/", student_id))))
            .await
    }
}

async fn checked(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(rejection(status, &body))
}

fn rejection(status: StatusCode, body: &str) -> ApiError {
    let detail = extract_detail(body);
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized { detail };
    }
    ApiError::Rejected {
        status,
        detail: detail.unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("no response body")
                    .to_string()
            } else {
                body.to_string()
            }
        }),
    }
}

/// DRF error bodies carry the message under `detail`; the custom view
/// actions use `error` instead.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("detail")
        .or_else(|| value.get("error"))
        .and_then(|detail| detail.as_str())
        .map(str::to_owned)
}
