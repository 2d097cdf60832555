//! Scripted in-memory backend for exercising the flows without a network.
//! Records every call, can fail or gate individual operations, and mutates
//! its own collections the way the real service would so reload-after-write
//! behavior is observable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Semaphore;

use crate::api::{ApiError, ApiResult, Gateway};
use crate::models::{
    Faculty, FacultyPayload, GradePatch, GradeRecord, NewGrade, ProfessorInfo, ProfileResponse,
    Role, StudentInfo, Subject, SubjectPayload, UserInfo,
};
use crate::session::SessionStore;

pub struct FakeBackend {
    calls: Mutex<Vec<String>>,
    fail_ops: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    next_id: AtomicI64,

    login_detail: Mutex<Option<String>>,
    profile_unauthorized: Mutex<bool>,
    profile_role: Mutex<Role>,

    subjects: Mutex<Vec<Subject>>,
    rosters: Mutex<HashMap<i64, Vec<GradeRecord>>>,
    faculties: Mutex<Vec<Faculty>>,
    professors: Mutex<Vec<ProfessorInfo>>,
    students: Mutex<Vec<StudentInfo>>,

    last_created: Mutex<Option<NewGrade>>,
    last_patch: Mutex<Option<(i64, GradePatch)>>,
}

impl FakeBackend {
    pub const TOKEN: &'static str = "fake-access-token";

    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_ops: Mutex::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(100),
            login_detail: Mutex::new(None),
            profile_unauthorized: Mutex::new(false),
            profile_role: Mutex::new(Role::Unknown),
            subjects: Mutex::new(Vec::new()),
            rosters: Mutex::new(HashMap::new()),
            faculties: Mutex::new(Vec::new()),
            professors: Mutex::new(Vec::new()),
            students: Mutex::new(Vec::new()),
            last_created: Mutex::new(None),
            last_patch: Mutex::new(None),
        }
    }

    pub fn set_profile_role(&self, role: Role) {
        *self.profile_role.lock().unwrap() = role;
    }

    pub fn reject_login(&self, detail: &str) {
        *self.login_detail.lock().unwrap() = Some(detail.to_string());
    }

    pub fn reject_profile_unauthorized(&self) {
        *self.profile_unauthorized.lock().unwrap() = true;
    }

    /// Makes the named operation return an opaque server-side failure.
    pub fn fail(&self, op: &str) {
        self.fail_ops.lock().unwrap().insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_ops.lock().unwrap().clear();
    }

    /// Gates the named operation on a zero-permit semaphore so a request
    /// can be held in flight; release with `add_permits`.
    pub fn gate(&self, op: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .unwrap()
            .insert(op.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn put_subjects(&self, subjects: Vec<Subject>) {
        *self.subjects.lock().unwrap() = subjects;
    }

    pub fn put_roster(&self, subject_id: i64, roster: Vec<GradeRecord>) {
        self.rosters.lock().unwrap().insert(subject_id, roster);
    }

    pub fn put_faculties(&self, faculties: Vec<Faculty>) {
        *self.faculties.lock().unwrap() = faculties;
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == key)
            .count()
    }

    pub fn last_created(&self) -> Option<NewGrade> {
        self.last_created.lock().unwrap().clone()
    }

    pub fn last_patch(&self) -> Option<(i64, GradePatch)> {
        self.last_patch.lock().unwrap().clone()
    }

    fn record(&self, key: String) {
        self.calls.lock().unwrap().push(key);
    }

    fn check(&self, op: &str) -> ApiResult<()> {
        if self.fail_ops.lock().unwrap().contains(op) {
            return Err(ApiError::Rejected {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: String::new(),
            });
        }
        Ok(())
    }

    async fn barrier(&self, op: &str) {
        let gate = self.gates.lock().unwrap().get(op).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    fn fresh_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for FakeBackend {
    async fn login(&self, _username: &str, _password: &str) -> ApiResult<String> {
        self.record("login".to_string());
        self.barrier("login").await;
        if let Some(detail) = self.login_detail.lock().unwrap().clone() {
            return Err(ApiError::Unauthorized {
                detail: Some(detail),
            });
        }
        self.check("login")?;
        Ok(Self::TOKEN.to_string())
    }

    async fn profile(&self) -> ApiResult<ProfileResponse> {
        self.record("profile".to_string());
        self.barrier("profile").await;
        if *self.profile_unauthorized.lock().unwrap() {
            return Err(ApiError::Unauthorized { detail: None });
        }
        self.check("profile")?;
        let role = *self.profile_role.lock().unwrap();
        Ok(ProfileResponse {
            user: user_info(1, "fake"),
            role,
            profile: None,
        })
    }

    async fn subjects(&self) -> ApiResult<Vec<Subject>> {
        self.record("subjects".to_string());
        self.barrier("subjects").await;
        self.check("subjects")?;
        Ok(self.subjects.lock().unwrap().clone())
    }

    async fn enroll(&self, subject_id: i64) -> ApiResult<()> {
        self.record(format!("enroll:{}", subject_id));
        self.barrier("enroll").await;
        self.check("enroll")?;
        let mut subjects = self.subjects.lock().unwrap();
        if let Some(subject) = subjects.iter_mut().find(|s| s.id == subject_id) {
            subject.enrolled = true;
        }
        Ok(())
    }

    async fn unenroll(&self, subject_id: i64) -> ApiResult<()> {
        self.record(format!("unenroll:{}", subject_id));
        self.barrier("unenroll").await;
        self.check("unenroll")?;
        let mut subjects = self.subjects.lock().unwrap();
        if let Some(subject) = subjects.iter_mut().find(|s| s.id == subject_id) {
            subject.enrolled = false;
        }
        Ok(())
    }

    async fn grades_by_subject(&self, subject_id: i64) -> ApiResult<Vec<GradeRecord>> {
        self.record(format!("grades_by_subject:{}", subject_id));
        self.barrier("grades_by_subject").await;
        self.check("grades_by_subject")?;
        Ok(self
            .rosters
            .lock()
            .unwrap()
            .get(&subject_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_grade(&self, payload: &NewGrade) -> ApiResult<()> {
        self.record("create_grade".to_string());
        self.barrier("create_grade").await;
        self.check("create_grade")?;
        *self.last_created.lock().unwrap() = Some(payload.clone());
        let mut rosters = self.rosters.lock().unwrap();
        let roster = rosters.entry(payload.subject).or_default();
        let id = self.fresh_id();
        match roster
            .iter_mut()
            .find(|r| r.student.id == payload.student_id)
        {
            Some(record) => {
                record.id = Some(id);
                record.grade = payload.grade;
                record.notes = payload.notes.clone();
            }
            None => roster.push(GradeRecord {
                id: Some(id),
                student: student_info(payload.student_id),
                grade: payload.grade,
                notes: payload.notes.clone(),
            }),
        }
        Ok(())
    }

    async fn update_grade(&self, grade_id: i64, payload: &GradePatch) -> ApiResult<()> {
        self.record(format!("update_grade:{}", grade_id));
        self.barrier("update_grade").await;
        self.check("update_grade")?;
        *self.last_patch.lock().unwrap() = Some((grade_id, payload.clone()));
        let mut rosters = self.rosters.lock().unwrap();
        for roster in rosters.values_mut() {
            if let Some(record) = roster.iter_mut().find(|r| r.id == Some(grade_id)) {
                record.grade = payload.grade;
                record.notes = payload.notes.clone();
            }
        }
        Ok(())
    }

    async fn faculties(&self) -> ApiResult<Vec<Faculty>> {
        self.record("faculties".to_string());
        self.check("faculties")?;
        Ok(self.faculties.lock().unwrap().clone())
    }

    async fn create_faculty(&self, payload: &FacultyPayload) -> ApiResult<()> {
        self.record("create_faculty".to_string());
        self.check("create_faculty")?;
        let id = self.fresh_id();
        self.faculties.lock().unwrap().push(Faculty {
            id,
            name: payload.name.clone(),
        });
        Ok(())
    }

    async fn update_faculty(&self, faculty_id: i64, payload: &FacultyPayload) -> ApiResult<()> {
        self.record(format!("update_faculty:{}", faculty_id));
        self.check("update_faculty")?;
        let mut faculties = self.faculties.lock().unwrap();
        if let Some(faculty) = faculties.iter_mut().find(|f| f.id == faculty_id) {
            faculty.name = payload.name.clone();
        }
        Ok(())
    }

    async fn delete_faculty(&self, faculty_id: i64) -> ApiResult<()> {
        self.record(format!("delete_faculty:{}", faculty_id));
        self.check("delete_faculty")?;
        self.faculties.lock().unwrap().retain(|f| f.id != faculty_id);
        Ok(())
    }

    async fn create_subject(&self, payload: &SubjectPayload) -> ApiResult<()> {
        self.record("create_subject".to_string());
        self.check("create_subject")?;
        let id = self.fresh_id();
        self.subjects.lock().unwrap().push(Subject {
            id,
            code: payload.code.clone(),
            title: payload.title.clone(),
            faculty: None,
            professor: None,
            students: Vec::new(),
            enrolled: false,
        });
        Ok(())
    }

    async fn update_subject(&self, subject_id: i64, payload: &SubjectPayload) -> ApiResult<()> {
        self.record(format!("update_subject:{}", subject_id));
        self.check("update_subject")?;
        let mut subjects = self.subjects.lock().unwrap();
        if let Some(subject) = subjects.iter_mut().find(|s| s.id == subject_id) {
            subject.code = payload.code.clone();
            subject.title = payload.title.clone();
        }
        Ok(())
    }

    async fn delete_subject(&self, subject_id: i64) -> ApiResult<()> {
        self.record(format!("delete_subject:{}", subject_id));
        self.check("delete_subject")?;
        self.subjects.lock().unwrap().retain(|s| s.id != subject_id);
        Ok(())
    }

    async fn professors(&self) -> ApiResult<Vec<ProfessorInfo>> {
        self.record("professors".to_string());
        self.check("professors")?;
        Ok(self.professors.lock().unwrap().clone())
    }

    async fn delete_professor(&self, professor_id: i64) -> ApiResult<()> {
        self.record(format!("delete_professor:{}", professor_id));
        self.check("delete_professor")?;
        self.professors
            .lock()
            .unwrap()
            .retain(|p| p.id != professor_id);
        Ok(())
    }

    async fn students(&self) -> ApiResult<Vec<StudentInfo>> {
        self.record("students".to_string());
        self.check("students")?;
        Ok(self.students.lock().unwrap().clone())
    }

    async fn delete_student(&self, student_id: i64) -> ApiResult<()> {
        self.record(format!("delete_student:{}", student_id));
        self.check("delete_student")?;
        self.students.lock().unwrap().retain(|s| s.id != student_id);
        Ok(())
    }
}

pub fn user_info(id: i64, username: &str) -> UserInfo {
    UserInfo {
        id,
        username: username.to_string(),
        first_name: String::new(),
        last_name: String::new(),
        email: String::new(),
    }
}

pub fn student_info(id: i64) -> StudentInfo {
    StudentInfo {
        id,
        user: user_info(id * 10, &format!("student{}", id)),
        faculty: None,
        enrollment_year: None,
    }
}

pub fn subject(id: i64, code: &str, enrolled: bool) -> Subject {
    Subject {
        id,
        code: code.to_string(),
        title: format!("{} title", code),
        faculty: None,
        professor: None,
        students: Vec::new(),
        enrolled,
    }
}

pub fn roster_entry(
    id: Option<i64>,
    student_id: i64,
    grade: Option<f64>,
    notes: &str,
) -> GradeRecord {
    GradeRecord {
        id,
        student: student_info(student_id),
        grade,
        notes: notes.to_string(),
    }
}

/// Session store over a throwaway sqlite file unique to the test.
pub fn temp_session(tag: &str) -> SessionStore {
    let path = std::env::temp_dir()
        .join(format!("uniclient-test-{}-{}.db", tag, std::process::id()))
        .to_string_lossy()
        .into_owned();
    let _ = std::fs::remove_file(&path);
    SessionStore::open(&path).unwrap()
}
