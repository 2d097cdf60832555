use std::sync::{Arc, Mutex};

use crate::api::{ApiResult, Gateway};
use crate::models::{Faculty, FacultyPayload, ProfessorInfo, StudentInfo, Subject, SubjectPayload};

/// Administrator view state: cached lists of every entity kind, reloaded
/// per kind after any mutation. No special concurrency; the view drives
/// these operations one at a time.
#[derive(Clone)]
pub struct Admin {
    gateway: Arc<dyn Gateway>,
    state: Arc<Mutex<AdminState>>,
}

#[derive(Default)]
struct AdminState {
    faculties: Vec<Faculty>,
    subjects: Vec<Subject>,
    professors: Vec<ProfessorInfo>,
    students: Vec<StudentInfo>,
}

impl Admin {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            state: Arc::new(Mutex::new(AdminState::default())),
        }
    }

    pub async fn load_all(&self) -> ApiResult<()> {
        let (faculties, subjects, professors, students) = tokio::try_join!(
            self.gateway.faculties(),
            self.gateway.subjects(),
            self.gateway.professors(),
            self.gateway.students(),
        )?;
        let mut state = self.state.lock().unwrap();
        state.faculties = faculties;
        state.subjects = subjects;
        state.professors = professors;
        state.students = students;
        Ok(())
    }

    pub fn faculties(&self) -> Vec<Faculty> {
        self.state.lock().unwrap().faculties.clone()
    }

    pub fn subjects(&self) -> Vec<Subject> {
        self.state.lock().unwrap().subjects.clone()
    }

    pub fn professors(&self) -> Vec<ProfessorInfo> {
        self.state.lock().unwrap().professors.clone()
    }

    pub fn students(&self) -> Vec<StudentInfo> {
        self.state.lock().unwrap().students.clone()
    }

    /// Creates a faculty, or updates one when an identifier is given, then
    /// refreshes the faculty list.
    pub async fn save_faculty(&self, faculty_id: Option<i64>, name: &str) -> ApiResult<()> {
        let payload = FacultyPayload {
            name: name.to_string(),
        };
        match faculty_id {
            Some(id) => self.gateway.update_faculty(id, &payload).await?,
            None => self.gateway.create_faculty(&payload).await?,
        }
        self.reload_faculties().await
    }

    pub async fn save_subject(
        &self,
        subject_id: Option<i64>,
        payload: SubjectPayload,
    ) -> ApiResult<()> {
        match subject_id {
            Some(id) => self.gateway.update_subject(id, &payload).await?,
            None => self.gateway.create_subject(&payload).await?,
        }
        self.reload_subjects().await
    }

    pub async fn delete_faculty(&self, faculty_id: i64) -> ApiResult<()> {
        self.gateway.delete_faculty(faculty_id).await?;
        self.reload_faculties().await
    }

    pub async fn delete_subject(&self, subject_id: i64) -> ApiResult<()> {
        self.gateway.delete_subject(subject_id).await?;
        self.reload_subjects().await
    }

    pub async fn delete_professor(&self, professor_id: i64) -> ApiResult<()> {
        self.gateway.delete_professor(professor_id).await?;
        let professors = self.gateway.professors().await?;
        self.state.lock().unwrap().professors = professors;
        Ok(())
    }

    pub async fn delete_student(&self, student_id: i64) -> ApiResult<()> {
        self.gateway.delete_student(student_id).await?;
        let students = self.gateway.students().await?;
        self.state.lock().unwrap().students = students;
        Ok(())
    }

    async fn reload_faculties(&self) -> ApiResult<()> {
        let faculties = self.gateway.faculties().await?;
        self.state.lock().unwrap().faculties = faculties;
        Ok(())
    }

    async fn reload_subjects(&self) -> ApiResult<()> {
        let subjects = self.gateway.subjects().await?;
        self.state.lock().unwrap().subjects = subjects;
        Ok(())
    }
}
