use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::api::{ApiResult, Gateway};
use crate::flags::PendingSet;
use crate::models::{GradePatch, GradeRecord, NewGrade, Subject};

/// Professor-side grading state: the taught subjects, at most one expanded
/// grade panel, rosters cached per subject once loaded, and a pending-save
/// flag per (subject, student) pair.
///
/// Cloning shares the state, so save tasks spawned from the view loop
/// operate on the same rosters the loop renders.
#[derive(Clone)]
pub struct Grading {
    gateway: Arc<dyn Gateway>,
    state: Arc<Mutex<GradingState>>,
    saving: PendingSet<(i64, i64)>,
}

#[derive(Default)]
struct GradingState {
    subjects: Vec<Subject>,
    expanded: Option<i64>,
    rosters: HashMap<i64, Vec<GradeRecord>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Panel opened; `fetched` tells whether a roster load was triggered
    /// (first expansion) or the cache was reused.
    Expanded { fetched: bool },
    Collapsed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The backend refused the save or the transport failed. Details are in
    /// the log; the roster keeps its pre-save state.
    Failed,
    /// A save for the same (subject, student) pair is still outstanding.
    AlreadySaving,
    /// No roster entry for that pair is loaded.
    UnknownRecord,
}

impl Grading {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            state: Arc::new(Mutex::new(GradingState::default())),
            saving: PendingSet::new(),
        }
    }

    /// Replaces the whole subject collection with the professor's taught
    /// subjects. Idempotent.
    pub async fn load_subjects(&self) -> ApiResult<()> {
        let subjects = self.gateway.subjects().await?;
        self.state.lock().unwrap().subjects = subjects;
        Ok(())
    }

    pub fn subjects(&self) -> Vec<Subject> {
        self.state.lock().unwrap().subjects.clone()
    }

    pub fn expanded(&self) -> Option<i64> {
        self.state.lock().unwrap().expanded
    }

    pub fn roster(&self, subject_id: i64) -> Option<Vec<GradeRecord>> {
        self.state.lock().unwrap().rosters.get(&subject_id).cloned()
    }

    pub fn is_saving(&self, subject_id: i64, student_id: i64) -> bool {
        self.saving.contains(&(subject_id, student_id))
    }

    /// Toggles the grade panel for a subject. The first expansion fetches
    /// the roster; collapsing keeps the cache, so re-expanding is free.
    pub async fn expand(&self, subject_id: i64) -> ExpandOutcome {
        let fetch = {
            let mut state = self.state.lock().unwrap();
            if state.expanded == Some(subject_id) {
                state.expanded = None;
                return ExpandOutcome::Collapsed;
            }
            state.expanded = Some(subject_id);
            !state.rosters.contains_key(&subject_id)
        };
        if fetch {
            self.load_roster(subject_id).await;
        }
        ExpandOutcome::Expanded { fetched: fetch }
    }

    /// Fetches the roster for a subject and caches it. A failed fetch is
    /// logged and leaves any cached roster untouched.
    pub async fn load_roster(&self, subject_id: i64) {
        match self.gateway.grades_by_subject(subject_id).await {
            Ok(records) => {
                self.state.lock().unwrap().rosters.insert(subject_id, records);
            }
            Err(err) => {
                tracing::error!(subject_id, error = %err, "Failed to load grade roster");
            }
        }
    }

    /// Updates the in-memory grade for one student. Empty input maps to the
    /// null grade; anything else goes through a float parse with no range
    /// check — the backend is the only validator. Returns false when no
    /// roster entry exists for the pair.
    pub fn edit_grade(&self, subject_id: i64, student_id: i64, raw: &str) -> bool {
        let raw = raw.trim();
        let value = if raw.is_empty() {
            None
        } else {
            Some(raw.parse::<f64>().unwrap_or(f64::NAN))
        };
        self.with_record(subject_id, student_id, |record| record.grade = value)
    }

    /// Updates the in-memory notes for one student; they travel with the
    /// next save of that pair.
    pub fn edit_notes(&self, subject_id: i64, student_id: i64, notes: &str) -> bool {
        let notes = notes.to_string();
        self.with_record(subject_id, student_id, |record| record.notes = notes)
    }

    fn with_record(
        &self,
        subject_id: i64,
        student_id: i64,
        apply: impl FnOnce(&mut GradeRecord),
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(roster) = state.rosters.get_mut(&subject_id) else {
            return false;
        };
        match roster.iter_mut().find(|r| r.student.id == student_id) {
            Some(record) => {
                apply(record);
                true
            }
            None => false,
        }
    }

    /// Persists the in-memory grade and notes for one (subject, student)
    /// pair: a partial update when the record already has an identifier, a
    /// create otherwise. At most one save per pair is in flight; the flag
    /// clears on every exit path. Success re-fetches the whole roster so
    /// the displayed state reflects backend truth; failure is logged and
    /// leaves the roster as edited.
    pub async fn save_grade(&self, subject_id: i64, student_id: i64) -> SaveOutcome {
        let snapshot = {
            let state = self.state.lock().unwrap();
            state.rosters.get(&subject_id).and_then(|roster| {
                roster.iter().find(|r| r.student.id == student_id).cloned()
            })
        };
        let Some(record) = snapshot else {
            return SaveOutcome::UnknownRecord;
        };
        let Some(_pending) = self.saving.try_begin((subject_id, student_id)) else {
            return SaveOutcome::AlreadySaving;
        };

        let result = match record.id {
            Some(grade_id) => {
                let patch = GradePatch {
                    grade: record.grade,
                    notes: record.notes.clone(),
                };
                self.gateway.update_grade(grade_id, &patch).await
            }
            None => {
                let payload = NewGrade {
                    subject: subject_id,
                    student_id,
                    grade: record.grade,
                    notes: record.notes.clone(),
                };
                self.gateway.create_grade(&payload).await
            }
        };

        match result {
            Ok(()) => {
                self.load_roster(subject_id).await;
                SaveOutcome::Saved
            }
            Err(err) => {
                tracing::error!(subject_id, student_id, error = %err, "Failed to save grade");
                SaveOutcome::Failed
            }
        }
    }
}
